//! Link layer: command exchanges over the serial device
//!
//! Implements the five wire commands of the MegaSquirt-style protocol.
//! Responses are fixed-length binary; a single read may return fewer bytes
//! than requested, so reads accumulate with a bounded soft-error budget and
//! every exchange is retried as a whole on failure.

use serialport::SerialPort;
use std::io::{ErrorKind, Read, Write};
use std::thread;
use std::time::Duration;

use super::{serial::open_device, LinkError};

/// Command bytes (single ASCII characters on the wire)
const CMD_VERSION: u8 = 0x51; // 'Q'
const CMD_SIGNATURE: u8 = 0x53; // 'S'
const CMD_READ: u8 = 0x72; // 'r'
const CMD_WRITE: u8 = 0x77; // 'w'
const CMD_BURN: u8 = 0x62; // 'b'
const CMD_TELEMETRY: u8 = 0x41; // 'A'

/// Fixed response length of the version query
const VERSION_LEN: usize = 20;
/// Fixed response length of the signature query
const SIGNATURE_LEN: usize = 60;

/// Read-accumulation budgets per command
const VERSION_ATTEMPTS: u32 = 3;
const SIGNATURE_ATTEMPTS: u32 = 5;
const READ_REGION_ATTEMPTS: u32 = 10;
const TELEMETRY_ATTEMPTS: u32 = 5;

/// Each exchange is retried as a whole this many times
const EXCHANGE_RETRIES: u32 = 2;

/// Gap between the command header and the offset/length words.
///
/// Hardware requirement of the device's page-switch logic. Removing it
/// causes silent misframing, not an observable error.
const PAGE_SWITCH_DELAY: Duration = Duration::from_millis(200);

/// Byte stream the link runs over: the real serial port, or an in-memory
/// stub in tests.
pub trait LinkPort: Read + Write {
    /// Drop any unread input and unsent output between exchange attempts
    fn discard_buffers(&mut self) -> std::io::Result<()>;
}

impl LinkPort for Box<dyn SerialPort> {
    fn discard_buffers(&mut self) -> std::io::Result<()> {
        self.clear(serialport::ClearBuffer::All)
            .map_err(std::io::Error::from)
    }
}

/// Region-addressed ECU I/O, the seam between the link and its consumers.
///
/// The synchronization engine and the telemetry poller depend only on this
/// trait, never on the concrete serial link.
pub trait EcuIo {
    /// Read `len` bytes from `region` starting at `offset`
    fn read_region(&mut self, region: u8, offset: u16, len: u16) -> Result<Vec<u8>, LinkError>;

    /// Write `data` into `region` starting at `offset`
    fn write_region(&mut self, region: u8, offset: u16, data: &[u8]) -> Result<(), LinkError>;

    /// Commit the RAM copy of `region` to non-volatile storage
    fn burn_region(&mut self, region: u8) -> Result<(), LinkError>;

    /// Read one fixed-size block of live telemetry data
    fn telemetry_snapshot(&mut self, len: usize) -> Result<Vec<u8>, LinkError>;
}

/// Exclusive owner of the serial device.
///
/// Exchanges block until they complete or exhaust their retry budget; the
/// protocol has no abort primitive. Callers must never interleave two
/// exchanges on one link.
pub struct Link<P: LinkPort> {
    port: P,
}

impl Link<Box<dyn SerialPort>> {
    /// Open and configure the serial device at `path`
    pub fn connect(path: &str) -> Result<Self, LinkError> {
        let port = open_device(path)?;
        Ok(Self { port })
    }
}

impl<P: LinkPort> Link<P> {
    /// Wrap an already-open port
    pub fn new(port: P) -> Self {
        Self { port }
    }

    /// Consume the link, returning the underlying port
    pub fn into_inner(self) -> P {
        self.port
    }

    /// Query the firmware version string (version query, 20-byte response)
    pub fn query_version(&mut self) -> Result<String, LinkError> {
        let bytes = self.with_retry("version query", |link| {
            link.port.write_all(&[CMD_VERSION])?;
            link.read_exact_soft(VERSION_LEN, VERSION_ATTEMPTS)
        })?;
        Ok(String::from_utf8_lossy(&bytes)
            .trim_end_matches('\0')
            .to_string())
    }

    /// Query the firmware signature (signature query, 60-byte response)
    pub fn query_signature(&mut self) -> Result<String, LinkError> {
        let bytes = self.with_retry("signature query", |link| {
            link.port.write_all(&[CMD_SIGNATURE])?;
            link.read_exact_soft(SIGNATURE_LEN, SIGNATURE_ATTEMPTS)
        })?;
        Ok(String::from_utf8_lossy(&bytes)
            .trim_end_matches('\0')
            .to_string())
    }

    /// Read bytes repeatedly until `len` have accumulated.
    ///
    /// A read returning 0 bytes, or an interruption/timeout, is a soft
    /// error; the soft-error count resets whenever data arrives. Any other
    /// I/O failure is fatal immediately. Exceeding `max_attempts` soft
    /// errors fails with a transport timeout.
    fn read_exact_soft(&mut self, len: usize, max_attempts: u32) -> Result<Vec<u8>, LinkError> {
        let mut buf = vec![0u8; len];
        let mut filled = 0usize;
        let mut soft_errs = 0u32;

        while soft_errs < max_attempts {
            match self.port.read(&mut buf[filled..]) {
                Ok(0) => {
                    soft_errs += 1;
                }
                Ok(n) => {
                    filled += n;
                    soft_errs = 0;
                    if filled == len {
                        return Ok(buf);
                    }
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::Interrupted | ErrorKind::TimedOut | ErrorKind::WouldBlock
                    ) =>
                {
                    soft_errs += 1;
                }
                Err(e) => return Err(LinkError::Io(e)),
            }
        }

        tracing::warn!(
            "read timed out after {} attempts: wanted {} bytes, got {}",
            max_attempts,
            len,
            filled
        );
        Err(LinkError::Timeout {
            wanted: len,
            got: filled,
        })
    }

    /// Run one exchange, retrying it as a whole on failure and flushing the
    /// port buffers between attempts.
    fn with_retry<T>(
        &mut self,
        what: &str,
        mut op: impl FnMut(&mut Self) -> Result<T, LinkError>,
    ) -> Result<T, LinkError> {
        for attempt in 1..EXCHANGE_RETRIES {
            match op(self) {
                Ok(v) => return Ok(v),
                Err(e) => {
                    tracing::warn!(
                        "{} attempt {}/{} failed: {}",
                        what,
                        attempt,
                        EXCHANGE_RETRIES,
                        e
                    );
                    let _ = self.port.discard_buffers();
                }
            }
        }
        op(self)
    }

    /// Write the 3-byte command header, observe the page-switch gap, then
    /// write the big-endian offset/length words.
    fn write_region_header(
        &mut self,
        cmd: u8,
        region: u8,
        offset: u16,
        len: u16,
    ) -> Result<(), LinkError> {
        // Second header byte is the CAN id, always 0 on a local device
        self.port.write_all(&[cmd, 0x00, region])?;

        thread::sleep(PAGE_SWITCH_DELAY);

        let off = offset.to_be_bytes();
        let n = len.to_be_bytes();
        self.port.write_all(&[off[0], off[1], n[0], n[1]])?;
        Ok(())
    }
}

impl<P: LinkPort> EcuIo for Link<P> {
    fn read_region(&mut self, region: u8, offset: u16, len: u16) -> Result<Vec<u8>, LinkError> {
        tracing::debug!(
            "read region {} offset {} len {}",
            region,
            offset,
            len
        );
        self.with_retry("read region", |link| {
            link.write_region_header(CMD_READ, region, offset, len)?;
            link.read_exact_soft(len as usize, READ_REGION_ATTEMPTS)
        })
    }

    fn write_region(&mut self, region: u8, offset: u16, data: &[u8]) -> Result<(), LinkError> {
        tracing::debug!(
            "write region {} offset {} len {}",
            region,
            offset,
            data.len()
        );
        self.with_retry("write region", |link| {
            link.write_region_header(CMD_WRITE, region, offset, data.len() as u16)?;
            link.port.write_all(data)?;
            Ok(())
        })
    }

    fn burn_region(&mut self, region: u8) -> Result<(), LinkError> {
        tracing::debug!("burn region {}", region);
        self.with_retry("burn region", |link| {
            link.port.write_all(&[CMD_BURN, 0x00, region])?;
            Ok(())
        })
    }

    fn telemetry_snapshot(&mut self, len: usize) -> Result<Vec<u8>, LinkError> {
        self.with_retry("telemetry snapshot", |link| {
            link.port.write_all(&[CMD_TELEMETRY])?;
            link.read_exact_soft(len, TELEMETRY_ATTEMPTS)
        })
    }
}
