//! Link layer tests over an in-memory port
//!
//! Exercises the command framing, partial-read accumulation, and the
//! bounded retry budgets without a real serial device.

use std::collections::VecDeque;
use std::io::{self, Read, Write};

use pretty_assertions::assert_eq;
use tunesync_core::protocol::{EcuIo, Link, LinkError, LinkPort};

/// Scripted byte stream standing in for the serial port.
///
/// Each `read` call consumes one scripted step; with the script exhausted,
/// reads return 0 bytes (the serial timeout case).
struct ScriptPort {
    written: Vec<u8>,
    steps: VecDeque<ReadStep>,
    read_calls: usize,
    discards: usize,
}

enum ReadStep {
    Data(Vec<u8>),
    Zero,
    Err(io::ErrorKind),
}

impl ScriptPort {
    fn new(steps: Vec<ReadStep>) -> Self {
        Self {
            written: Vec::new(),
            steps: steps.into(),
            read_calls: 0,
            discards: 0,
        }
    }

    fn silent() -> Self {
        Self::new(Vec::new())
    }
}

impl Read for ScriptPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_calls += 1;
        match self.steps.pop_front() {
            Some(ReadStep::Data(bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                Ok(n)
            }
            Some(ReadStep::Zero) | None => Ok(0),
            Some(ReadStep::Err(kind)) => Err(io::Error::new(kind, "scripted error")),
        }
    }
}

impl Write for ScriptPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl LinkPort for ScriptPort {
    fn discard_buffers(&mut self) -> io::Result<()> {
        self.discards += 1;
        Ok(())
    }
}

#[test]
fn test_read_region_framing() {
    let port = ScriptPort::new(vec![ReadStep::Data(vec![0xAA, 0xBB, 0xCC, 0xDD])]);
    let mut link = Link::new(port);

    let bytes = link.read_region(10, 576, 4).unwrap();
    assert_eq!(bytes, vec![0xAA, 0xBB, 0xCC, 0xDD]);

    // Header: 'r', can-id 0, region; then big-endian offset and length
    let port = link.into_inner();
    assert_eq!(port.written, vec![0x72, 0x00, 10, 0x02, 0x40, 0x00, 0x04]);
}

#[test]
fn test_read_accumulates_partial_reads() {
    // Response dribbles in across several reads with timeouts interleaved
    let port = ScriptPort::new(vec![
        ReadStep::Data(vec![0x01]),
        ReadStep::Zero,
        ReadStep::Data(vec![0x02, 0x03]),
        ReadStep::Err(io::ErrorKind::Interrupted),
        ReadStep::Data(vec![0x04]),
    ]);
    let mut link = Link::new(port);

    let bytes = link.read_region(4, 0, 4).unwrap();
    assert_eq!(bytes, vec![0x01, 0x02, 0x03, 0x04]);
}

#[test]
fn test_read_region_bounded_retry() {
    // A device that never answers: 10 accumulation attempts per exchange,
    // the exchange retried twice, and never a hang
    let port = ScriptPort::silent();
    let mut link = Link::new(port);

    let err = link.read_region(9, 0, 16).unwrap_err();
    assert!(matches!(err, LinkError::Timeout { wanted: 16, got: 0 }));

    let port = link.into_inner();
    assert_eq!(port.read_calls, 20, "10 attempts x 2 exchange retries");
    // Buffers are flushed between the two attempts
    assert_eq!(port.discards, 1);
}

#[test]
fn test_fatal_io_error_skips_accumulation() {
    // A hard I/O error must not be absorbed into the soft-error budget;
    // only the whole-exchange retry sees it
    let port = ScriptPort::new(vec![
        ReadStep::Err(io::ErrorKind::BrokenPipe),
        ReadStep::Err(io::ErrorKind::BrokenPipe),
    ]);
    let mut link = Link::new(port);

    let err = link.read_region(9, 0, 8).unwrap_err();
    assert!(matches!(err, LinkError::Io(_)));

    let port = link.into_inner();
    assert_eq!(port.read_calls, 2, "one read per exchange attempt");
}

#[test]
fn test_write_region_framing() {
    let port = ScriptPort::silent();
    let mut link = Link::new(port);

    link.write_region(4, 0x01A6, &[0x7F, 0x00]).unwrap();

    let port = link.into_inner();
    assert_eq!(
        port.written,
        vec![0x77, 0x00, 4, 0x01, 0xA6, 0x00, 0x02, 0x7F, 0x00]
    );
    assert_eq!(port.read_calls, 0, "write exchange expects no response");
}

#[test]
fn test_burn_region_framing() {
    let port = ScriptPort::silent();
    let mut link = Link::new(port);

    link.burn_region(7).unwrap();

    let port = link.into_inner();
    assert_eq!(port.written, vec![0x62, 0x00, 7]);
}

#[test]
fn test_version_query() {
    let mut response = b"MS2Extra 3.0.3u".to_vec();
    response.resize(20, 0);

    let port = ScriptPort::new(vec![ReadStep::Data(response)]);
    let mut link = Link::new(port);

    let version = link.query_version().unwrap();
    assert_eq!(version, "MS2Extra 3.0.3u");

    let port = link.into_inner();
    assert_eq!(port.written, vec![0x51]);
}

#[test]
fn test_signature_query() {
    let mut response = b"MS2Extra comms332m2".to_vec();
    response.resize(60, 0);

    let port = ScriptPort::new(vec![ReadStep::Data(response)]);
    let mut link = Link::new(port);

    let signature = link.query_signature().unwrap();
    assert_eq!(signature, "MS2Extra comms332m2");

    let port = link.into_inner();
    assert_eq!(port.written, vec![0x53]);
}

#[test]
fn test_telemetry_snapshot_exchange() {
    let port = ScriptPort::new(vec![ReadStep::Data(vec![0x11; 8])]);
    let mut link = Link::new(port);

    let block = link.telemetry_snapshot(8).unwrap();
    assert_eq!(block, vec![0x11; 8]);

    let port = link.into_inner();
    assert_eq!(port.written, vec![0x41]);
}

#[test]
fn test_exchange_retry_recovers() {
    // First attempt times out, second delivers; the command header must be
    // re-sent for the second attempt
    let mut steps: Vec<ReadStep> = (0..10).map(|_| ReadStep::Zero).collect();
    steps.push(ReadStep::Data(vec![0x55, 0x66]));
    let port = ScriptPort::new(steps);
    let mut link = Link::new(port);

    let bytes = link.read_region(3, 0, 2).unwrap();
    assert_eq!(bytes, vec![0x55, 0x66]);

    let port = link.into_inner();
    let header = [0x72, 0x00, 3, 0x00, 0x00, 0x00, 0x02];
    let mut expected = header.to_vec();
    expected.extend_from_slice(&header);
    assert_eq!(port.written, expected);
}
