//! Serial port handling
//!
//! Opens and configures the ECU serial device. The protocol is fixed-length
//! binary, so the port runs with a short per-read timeout instead of line
//! buffering.

use serialport::SerialPort;
use std::time::Duration;

use super::{LinkError, BAUD_RATE};

/// Per-read timeout. Partial frames are normal on a serial link; the link
/// layer accumulates reads, so this only bounds a single read call.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// How many times to re-apply and re-verify the line configuration before
/// giving up on the device.
const CONFIG_RETRIES: u32 = 5;

/// Open the ECU serial device and apply the fixed line configuration
/// (115200 baud, 8N1, no flow control).
///
/// Some USB adapters silently ignore configuration requests, so the applied
/// speed is verified by re-reading the port attributes; the whole
/// configure-and-verify step is retried up to [`CONFIG_RETRIES`] times.
pub fn open_device(path: &str) -> Result<Box<dyn SerialPort>, LinkError> {
    let mut port = serialport::new(path, BAUD_RATE)
        .timeout(READ_TIMEOUT)
        .open()
        .map_err(|e| LinkError::Serial(format!("unable to open '{}': {}", path, e)))?;

    for attempt in 1..=CONFIG_RETRIES {
        if let Err(e) = configure_port(port.as_mut()) {
            tracing::warn!("configure attempt {}/{} failed: {}", attempt, CONFIG_RETRIES, e);
            continue;
        }

        match port.baud_rate() {
            Ok(BAUD_RATE) => {
                tracing::debug!("serial port '{}' configured at {} baud", path, BAUD_RATE);
                return Ok(port);
            }
            Ok(actual) => {
                tracing::warn!(
                    "baud verify attempt {}/{}: wanted {}, port reports {}",
                    attempt,
                    CONFIG_RETRIES,
                    BAUD_RATE,
                    actual
                );
            }
            Err(e) => {
                tracing::warn!("unable to re-read port attributes: {}", e);
            }
        }
    }

    Err(LinkError::ConfigFailed {
        tries: CONFIG_RETRIES,
    })
}

/// Apply the fixed 8N1 line settings
fn configure_port(port: &mut dyn SerialPort) -> Result<(), LinkError> {
    port.set_baud_rate(BAUD_RATE)
        .map_err(|e| LinkError::Serial(e.to_string()))?;
    port.set_data_bits(serialport::DataBits::Eight)
        .map_err(|e| LinkError::Serial(e.to_string()))?;
    port.set_parity(serialport::Parity::None)
        .map_err(|e| LinkError::Serial(e.to_string()))?;
    port.set_stop_bits(serialport::StopBits::One)
        .map_err(|e| LinkError::Serial(e.to_string()))?;
    port.set_flow_control(serialport::FlowControl::None)
        .map_err(|e| LinkError::Serial(e.to_string()))?;
    Ok(())
}
