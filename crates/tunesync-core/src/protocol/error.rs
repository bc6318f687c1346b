//! Protocol errors

use thiserror::Error;

/// Errors that can occur on the serial link
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Serial port error: {0}")]
    Serial(String),

    #[error("Port configuration not applied after {tries} attempts")]
    ConfigFailed { tries: u32 },

    #[error("Transport timeout: wanted {wanted} bytes, got {got}")]
    Timeout { wanted: usize, got: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
