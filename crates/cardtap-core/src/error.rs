//! Error types
//!
//! The session engine itself never fails: malformed input becomes a packet
//! classification. Errors only arise at the edges, when loading
//! configuration or talking to a serial port.

use thiserror::Error;

/// Errors that can occur while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Base baud rate must be positive")]
    ZeroBaudRate,

    #[error("Base baud rate {0} exceeds {max}", max = crate::timing::MAX_BASE_BAUD_RATE)]
    BaudRateTooHigh(u32),

    #[error("Packet buffer capacity must be positive")]
    ZeroBufferCapacity,

    #[error("Read timeout must be positive")]
    ZeroReadTimeout,
}

/// Errors that can occur while capturing from a serial line
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Serial port error: {0}")]
    SerialError(String),

    #[error("Port not found: {0}")]
    PortNotFound(String),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<serialport::Error> for CaptureError {
    fn from(e: serialport::Error) -> Self {
        match e.kind() {
            serialport::ErrorKind::NoDevice => CaptureError::PortNotFound(e.to_string()),
            _ => CaptureError::SerialError(e.to_string()),
        }
    }
}
