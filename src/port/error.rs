//! Port-specific error types.
//!
//! Kept separate from the DUT and instrument errors so that a byte-stream
//! failure can be reported the same way whichever connector owns the port.

use thiserror::Error;

/// Errors that can occur during serial port operations.
#[derive(Debug, Error)]
pub enum PortError {
    /// The specified serial device does not exist.
    #[error("Serial port not found: {0}")]
    NotFound(String),

    /// The device exists but another process holds it.
    #[error("Serial port busy: {0}")]
    Busy(String),

    /// An I/O error occurred during port operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Port configuration was rejected by the driver.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A serialport-specific error occurred.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

impl PortError {
    /// Create a NotFound error from a port name.
    pub fn not_found(port_name: impl Into<String>) -> Self {
        Self::NotFound(port_name.into())
    }

    /// Create a Busy error from a port name.
    pub fn busy(port_name: impl Into<String>) -> Self {
        Self::Busy(port_name.into())
    }

    /// Create a Config error from a message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// True when the error only means "nothing to read right now".
    pub fn is_would_block(&self) -> bool {
        match self {
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PortError::not_found("/dev/ttyACM0");
        assert_eq!(err.to_string(), "Serial port not found: /dev/ttyACM0");

        let err = PortError::busy("/dev/ttyACM0");
        assert_eq!(err.to_string(), "Serial port busy: /dev/ttyACM0");

        let err = PortError::config("Invalid baud rate");
        assert_eq!(err.to_string(), "Configuration error: Invalid baud rate");
    }

    #[test]
    fn test_would_block_classification() {
        let err = PortError::Io(std::io::Error::new(
            std::io::ErrorKind::WouldBlock,
            "empty",
        ));
        assert!(err.is_would_block());
        assert!(!PortError::not_found("x").is_would_block());
    }
}
