//! Core traits for serial port abstraction.
//!
//! Defines the `SerialPortAdapter` trait so that a UART on a real board, the
//! PTY handed out by the emulator, and the scripted mock used in tests can
//! all sit behind the same command channel.

use super::error::PortError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Baud rate used by the sampler firmware's shell on every target.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Blocking read/write timeout applied when a port is opened.
pub const DEFAULT_PORT_TIMEOUT: Duration = Duration::from_secs(2);

/// Configuration parameters for opening a serial port.
///
/// The firmware shell always runs 8N1 without flow control, so only the
/// rate and the blocking timeout are configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortConfiguration {
    /// Baud rate (bits per second).
    pub baud_rate: u32,

    /// Read/write timeout.
    pub timeout: Duration,
}

impl Default for PortConfiguration {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            timeout: DEFAULT_PORT_TIMEOUT,
        }
    }
}

impl PortConfiguration {
    /// Configuration with a specific baud rate and the default timeout.
    pub fn with_baud(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            ..Self::default()
        }
    }

    /// Override the blocking timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Trait for serial port I/O operations.
///
/// Implementations must be usable from a single owner only; the harness never
/// shares one port between two writers.
pub trait SerialPortAdapter: Send + std::fmt::Debug {
    /// Write bytes to the serial port.
    ///
    /// Returns the number of bytes actually written.
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError>;

    /// Read bytes from the serial port into the provided buffer.
    ///
    /// Returns the number of bytes actually read.
    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError>;

    /// Get the name/path of this serial port.
    fn name(&self) -> &str;

    /// Discard everything received but not yet read.
    fn clear_input(&mut self) -> Result<(), PortError>;

    /// Number of bytes that can be read without blocking.
    fn bytes_to_read(&self) -> Result<usize, PortError>;

    /// Write the whole buffer, retrying short writes.
    fn write_all_bytes(&mut self, mut data: &[u8]) -> Result<(), PortError> {
        while !data.is_empty() {
            let n = self.write_bytes(data)?;
            if n == 0 {
                return Err(PortError::Io(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "serial port accepted no bytes",
                )));
            }
            data = &data[n..];
        }
        Ok(())
    }
}

impl<T: SerialPortAdapter + ?Sized> SerialPortAdapter for Box<T> {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        (**self).write_bytes(data)
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        (**self).read_bytes(buffer)
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn clear_input(&mut self) -> Result<(), PortError> {
        (**self).clear_input()
    }

    fn bytes_to_read(&self) -> Result<usize, PortError> {
        (**self).bytes_to_read()
    }
}
