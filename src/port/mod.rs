//! Port abstraction layer for serial communication.
//!
//! Provides the `SerialPortAdapter` trait and its implementations so the
//! command channel can run against hardware, an emulator PTY, or a mock.

pub mod error;
pub mod mock;
pub mod sync_port;
pub mod traits;

pub use error::PortError;
pub use mock::MockSerialPort;
pub use sync_port::SyncSerialPort;
pub use traits::*;
