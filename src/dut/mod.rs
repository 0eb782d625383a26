//! Devices under test.
//!
//! Both connectors expose the same [`Dut`] capability so test bodies never
//! care whether the firmware runs on a board or inside the emulator:
//!
//! ```text
//! PhysicalDut ──┐
//!               ├──> Dut ──> CommandChannel ──> SerialPortAdapter
//! EmulatorDut ──┘
//! ```

pub mod emulator;
pub mod error;
pub mod locate;
pub mod physical;
pub mod pty;

pub use emulator::{EmulatorDut, EmulatorSettings, EmulatorState, EmulatorTimings};
pub use error::DutError;
pub use physical::{PhysicalDut, PhysicalState, PhysicalTimings, PortOpener};

use crate::channel::DEFAULT_COMMAND_TIMEOUT;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Which connector a DUT uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DutKind {
    Emulator,
    Physical,
}

impl fmt::Display for DutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Emulator => write!(f, "emulator"),
            Self::Physical => write!(f, "physical"),
        }
    }
}

/// Capability shared by every device-under-test connector.
///
/// `stop` never fails: it runs during cleanup, often after a test has
/// already failed, and must not replace that failure with its own.
pub trait Dut: Send + fmt::Debug {
    fn kind(&self) -> DutKind;

    /// Acquire the target (spawn the emulator or open the port).
    fn start(&mut self) -> Result<(), DutError>;

    /// Release everything `start` acquired. Idempotent.
    fn stop(&mut self);

    /// Send one shell command and return the raw response text.
    fn send_command(&mut self, command: &str, timeout: Duration) -> Result<String, DutError>;

    fn is_connected(&self) -> bool;

    /// [`send_command`](Self::send_command) with the default timeout.
    fn send(&mut self, command: &str) -> Result<String, DutError> {
        self.send_command(command, DEFAULT_COMMAND_TIMEOUT)
    }
}

/// A DUT shared between the test body and a virtual instrument.
pub type SharedDut = Arc<Mutex<Box<dyn Dut>>>;

/// Wrap a DUT for sharing.
pub fn shared(dut: Box<dyn Dut>) -> SharedDut {
    Arc::new(Mutex::new(dut))
}
