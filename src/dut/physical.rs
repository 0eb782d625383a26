//! Direct UART attachment to a real board.

use super::{Dut, DutError, DutKind};
use crate::channel::{CommandChannel, DEFAULT_PROMPT};
use crate::port::{PortConfiguration, PortError, SerialPortAdapter, SyncSerialPort};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Opens the port named in the configuration. Replaceable for tests.
pub type PortOpener =
    Box<dyn Fn(&str, PortConfiguration) -> Result<Box<dyn SerialPortAdapter>, PortError> + Send>;

/// Settle delays around opening the board's UART.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicalTimings {
    /// Wait after opening, before discarding input (USB CDC enumeration).
    pub open_settle_ms: u64,
    /// Wait after discarding input.
    pub flush_settle_ms: u64,
}

impl Default for PhysicalTimings {
    fn default() -> Self {
        Self {
            open_settle_ms: 500,
            flush_settle_ms: 500,
        }
    }
}

impl PhysicalTimings {
    /// No settling at all; for mocks.
    pub fn none() -> Self {
        Self {
            open_settle_ms: 0,
            flush_settle_ms: 0,
        }
    }
}

/// `Idle -> Open -> Closed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhysicalState {
    Idle,
    Open,
    Closed,
}

/// A board reached over a serial port.
pub struct PhysicalDut {
    port_name: String,
    port_config: PortConfiguration,
    timings: PhysicalTimings,
    prompt: String,
    opener: PortOpener,
    channel: Option<CommandChannel>,
    state: PhysicalState,
}

impl PhysicalDut {
    pub fn new(port_name: impl Into<String>, port_config: PortConfiguration) -> Self {
        Self {
            port_name: port_name.into(),
            port_config,
            timings: PhysicalTimings::default(),
            prompt: DEFAULT_PROMPT.to_string(),
            opener: Box::new(SyncSerialPort::open_boxed),
            channel: None,
            state: PhysicalState::Idle,
        }
    }

    /// Replace how the port is opened.
    pub fn with_opener(mut self, opener: PortOpener) -> Self {
        self.opener = opener;
        self
    }

    pub fn with_timings(mut self, timings: PhysicalTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn state(&self) -> PhysicalState {
        self.state
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl Dut for PhysicalDut {
    fn kind(&self) -> DutKind {
        DutKind::Physical
    }

    fn start(&mut self) -> Result<(), DutError> {
        if self.channel.is_some() {
            return Err(DutError::AlreadyStarted);
        }

        let port = (self.opener)(&self.port_name, self.port_config)?;
        let mut channel = CommandChannel::with_prompt(port, &self.prompt);

        std::thread::sleep(Duration::from_millis(self.timings.open_settle_ms));
        channel.discard_input()?;
        std::thread::sleep(Duration::from_millis(self.timings.flush_settle_ms));

        info!(port = %self.port_name, baud = self.port_config.baud_rate, "physical DUT connected");
        self.channel = Some(channel);
        self.state = PhysicalState::Open;
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(channel) = self.channel.take() {
            // Dropping the port closes the descriptor; a board that already
            // vanished has nothing left to report.
            drop(channel.into_inner());
            debug!(port = %self.port_name, "physical DUT port closed");
        }
        if self.state == PhysicalState::Open {
            self.state = PhysicalState::Closed;
        }
    }

    fn send_command(&mut self, command: &str, timeout: Duration) -> Result<String, DutError> {
        let channel = self.channel.as_mut().ok_or(DutError::NotConnected)?;
        Ok(channel.send_command(command, timeout)?)
    }

    fn is_connected(&self) -> bool {
        self.channel.is_some()
    }
}

impl Drop for PhysicalDut {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for PhysicalDut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicalDut")
            .field("port_name", &self.port_name)
            .field("baud_rate", &self.port_config.baud_rate)
            .field("state", &self.state)
            .finish()
    }
}
