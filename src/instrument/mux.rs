//! Analog multiplexer seam and the serial-controlled mux driver.
//!
//! The mux controller (a KB2040 driving a CD74HC4067) takes one line per
//! selection, `CH <n>`, and answers with a line containing `OK`.

use super::InstrumentError;
use crate::channel::CommandChannel;
use crate::dut::PortOpener;
use crate::port::{PortConfiguration, SyncSerialPort};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

/// Acknowledgement the mux controller prints after switching.
pub const MUX_ACK: &str = "OK";

/// Default wait for the acknowledgement.
pub const DEFAULT_MUX_TIMEOUT: Duration = Duration::from_secs(2);

/// Routes the shared supply output to one ADC input.
pub trait ChannelMux: Send + fmt::Debug {
    fn connect(&mut self) -> Result<(), InstrumentError>;

    /// Close the port. Idempotent, never fails.
    fn close(&mut self);

    fn select(&mut self, channel: u8) -> Result<(), InstrumentError>;
}

/// Mux controller on a serial port.
pub struct SerialMux {
    port_name: String,
    port_config: PortConfiguration,
    ack_timeout: Duration,
    opener: PortOpener,
    channel: Option<CommandChannel>,
}

impl SerialMux {
    pub fn new(port_name: impl Into<String>, port_config: PortConfiguration) -> Self {
        Self {
            port_name: port_name.into(),
            port_config,
            ack_timeout: DEFAULT_MUX_TIMEOUT,
            opener: Box::new(SyncSerialPort::open_boxed),
            channel: None,
        }
    }

    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    /// Replace how the port is opened.
    pub fn with_opener(mut self, opener: PortOpener) -> Self {
        self.opener = opener;
        self
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl ChannelMux for SerialMux {
    fn connect(&mut self) -> Result<(), InstrumentError> {
        if self.channel.is_some() {
            return Ok(());
        }
        let port = (self.opener)(&self.port_name, self.port_config)?;
        self.channel = Some(CommandChannel::with_prompt(port, MUX_ACK));
        info!(port = %self.port_name, "mux connected");
        Ok(())
    }

    fn close(&mut self) {
        if self.channel.take().is_some() {
            debug!(port = %self.port_name, "mux port closed");
        }
    }

    fn select(&mut self, channel: u8) -> Result<(), InstrumentError> {
        let link = self.channel.as_mut().ok_or(InstrumentError::NotConnected)?;
        let transaction = link.transact(&format!("CH {channel}"), self.ack_timeout)?;
        if !transaction.saw_prompt() {
            return Err(InstrumentError::Mux {
                channel,
                response: transaction.response,
            });
        }
        debug!(channel, "mux routed");
        Ok(())
    }
}

impl fmt::Debug for SerialMux {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialMux")
            .field("port_name", &self.port_name)
            .field("baud_rate", &self.port_config.baud_rate)
            .field("connected", &self.channel.is_some())
            .finish()
    }
}
