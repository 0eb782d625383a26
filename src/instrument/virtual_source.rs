//! Injection through the firmware shell.

use super::{check_channel, Instrument, InstrumentError, InstrumentKind};
use crate::channel::DEFAULT_COMMAND_TIMEOUT;
use crate::dut::SharedDut;
use std::time::Duration;
use tracing::debug;

/// Sets emulated ADC inputs with the `adcset` shell command.
///
/// Rides on the DUT's lifecycle: `connect` and `disconnect` do nothing and
/// the DUT must already be started.
#[derive(Debug)]
pub struct VirtualInstrument {
    dut: SharedDut,
    num_channels: Option<u8>,
    timeout: Duration,
}

impl VirtualInstrument {
    pub fn new(dut: SharedDut) -> Self {
        Self {
            dut,
            num_channels: None,
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// How long each `adcset` may take to answer.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Reject channels at or above `count` without touching the DUT.
    pub fn with_channel_count(mut self, count: u8) -> Self {
        self.num_channels = Some(count);
        self
    }

    pub fn dut(&self) -> &SharedDut {
        &self.dut
    }
}

impl Instrument for VirtualInstrument {
    fn kind(&self) -> InstrumentKind {
        InstrumentKind::Virtual
    }

    fn connect(&mut self) -> Result<(), InstrumentError> {
        Ok(())
    }

    fn disconnect(&mut self) {}

    fn set_voltage(&mut self, channel: u8, millivolts: u32) -> Result<(), InstrumentError> {
        check_channel(channel, self.num_channels)?;

        let response = self
            .dut
            .lock()
            .send_command(&format!("adcset {channel} {millivolts}"), self.timeout)?;

        if !response.contains(&format!("Set ch[{channel}]")) {
            return Err(InstrumentError::NotAcknowledged { channel, response });
        }
        debug!(channel, millivolts, "injected ADC value");
        Ok(())
    }

    fn enable_output(&mut self, _channel: u8, _enabled: bool) -> Result<(), InstrumentError> {
        Ok(())
    }
}
