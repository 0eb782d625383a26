//! Bench supply routed through a multiplexer.

use super::mux::ChannelMux;
use super::supply::PowerSupply;
use super::{check_channel, Instrument, InstrumentError, InstrumentKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Supply channel used when the configuration names none.
pub const DEFAULT_SUPPLY_CHANNEL: u8 = 1;

/// Current limit used when the configuration names none, in amps.
pub const DEFAULT_CURRENT_LIMIT: f64 = 0.1;

/// Which supply output feeds the mux and how hard it may push.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SupplySettings {
    pub channel: u8,
    pub current_limit: f64,
}

impl Default for SupplySettings {
    fn default() -> Self {
        Self {
            channel: DEFAULT_SUPPLY_CHANNEL,
            current_limit: DEFAULT_CURRENT_LIMIT,
        }
    }
}

/// Last value requested for one logical channel.
///
/// Routing another channel leaves this untouched; only the physical path
/// moves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelBinding {
    pub millivolts: Option<u32>,
    pub enabled: bool,
}

/// One supply output shared by many ADC inputs.
///
/// At most one logical channel is routed to the supply at a time: every
/// operation selects its channel on the mux before touching the supply.
#[derive(Debug)]
pub struct PhysicalInstrument {
    supply: Box<dyn PowerSupply>,
    mux: Box<dyn ChannelMux>,
    settings: SupplySettings,
    num_channels: Option<u8>,
    bindings: BTreeMap<u8, ChannelBinding>,
    routed: Option<u8>,
    connected: bool,
}

impl PhysicalInstrument {
    pub fn new(supply: Box<dyn PowerSupply>, mux: Box<dyn ChannelMux>, settings: SupplySettings) -> Self {
        Self {
            supply,
            mux,
            settings,
            num_channels: None,
            bindings: BTreeMap::new(),
            routed: None,
            connected: false,
        }
    }

    pub fn with_channel_count(mut self, count: u8) -> Self {
        self.num_channels = Some(count);
        self
    }

    pub fn settings(&self) -> SupplySettings {
        self.settings
    }

    /// Logical channel currently wired to the supply output.
    pub fn routed_channel(&self) -> Option<u8> {
        self.routed
    }

    pub fn binding(&self, channel: u8) -> Option<ChannelBinding> {
        self.bindings.get(&channel).copied()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    fn route(&mut self, channel: u8) -> Result<(), InstrumentError> {
        if !self.connected {
            return Err(InstrumentError::NotConnected);
        }
        check_channel(channel, self.num_channels)?;

        // A failed select leaves the mux in an unknown position.
        self.routed = None;
        self.mux.select(channel)?;
        self.routed = Some(channel);
        Ok(())
    }
}

impl Instrument for PhysicalInstrument {
    fn kind(&self) -> InstrumentKind {
        InstrumentKind::Physical
    }

    fn connect(&mut self) -> Result<(), InstrumentError> {
        if self.connected {
            return Ok(());
        }
        if let Err(e) = self.supply.connect() {
            self.supply.close();
            return Err(e);
        }
        if let Err(e) = self.mux.connect() {
            self.supply.close();
            return Err(e);
        }
        self.connected = true;
        info!(supply_channel = self.settings.channel, "physical instrument connected");
        Ok(())
    }

    fn disconnect(&mut self) {
        if !self.connected {
            return;
        }
        // Best effort: a supply that cannot be switched off must still be released.
        if let Err(e) = self.supply.set_output(self.settings.channel, false) {
            warn!(error = %e, "failed to disable supply output during disconnect");
        }
        self.supply.close();
        self.mux.close();

        self.connected = false;
        self.routed = None;
        for binding in self.bindings.values_mut() {
            binding.enabled = false;
        }
        debug!("physical instrument disconnected");
    }

    fn set_voltage(&mut self, channel: u8, millivolts: u32) -> Result<(), InstrumentError> {
        self.route(channel)?;

        let volts = f64::from(millivolts) / 1000.0;
        self.supply
            .apply(self.settings.channel, volts, self.settings.current_limit)?;

        self.bindings.entry(channel).or_default().millivolts = Some(millivolts);
        debug!(channel, millivolts, "supply programmed");
        Ok(())
    }

    fn enable_output(&mut self, channel: u8, enabled: bool) -> Result<(), InstrumentError> {
        self.route(channel)?;
        self.supply.set_output(self.settings.channel, enabled)?;

        self.bindings.entry(channel).or_default().enabled = enabled;
        debug!(channel, enabled, "supply output switched");
        Ok(())
    }
}

impl Drop for PhysicalInstrument {
    fn drop(&mut self) {
        self.disconnect();
    }
}
