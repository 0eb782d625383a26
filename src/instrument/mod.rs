//! Stimulus instruments.
//!
//! An [`Instrument`] puts a voltage on an ADC input. The virtual variant
//! writes the value straight into the emulated ADC through the DUT's shell;
//! the physical variant routes a bench supply through a multiplexer:
//!
//! ```text
//! VirtualInstrument ──> SharedDut ──> "adcset <ch> <mv>"
//! PhysicalInstrument ─┬─> ChannelMux  ──> "CH <n>"
//!                     └─> PowerSupply ──> ":APPL CH<n>,<V>,<A>"
//! ```

pub mod error;
pub mod mux;
pub mod physical;
pub mod supply;
pub mod virtual_source;

pub use error::InstrumentError;
pub use mux::{ChannelMux, SerialMux};
pub use physical::{ChannelBinding, PhysicalInstrument, SupplySettings};
pub use supply::{Dp832, PowerSupply, VisaResource};
pub use virtual_source::VirtualInstrument;

use std::fmt;

/// Which instrument variant is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentKind {
    Virtual,
    Physical,
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Virtual => write!(f, "virtual"),
            Self::Physical => write!(f, "physical"),
        }
    }
}

/// Capability shared by every stimulus source.
///
/// Channels are ADC input indices starting at 0. Like [`Dut::stop`],
/// `disconnect` never fails.
///
/// [`Dut::stop`]: crate::dut::Dut::stop
pub trait Instrument: Send + fmt::Debug {
    fn kind(&self) -> InstrumentKind;

    fn connect(&mut self) -> Result<(), InstrumentError>;

    /// Release the equipment. Idempotent.
    fn disconnect(&mut self);

    fn set_voltage(&mut self, channel: u8, millivolts: u32) -> Result<(), InstrumentError>;

    fn enable_output(&mut self, channel: u8, enabled: bool) -> Result<(), InstrumentError>;
}

/// Reject channels at or beyond `count` before any I/O happens.
pub(crate) fn check_channel(channel: u8, count: Option<u8>) -> Result<(), InstrumentError> {
    match count {
        Some(count) if channel >= count => Err(InstrumentError::ChannelOutOfRange { channel, count }),
        _ => Ok(()),
    }
}
