//! Parsing the `adcregs` register dump.
//!
//! The firmware prints:
//!
//! ```text
//! ADC Register File:
//!   seq:       42
//!   timestamp: 4200 ms
//!   channels:
//!     ch[0]: 2500 mV
//!     ch[1]: 1000 mV
//! ```
//!
//! The channel does not interpret responses; these helpers are for the
//! code making assertions about them.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use thiserror::Error;

/// Allowed readback error when values are injected through the shell.
pub const VIRTUAL_TOLERANCE_MV: u32 = 10;

/// Allowed readback error through a real supply, mux and ADC.
pub const PHYSICAL_TOLERANCE_MV: u32 = 50;

/// Header line of the dump.
pub const DUMP_HEADER: &str = "ADC Register File";

/// Label introducing the per-channel lines.
pub const CHANNELS_LABEL: &str = "channels:";

static SEQ: Lazy<Regex> = Lazy::new(|| Regex::new(r"seq:\s*(\d+)").expect("seq pattern is valid"));
static TIMESTAMP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"timestamp:\s*(-?\d+)\s*ms").expect("timestamp pattern is valid"));
static CHANNEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"ch\[(\d+)\]:\s*(-?\d+)\s*mV").expect("channel pattern is valid"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegDumpError {
    #[error("Not a register dump, missing {missing:?}: {response:?}")]
    NotADump {
        missing: &'static str,
        response: String,
    },

    #[error("Could not find seq in response: {0:?}")]
    MissingSequence(String),

    #[error("Could not find timestamp in response: {0:?}")]
    MissingTimestamp(String),

    #[error("Could not find ch[{channel}] in response: {response:?}")]
    MissingChannel { channel: u8, response: String },

    #[error("Value out of range in line {0:?}")]
    Overflow(String),
}

/// One snapshot of the firmware's register file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterDump {
    /// Sample counter, bumped once per sampling period.
    pub seq: u32,
    /// Uptime of the last sample.
    pub timestamp_ms: i64,
    /// Millivolts by channel index.
    pub channels: BTreeMap<u8, i32>,
}

impl RegisterDump {
    /// Parse a full `adcregs` response, echo and prompt included.
    pub fn parse(text: &str) -> Result<Self, RegDumpError> {
        if !text.contains(DUMP_HEADER) {
            return Err(RegDumpError::NotADump {
                missing: DUMP_HEADER,
                response: text.to_string(),
            });
        }
        let seq = parse_sequence_number(text)?;

        let timestamp = TIMESTAMP
            .captures(text)
            .ok_or_else(|| RegDumpError::MissingTimestamp(text.to_string()))?;
        let timestamp_ms = timestamp[1]
            .parse()
            .map_err(|_| RegDumpError::Overflow(timestamp[0].to_string()))?;

        let listing = text.find(CHANNELS_LABEL).ok_or_else(|| RegDumpError::NotADump {
            missing: CHANNELS_LABEL,
            response: text.to_string(),
        })?;

        let mut channels = BTreeMap::new();
        for caps in CHANNEL.captures_iter(&text[listing..]) {
            let overflow = || RegDumpError::Overflow(caps[0].to_string());
            let channel = caps[1].parse().map_err(|_| overflow())?;
            let millivolts = caps[2].parse().map_err(|_| overflow())?;
            channels.insert(channel, millivolts);
        }

        Ok(Self {
            seq,
            timestamp_ms,
            channels,
        })
    }

    pub fn channel(&self, channel: u8) -> Option<i32> {
        self.channels.get(&channel).copied()
    }

    /// True if `channel` reads within `tolerance_mv` of `expected_mv`.
    pub fn within(&self, channel: u8, expected_mv: u32, tolerance_mv: u32) -> bool {
        self.channel(channel)
            .is_some_and(|actual| within_tolerance(actual, expected_mv, tolerance_mv))
    }
}

/// `|actual - expected| <= tolerance`, without overflow.
pub fn within_tolerance(actual_mv: i32, expected_mv: u32, tolerance_mv: u32) -> bool {
    (i64::from(actual_mv) - i64::from(expected_mv)).unsigned_abs() <= u64::from(tolerance_mv)
}

/// Millivolts reported for one channel.
pub fn parse_channel_value(text: &str, channel: u8) -> Result<i32, RegDumpError> {
    CHANNEL
        .captures_iter(text)
        .find(|caps| caps[1].parse::<u8>().ok() == Some(channel))
        .ok_or_else(|| RegDumpError::MissingChannel {
            channel,
            response: text.to_string(),
        })
        .and_then(|caps| {
            caps[2]
                .parse()
                .map_err(|_| RegDumpError::Overflow(caps[0].to_string()))
        })
}

/// The `seq:` counter.
pub fn parse_sequence_number(text: &str) -> Result<u32, RegDumpError> {
    let caps = SEQ
        .captures(text)
        .ok_or_else(|| RegDumpError::MissingSequence(text.to_string()))?;
    caps[1]
        .parse()
        .map_err(|_| RegDumpError::Overflow(caps[0].to_string()))
}
