//! Errors raised by stimulus instruments.

use crate::dut::DutError;
use crate::port::PortError;
use thiserror::Error;

/// Errors that can occur while driving a stimulus instrument.
#[derive(Debug, Error)]
pub enum InstrumentError {
    /// An operation was attempted before `connect` or after `disconnect`.
    #[error("Instrument is not connected. Call connect() first.")]
    NotConnected,

    /// The firmware did not confirm an injection.
    #[error("Failed to inject ADC value on channel {channel}: {response:?}")]
    NotAcknowledged { channel: u8, response: String },

    /// The channel is outside the configured channel count.
    #[error("Channel {channel} is out of range (configured channels: {count})")]
    ChannelOutOfRange { channel: u8, count: u8 },

    /// The VISA resource string is not a raw TCP socket resource.
    #[error("Unsupported VISA resource '{0}'. Expected TCPIP[n]::<host>::<port>::SOCKET")]
    InvalidResource(String),

    /// Opening a connection to lab equipment failed.
    #[error("Failed to connect to '{target}': {source}")]
    Connect {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// An I/O failure while talking to the power supply.
    #[error("Power supply command '{command}' failed: {source}")]
    Supply {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The multiplexer did not confirm a channel selection.
    #[error("Mux did not acknowledge channel {channel}: {response:?}")]
    Mux { channel: u8, response: String },

    /// Injection goes through the DUT, which failed.
    #[error(transparent)]
    Dut(#[from] DutError),

    /// The multiplexer's serial port failed.
    #[error(transparent)]
    Port(#[from] PortError),
}

impl InstrumentError {
    pub fn supply(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::Supply {
            command: command.into(),
            source,
        }
    }

    /// True for errors caused by calling an operation on a closed session.
    pub fn is_not_connected(&self) -> bool {
        matches!(
            self,
            Self::NotConnected | Self::Dut(DutError::NotConnected)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dut_not_connected_counts_as_not_connected() {
        assert!(InstrumentError::NotConnected.is_not_connected());
        assert!(InstrumentError::from(DutError::NotConnected).is_not_connected());
        assert!(!InstrumentError::InvalidResource("x".into()).is_not_connected());
    }

    #[test]
    fn test_not_acknowledged_shows_response() {
        let err = InstrumentError::NotAcknowledged {
            channel: 2,
            response: "adcset: command not found".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("channel 2"));
        assert!(msg.contains("command not found"));
    }
}
