//! Crate-level error type.

use crate::config::ConfigError;
use crate::dut::DutError;
use crate::instrument::InstrumentError;
use crate::regdump::RegDumpError;
use thiserror::Error;

/// Any failure surfaced by a [`Harness`](crate::harness::Harness) session.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Dut(#[from] DutError),

    #[error(transparent)]
    Instrument(#[from] InstrumentError),

    #[error(transparent)]
    RegDump(#[from] RegDumpError),

    /// A readback did not match the injected value.
    #[error("ch[{channel}] read {actual} mV, expected {expected} mV +/- {tolerance} mV")]
    Mismatch {
        channel: u8,
        expected: u32,
        actual: i32,
        tolerance: u32,
    },
}

impl HarnessError {
    /// Process exit code for the CLI: 2 for configuration problems, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            _ => 1,
        }
    }
}

pub type HarnessResult<T> = Result<T, HarnessError>;
