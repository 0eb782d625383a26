//! Errors raised by DUT connectors.

use crate::port::PortError;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while starting or talking to a device under test.
#[derive(Debug, Error)]
pub enum DutError {
    /// `send_command` was called before `start` or after `stop`.
    #[error("DUT is not connected. Call start() first.")]
    NotConnected,

    /// `start` was called on a DUT that is already running.
    #[error("DUT is already started")]
    AlreadyStarted,

    /// No emulator binary exists at any of the candidate locations.
    #[error("Emulator binary not found. Tried: {}", join_paths(.tried))]
    EmulatorNotFound { tried: Vec<PathBuf> },

    /// No firmware image exists at any of the candidate locations.
    #[error("Target image not found. Tried: {}. Build the app first.", join_paths(.tried))]
    ImageNotFound { tried: Vec<PathBuf> },

    /// The emulator process could not be launched.
    #[error("Failed to launch emulator '{}': {source}", .binary.display())]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The emulator never printed a PTY path.
    #[error("Emulator did not report a PTY path within {timeout:?}")]
    BootTimeout { timeout: Duration },

    /// The emulator exited before printing a PTY path.
    #[error("Emulator exited during boot ({status})")]
    EmulatorExited { status: ExitStatus },

    /// Reading the emulator's console output failed.
    #[error("Failed to read emulator output: {0}")]
    Output(#[source] std::io::Error),

    /// Emulated targets need PTYs, which only exist on Unix hosts.
    #[error("Emulated DUTs are only supported on Unix hosts")]
    Unsupported,

    /// A serial port error on the command channel.
    #[error(transparent)]
    Port(#[from] PortError),
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
