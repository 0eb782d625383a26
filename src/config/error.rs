//! Errors raised while loading or checking a harness configuration.

use std::path::PathBuf;
use thiserror::Error;

/// Everything that can be wrong with a bench description.
///
/// All of these surface before any port is opened or process spawned.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No file at the named path, or none in any search location.
    #[error("Harness configuration not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Cannot read harness configuration '{}': {source}", .path.display())]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed TOML, a missing required table, or an unknown `type`.
    #[error("Invalid harness configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Cannot render harness configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// A value parsed but is out of range or inconsistent.
    #[error("Bad value for '{key}': {message}")]
    ValidationError { key: String, message: String },

    #[error("Bad value in environment variable {var}: {message}")]
    EnvParseError { var: String, message: String },

    /// A key the selected variant needs was left empty.
    #[error("'{0}' is required for the selected configuration")]
    MissingRequired(String),
}

impl ConfigError {
    pub fn validation(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationError {
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn env_parse(var: impl Into<String>, message: impl Into<String>) -> Self {
        Self::EnvParseError {
            var: var.into(),
            message: message.into(),
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
