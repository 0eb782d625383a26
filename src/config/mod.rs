//! Declarative bench description.
//!
//! A TOML file names the DUT variant, the instrument variant and the
//! channel count. It is read once, overridden from the environment,
//! validated, and then only ever borrowed.
//!
//! # Configuration Resolution
//!
//! 1. `ADC_HIL_CONFIG` environment variable (explicit path)
//! 2. `./adc-hil.toml` (current directory)
//! 3. `<config dir>/adc-hil/adc-hil.toml`
//!
//! # Example
//!
//! ```toml
//! num_channels = 4
//!
//! [dut]
//! type = "qemu"
//! boot_timeout_ms = 5000
//!
//! [instrument]
//! type = "virtual"
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    apply_env_overrides, apply_overrides_from, default_config_path, resolve_config_path,
    ConfigLoader, CONFIG_FILE_NAME, CONFIG_PATH_ENV, ZEPHYR_SDK_ENV,
};
pub use schema::{
    CommandConfig, DutConfig, HarnessConfig, InstrumentConfig, LogFormat, LoggingConfig,
    MuxConfig, PhysicalDutConfig, PhysicalInstrumentConfig, PowerSupplyConfig, QemuDutConfig,
    DEFAULT_NUM_CHANNELS, MAX_NUM_CHANNELS,
};
