//! Configuration loader with file resolution and environment override support.

use super::error::{ConfigError, ConfigResult};
use super::schema::{DutConfig, HarnessConfig};
use std::path::{Path, PathBuf};

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "ADC_HIL";

/// Config file name, both in the working directory and the config dir.
pub const CONFIG_FILE_NAME: &str = "adc-hil.toml";

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "ADC_HIL_CONFIG";

/// Where the Zephyr tooling records its SDK install.
pub const ZEPHYR_SDK_ENV: &str = "ZEPHYR_SDK_INSTALL_DIR";

/// A validated configuration and the file it came from.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config_path: PathBuf,
    config: HarnessConfig,
}

impl ConfigLoader {
    /// Find, read, override and validate the configuration.
    ///
    /// Resolution priority (highest to lowest):
    /// 1. `ADC_HIL_CONFIG` environment variable (explicit path)
    /// 2. `./adc-hil.toml` (current directory)
    /// 3. `<config dir>/adc-hil/adc-hil.toml` (`~/.config` on Linux)
    ///
    /// There is no built-in fallback; a bench must be described.
    pub fn load() -> ConfigResult<Self> {
        let path = resolve_config_path().ok_or_else(|| ConfigError::NotFound(PathBuf::from(CONFIG_FILE_NAME)))?;
        Self::load_from(path)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self {
            config_path: path,
            config,
        })
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn into_config(self) -> HarnessConfig {
        self.config
    }
}

/// Resolve the configuration file path using standard locations.
///
/// An explicit `ADC_HIL_CONFIG` is returned even if it does not exist, so
/// the caller reports the path the user asked for.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
        return Some(PathBuf::from(path));
    }

    let cwd_config = PathBuf::from(CONFIG_FILE_NAME);
    if cwd_config.is_file() {
        return Some(cwd_config);
    }

    default_config_path().filter(|p| p.is_file())
}

/// `<config dir>/adc-hil/adc-hil.toml` for this platform.
pub fn default_config_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.config_dir().join("adc-hil").join(CONFIG_FILE_NAME))
}

fn load_from_file(path: &Path) -> ConfigResult<HarnessConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ConfigError::NotFound(path.to_path_buf()),
        _ => ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        },
    })?;

    HarnessConfig::from_toml(&content)
}

/// Apply `ADC_HIL_*` overrides from the process environment.
///
/// - `ADC_HIL_NUM_CHANNELS=4`
/// - `ADC_HIL_DUT_PORT=/dev/ttyACM0` (physical DUT)
/// - `ADC_HIL_DUT_BAUD_RATE=115200` (physical DUT)
/// - `ADC_HIL_DUT_BOOT_TIMEOUT_MS=8000` (emulated DUT)
/// - `ADC_HIL_LOG_LEVEL=debug`
/// - `ZEPHYR_SDK_INSTALL_DIR` fills an unset SDK path
pub fn apply_env_overrides(config: &mut HarnessConfig) -> ConfigResult<()> {
    apply_overrides_from(config, |var| std::env::var(var).ok())
}

/// Apply overrides from any variable source.
pub fn apply_overrides_from<F>(config: &mut HarnessConfig, lookup: F) -> ConfigResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |key: &str| format!("{ENV_PREFIX}_{key}");

    if let Some(val) = lookup(&var("NUM_CHANNELS")) {
        config.num_channels = val
            .trim()
            .parse()
            .map_err(|_| ConfigError::env_parse(var("NUM_CHANNELS"), "Invalid channel count"))?;
    }
    if let Some(val) = lookup(&var("LOG_LEVEL")) {
        config.logging.level = val;
    }

    match &mut config.dut {
        DutConfig::Physical(physical) => {
            if let Some(val) = lookup(&var("DUT_PORT")) {
                physical.port = val;
            }
            if let Some(val) = lookup(&var("DUT_BAUD_RATE")) {
                physical.baud_rate = val
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::env_parse(var("DUT_BAUD_RATE"), "Invalid baud rate"))?;
            }
            if lookup(&var("DUT_BOOT_TIMEOUT_MS")).is_some() {
                return Err(ConfigError::env_parse(
                    var("DUT_BOOT_TIMEOUT_MS"),
                    "only applies to a qemu DUT",
                ));
            }
        }
        DutConfig::Qemu(qemu) => {
            if let Some(val) = lookup(&var("DUT_BOOT_TIMEOUT_MS")) {
                qemu.boot_timeout_ms = val
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::env_parse(var("DUT_BOOT_TIMEOUT_MS"), "Invalid timeout"))?;
            }
            for key in ["DUT_PORT", "DUT_BAUD_RATE"] {
                if lookup(&var(key)).is_some() {
                    return Err(ConfigError::env_parse(var(key), "only applies to a physical DUT"));
                }
            }
            if qemu.zephyr_sdk_path.is_none() {
                qemu.zephyr_sdk_path = lookup(ZEPHYR_SDK_ENV)
                    .filter(|v| !v.is_empty())
                    .map(PathBuf::from);
            }
        }
    }

    Ok(())
}
