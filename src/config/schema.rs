//! Configuration schema definitions.
//!
//! One file describes one bench: which DUT, which instrument, how many ADC
//! channels the tests sweep. The `type` keys select the variant.

use super::error::{ConfigError, ConfigResult};
use crate::channel::{DEFAULT_COMMAND_TIMEOUT, DEFAULT_PROMPT};
use crate::dut::emulator::DEFAULT_BOOT_TIMEOUT;
use crate::dut::{EmulatorTimings, PhysicalTimings};
use crate::instrument::physical::{DEFAULT_CURRENT_LIMIT, DEFAULT_SUPPLY_CHANNEL};
use crate::instrument::VisaResource;
use crate::port::DEFAULT_BAUD_RATE;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Channel count swept when the file does not say.
pub const DEFAULT_NUM_CHANNELS: u8 = 15;

/// Highest channel count the mux can address.
pub const MAX_NUM_CHANNELS: u8 = 16;

/// Root configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Number of ADC channels under test.
    #[serde(default = "default_num_channels")]
    pub num_channels: u8,
    /// Device under test. Required: there is no sensible default target.
    pub dut: DutConfig,
    #[serde(default)]
    pub instrument: InstrumentConfig,
    #[serde(default)]
    pub command: CommandConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_num_channels() -> u8 {
    DEFAULT_NUM_CHANNELS
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_io_timeout_ms() -> u64 {
    2000
}

impl HarnessConfig {
    /// Parse a TOML document.
    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(ConfigError::ParseError)
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check cross-field constraints serde cannot express.
    pub fn validate(&self) -> ConfigResult<()> {
        if !(1..=MAX_NUM_CHANNELS).contains(&self.num_channels) {
            return Err(ConfigError::validation(
                "num_channels",
                format!("must be between 1 and {MAX_NUM_CHANNELS}, got {}", self.num_channels),
            ));
        }

        match &self.dut {
            DutConfig::Qemu(qemu) => {
                if qemu.boot_timeout_ms == 0 {
                    return Err(ConfigError::validation("dut.boot_timeout_ms", "must be positive"));
                }
            }
            DutConfig::Physical(physical) => {
                if physical.port.trim().is_empty() {
                    return Err(ConfigError::MissingRequired("dut.port".to_string()));
                }
                if physical.baud_rate == 0 {
                    return Err(ConfigError::validation("dut.baud_rate", "must be positive"));
                }
            }
        }

        if let InstrumentConfig::Physical(physical) = &self.instrument {
            physical.validate()?;
        }

        if self.command.timeout_ms == 0 {
            return Err(ConfigError::validation("command.timeout_ms", "must be positive"));
        }
        if self.command.prompt.is_empty() {
            return Err(ConfigError::validation("command.prompt", "must not be empty"));
        }
        Ok(())
    }
}

/// Device under test, selected by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DutConfig {
    /// Firmware booted under QEMU.
    Qemu(QemuDutConfig),
    /// A board on a serial port.
    Physical(PhysicalDutConfig),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QemuDutConfig {
    /// Firmware image; relative paths are taken from `project_root`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kernel_path: Option<PathBuf>,
    /// How long QEMU may take to announce its PTY.
    pub boot_timeout_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zephyr_sdk_path: Option<PathBuf>,
    /// Emulator binary; overrides the SDK lookup.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emulator_path: Option<PathBuf>,
    pub project_root: PathBuf,
    pub timings: EmulatorTimings,
}

impl Default for QemuDutConfig {
    fn default() -> Self {
        Self {
            kernel_path: None,
            boot_timeout_ms: DEFAULT_BOOT_TIMEOUT.as_millis() as u64,
            zephyr_sdk_path: None,
            emulator_path: None,
            project_root: PathBuf::from("."),
            timings: EmulatorTimings::default(),
        }
    }
}

impl QemuDutConfig {
    pub fn boot_timeout(&self) -> Duration {
        Duration::from_millis(self.boot_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalDutConfig {
    /// Serial port the board's console UART is attached to.
    pub port: String,
    #[serde(default = "default_baud_rate", alias = "baudrate")]
    pub baud_rate: u32,
    #[serde(default)]
    pub timings: PhysicalTimings,
}

/// Stimulus source, selected by `type`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InstrumentConfig {
    /// Inject values through the DUT shell.
    #[default]
    Virtual,
    /// Bench supply routed through a mux.
    Physical(PhysicalInstrumentConfig),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalInstrumentConfig {
    pub power_supply: PowerSupplyConfig,
    pub mux: MuxConfig,
}

impl PhysicalInstrumentConfig {
    fn validate(&self) -> ConfigResult<()> {
        let supply = &self.power_supply;
        if supply.visa_resource.trim().is_empty() {
            return Err(ConfigError::MissingRequired(
                "instrument.power_supply.visa_resource".to_string(),
            ));
        }
        supply.resource()?;
        if !(1..=3).contains(&supply.channel) {
            return Err(ConfigError::validation(
                "instrument.power_supply.channel",
                format!("must be 1, 2 or 3, got {}", supply.channel),
            ));
        }
        if supply.current_limit.is_nan() || supply.current_limit <= 0.0 {
            return Err(ConfigError::validation(
                "instrument.power_supply.current_limit",
                "must be a positive number of amps",
            ));
        }
        if self.mux.port.trim().is_empty() {
            return Err(ConfigError::MissingRequired("instrument.mux.port".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerSupplyConfig {
    /// `TCPIP0::<host>::<port>::SOCKET`
    pub visa_resource: String,
    /// Supply output feeding the mux.
    #[serde(default = "default_supply_channel")]
    pub channel: u8,
    /// Amps.
    #[serde(default = "default_current_limit")]
    pub current_limit: f64,
    #[serde(default = "default_io_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_supply_channel() -> u8 {
    DEFAULT_SUPPLY_CHANNEL
}

fn default_current_limit() -> f64 {
    DEFAULT_CURRENT_LIMIT
}

impl PowerSupplyConfig {
    /// Parsed VISA resource.
    pub fn resource(&self) -> ConfigResult<VisaResource> {
        self.visa_resource
            .parse()
            .map_err(|e: crate::instrument::InstrumentError| {
                ConfigError::validation("instrument.power_supply.visa_resource", e.to_string())
            })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MuxConfig {
    pub port: String,
    #[serde(default = "default_baud_rate", alias = "baudrate")]
    pub baud_rate: u32,
    /// Wait for the mux acknowledgement.
    #[serde(default = "default_io_timeout_ms")]
    pub timeout_ms: u64,
}

impl MuxConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Shell interaction settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    /// Default `send_command` timeout.
    pub timeout_ms: u64,
    /// Marker printed by the shell when idle.
    pub prompt: String,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_COMMAND_TIMEOUT.as_millis() as u64,
            prompt: DEFAULT_PROMPT.to_string(),
        }
    }
}

impl CommandConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    pub format: LogFormat,
    /// Log file path (optional); stderr otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            file: None,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    /// Multi-line with colours
    #[default]
    Pretty,
    Compact,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const QEMU: &str = r#"
        num_channels = 4

        [dut]
        type = "qemu"
        boot_timeout_ms = 8000
        kernel_path = "build-qemu/zephyr/zephyr.elf"

        [dut.timings]
        firmware_boot_ms = 100

        [instrument]
        type = "virtual"
    "#;

    const BENCH: &str = r#"
        [dut]
        type = "physical"
        port = "/dev/ttyACM0"
        baudrate = 115200

        [instrument]
        type = "physical"

        [instrument.power_supply]
        visa_resource = "TCPIP0::192.168.1.100::5555::SOCKET"
        channel = 2

        [instrument.mux]
        port = "/dev/ttyACM1"
    "#;

    #[test]
    fn test_qemu_config() {
        let config = HarnessConfig::from_toml(QEMU).unwrap();
        assert_eq!(config.num_channels, 4);
        let DutConfig::Qemu(qemu) = &config.dut else {
            panic!("expected qemu DUT");
        };
        assert_eq!(qemu.boot_timeout(), Duration::from_secs(8));
        assert_eq!(qemu.timings.firmware_boot_ms, 100);
        assert_eq!(qemu.timings.pty_settle_ms, 500);
        assert_eq!(config.instrument, InstrumentConfig::Virtual);
        assert_eq!(config.command.prompt, "uart:~$");
        config.validate().unwrap();
    }

    #[test]
    fn test_bench_config_defaults() {
        let config = HarnessConfig::from_toml(BENCH).unwrap();
        assert_eq!(config.num_channels, DEFAULT_NUM_CHANNELS);
        let InstrumentConfig::Physical(physical) = &config.instrument else {
            panic!("expected physical instrument");
        };
        assert_eq!(physical.power_supply.channel, 2);
        assert_eq!(physical.power_supply.current_limit, 0.1);
        assert_eq!(physical.mux.baud_rate, 115_200);
        config.validate().unwrap();
    }

    #[test]
    fn test_unknown_dut_type_is_a_parse_error() {
        let err = HarnessConfig::from_toml("[dut]\ntype = \"fpga\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_missing_dut_is_a_parse_error() {
        assert!(HarnessConfig::from_toml("num_channels = 4\n").is_err());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = HarnessConfig::from_toml(BENCH).unwrap();
        config.num_channels = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError { .. })));

        let mut config = HarnessConfig::from_toml(BENCH).unwrap();
        if let DutConfig::Physical(p) = &mut config.dut {
            p.port.clear();
        }
        assert!(matches!(config.validate(), Err(ConfigError::MissingRequired(_))));

        let mut config = HarnessConfig::from_toml(BENCH).unwrap();
        if let InstrumentConfig::Physical(p) = &mut config.instrument {
            p.power_supply.channel = 4;
        }
        assert!(config.validate().is_err());

        let mut config = HarnessConfig::from_toml(BENCH).unwrap();
        if let InstrumentConfig::Physical(p) = &mut config.instrument {
            p.power_supply.visa_resource = "USB0::0x1AB1::0x0E11::DP8C1::INSTR".into();
        }
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("visa_resource"));
    }

    #[test]
    fn test_toml_round_trip_keeps_variants() {
        let config = HarnessConfig::from_toml(BENCH).unwrap();
        let rendered = config.to_toml().unwrap();
        assert!(rendered.contains("type = \"physical\""));
        assert_eq!(HarnessConfig::from_toml(&rendered).unwrap(), config);
    }
}
