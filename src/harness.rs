//! Harness composition: configuration in, started DUT and instrument out.
//!
//! # Architecture
//!
//! ```text
//! HarnessConfig ──> build_dut ────────> SharedDut ──────┐
//!              └──> build_instrument ─> Box<dyn Instrument> ──> Harness
//! ```
//!
//! Building never touches hardware. [`Harness::start`] starts the DUT and
//! then connects the instrument; [`Harness::shutdown`] (and `Drop`)
//! disconnects the instrument and then stops the DUT.

use crate::config::{
    ConfigError, DutConfig, HarnessConfig, InstrumentConfig, PhysicalInstrumentConfig,
};
use crate::dut::{self, Dut, EmulatorDut, EmulatorSettings, PhysicalDut, SharedDut};
use crate::error::{HarnessError, HarnessResult};
use crate::instrument::{
    Dp832, Instrument, InstrumentKind, PhysicalInstrument, SerialMux, SupplySettings,
    VirtualInstrument,
};
use crate::port::PortConfiguration;
use crate::regdump::{
    parse_channel_value, within_tolerance, RegisterDump, PHYSICAL_TOLERANCE_MV, VIRTUAL_TOLERANCE_MV,
};
use std::time::Duration;
use tracing::{info, warn};

/// Register dump command.
pub const READ_REGS_COMMAND: &str = "adcregs";

/// Wait after injecting before reading back: two sampling periods.
pub const SAMPLE_SETTLE: Duration = Duration::from_millis(200);

// ========== Factories ==========

/// Construct the DUT the configuration describes. No I/O.
pub fn build_dut(config: &HarnessConfig) -> Result<Box<dyn Dut>, ConfigError> {
    let prompt = config.command.prompt.clone();
    match &config.dut {
        DutConfig::Qemu(qemu) => Ok(Box::new(EmulatorDut::new(EmulatorSettings {
            emulator_path: qemu.emulator_path.clone(),
            sdk_path: qemu.zephyr_sdk_path.clone(),
            kernel_path: qemu.kernel_path.clone(),
            project_root: qemu.project_root.clone(),
            boot_timeout: qemu.boot_timeout(),
            prompt,
            timings: qemu.timings,
        }))),
        DutConfig::Physical(physical) => {
            if physical.port.trim().is_empty() {
                return Err(ConfigError::MissingRequired("dut.port".to_string()));
            }
            Ok(Box::new(
                PhysicalDut::new(physical.port.clone(), PortConfiguration::with_baud(physical.baud_rate))
                    .with_timings(physical.timings)
                    .with_prompt(prompt),
            ))
        }
    }
}

/// Construct the instrument the configuration describes. No I/O.
///
/// A virtual instrument drives `dut`; a physical one ignores it.
pub fn build_instrument(config: &HarnessConfig, dut: &SharedDut) -> Result<Box<dyn Instrument>, ConfigError> {
    match &config.instrument {
        InstrumentConfig::Virtual => Ok(Box::new(
            VirtualInstrument::new(dut.clone())
                .with_channel_count(config.num_channels)
                .with_command_timeout(config.command.timeout()),
        )),
        InstrumentConfig::Physical(physical) => Ok(Box::new(
            build_physical_instrument(physical)?.with_channel_count(config.num_channels),
        )),
    }
}

fn build_physical_instrument(config: &PhysicalInstrumentConfig) -> Result<PhysicalInstrument, ConfigError> {
    let supply_config = &config.power_supply;
    if config.mux.port.trim().is_empty() {
        return Err(ConfigError::MissingRequired("instrument.mux.port".to_string()));
    }

    let supply = Dp832::new(supply_config.resource()?).with_timeout(supply_config.timeout());
    let mux = SerialMux::new(config.mux.port.clone(), PortConfiguration::with_baud(config.mux.baud_rate))
        .with_ack_timeout(config.mux.timeout());

    Ok(PhysicalInstrument::new(
        Box::new(supply),
        Box::new(mux),
        SupplySettings {
            channel: supply_config.channel,
            current_limit: supply_config.current_limit,
        },
    ))
}

// ========== Session ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarnessState {
    Built,
    Running,
    ShutDown,
}

/// A DUT and an instrument with nested lifetimes.
#[derive(Debug)]
pub struct Harness {
    config: HarnessConfig,
    dut: SharedDut,
    instrument: Box<dyn Instrument>,
    state: HarnessState,
}

impl Harness {
    /// Validate `config` and build both halves. Nothing is opened yet.
    pub fn from_config(config: HarnessConfig) -> HarnessResult<Self> {
        config.validate()?;
        let dut = build_dut(&config)?;
        Self::with_dut(config, dut)
    }

    /// Use a caller-supplied DUT; the instrument still comes from `config`.
    pub fn with_dut(config: HarnessConfig, dut: Box<dyn Dut>) -> HarnessResult<Self> {
        let dut = dut::shared(dut);
        let instrument = build_instrument(&config, &dut)?;
        Ok(Self::from_parts(config, dut, instrument))
    }

    /// Assemble from already built parts.
    pub fn from_parts(config: HarnessConfig, dut: SharedDut, instrument: Box<dyn Instrument>) -> Self {
        Self {
            config,
            dut,
            instrument,
            state: HarnessState::Built,
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn state(&self) -> HarnessState {
        self.state
    }

    pub fn dut(&self) -> &SharedDut {
        &self.dut
    }

    pub fn instrument(&mut self) -> &mut dyn Instrument {
        self.instrument.as_mut()
    }

    /// Start the DUT, then connect the instrument.
    ///
    /// If the instrument cannot connect the DUT is stopped again before the
    /// error is returned.
    pub fn start(&mut self) -> HarnessResult<()> {
        self.dut.lock().start()?;

        if let Err(e) = self.instrument.connect() {
            warn!(error = %e, "instrument connect failed, stopping DUT");
            self.dut.lock().stop();
            return Err(e.into());
        }

        self.state = HarnessState::Running;
        info!(
            dut = %self.dut.lock().kind(),
            instrument = %self.instrument.kind(),
            "harness started"
        );
        Ok(())
    }

    /// Disconnect the instrument, then stop the DUT. Idempotent.
    pub fn shutdown(&mut self) {
        if self.state != HarnessState::Running {
            return;
        }
        self.instrument.disconnect();
        self.dut.lock().stop();
        self.state = HarnessState::ShutDown;
        info!("harness shut down");
    }

    /// Send one shell command with the configured timeout.
    pub fn send_command(&self, command: &str) -> HarnessResult<String> {
        Ok(self
            .dut
            .lock()
            .send_command(command, self.config.command.timeout())?)
    }

    /// Read and parse the register dump.
    pub fn read_registers(&self) -> HarnessResult<RegisterDump> {
        let response = self.send_command(READ_REGS_COMMAND)?;
        Ok(RegisterDump::parse(&response)?)
    }

    /// Enable the channel's output and drive it to `millivolts`.
    pub fn inject(&mut self, channel: u8, millivolts: u32) -> HarnessResult<()> {
        self.instrument.enable_output(channel, true)?;
        self.instrument.set_voltage(channel, millivolts)?;
        Ok(())
    }

    /// Readback tolerance for the configured instrument.
    pub fn tolerance_mv(&self) -> u32 {
        match self.instrument.kind() {
            InstrumentKind::Virtual => VIRTUAL_TOLERANCE_MV,
            InstrumentKind::Physical => PHYSICAL_TOLERANCE_MV,
        }
    }

    /// Inject each `(channel, millivolts)` pair, wait `settle`, and check
    /// the register dump against every injected value.
    pub fn verify_injection(&mut self, values: &[(u8, u32)], settle: Duration) -> HarnessResult<RegisterDump> {
        for &(channel, millivolts) in values {
            self.inject(channel, millivolts)?;
        }
        std::thread::sleep(settle);

        let response = self.send_command(READ_REGS_COMMAND)?;
        let dump = RegisterDump::parse(&response)?;
        let tolerance = self.tolerance_mv();
        for &(channel, expected) in values {
            let actual = parse_channel_value(&response, channel)?;
            if !within_tolerance(actual, expected, tolerance) {
                return Err(HarnessError::Mismatch {
                    channel,
                    expected,
                    actual,
                    tolerance,
                });
            }
        }
        Ok(dump)
    }

    /// ch0 = 2500 mV, ch1 = 1000 mV, read back after two sampling periods.
    pub fn smoke(&mut self) -> HarnessResult<RegisterDump> {
        self.verify_injection(&[(0, 2500), (1, 1000)], SAMPLE_SETTLE)
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.shutdown();
    }
}
