//! ADC sampler hardware-in-the-loop harness.
//!
//! Drives the sampler firmware's shell on a real board over UART or on an
//! emulated target over the PTY QEMU allocates, and injects ADC stimulus
//! either through the shell or through a bench supply and multiplexer.
//!
//! # Modules
//!
//! - `port`: byte-stream abstraction over serial ports, PTYs and mocks
//! - `channel`: prompt-framed command/response transactions
//! - `dut`: the `Dut` capability with physical and emulated connectors
//! - `instrument`: the `Instrument` capability with virtual and physical sources
//! - `config`: TOML bench description with environment overrides
//! - `harness`: builds and sequences a DUT and an instrument from config
//! - `regdump`: parsing helpers for the `adcregs` register dump
//! - `logging`: tracing subscriber setup
//! - `error`: crate-level error type
//!
//! # Example
//!
//! ```rust,no_run
//! use adc_hil::config::ConfigLoader;
//! use adc_hil::harness::Harness;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::load()?.into_config();
//! let mut harness = Harness::from_config(config)?;
//! harness.start()?;
//!
//! harness.inject(0, 2500)?;
//! std::thread::sleep(adc_hil::harness::SAMPLE_SETTLE);
//! let dump = harness.read_registers()?;
//! println!("ch[0] = {:?} mV", dump.channel(0));
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod config;
pub mod dut;
pub mod error;
pub mod harness;
pub mod instrument;
pub mod logging;
pub mod port;
pub mod regdump;

// Re-export commonly used types for convenience
pub use channel::{CommandChannel, Completion, Transaction, DEFAULT_PROMPT};
pub use config::{ConfigError, ConfigLoader, HarnessConfig};
pub use dut::{Dut, DutError, DutKind, EmulatorDut, PhysicalDut, SharedDut};
pub use error::{HarnessError, HarnessResult};
pub use harness::Harness;
pub use instrument::{Instrument, InstrumentError, InstrumentKind, PhysicalInstrument, VirtualInstrument};
pub use port::{MockSerialPort, PortConfiguration, PortError, SerialPortAdapter, SyncSerialPort};
pub use regdump::{RegDumpError, RegisterDump};
