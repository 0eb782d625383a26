//! `adc-hil` command line entry point.
//!
//! Loads the bench configuration, builds the harness and runs one
//! subcommand against the firmware shell.
//!
//! # Usage
//!
//! ```bash
//! adc-hil show-config
//! adc-hil --config bench.toml smoke
//! ```

use adc_hil::config::{ConfigLoader, HarnessConfig};
use adc_hil::error::HarnessError;
use adc_hil::harness::{Harness, READ_REGS_COMMAND, SAMPLE_SETTLE};
use adc_hil::{logging, regdump};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "adc-hil",
    version,
    about = "Hardware-in-the-loop harness for the ADC sampler firmware.",
    long_about = "Starts the configured device under test (a board on a serial port or the firmware under QEMU), connects the configured stimulus instrument, and talks to the firmware shell."
)]
struct Cli {
    /// Harness configuration file. Defaults to $ADC_HIL_CONFIG, ./adc-hil.toml, then the user config dir.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "adc_hil=trace". RUST_LOG still wins.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Send one shell command and print the raw response
    Send {
        /// Command line, e.g. "adcregs"
        text: String,

        /// Override the configured command timeout
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Print the parsed register dump
    Regs,

    /// Drive a channel to a voltage, then print its readback
    Inject {
        channel: u8,
        millivolts: u32,
    },

    /// Inject ch0 = 2500 mV and ch1 = 1000 mV and verify the readback
    Smoke,

    /// Print the resolved configuration
    ShowConfig,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

fn load_config(path: Option<PathBuf>) -> Result<HarnessConfig, HarnessError> {
    let loader = match path {
        Some(path) => ConfigLoader::load_from(path)?,
        None => ConfigLoader::load()?,
    };
    Ok(loader.into_config())
}

fn run(cli: Cli) -> Result<(), HarnessError> {
    let mut config = load_config(cli.config)?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    if let Commands::ShowConfig = cli.command {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    if let Err(e) = logging::init(&config.logging) {
        eprintln!("warning: logging disabled: {e}");
    }

    let mut harness = Harness::from_config(config)?;
    harness.start()?;

    match cli.command {
        Commands::Send { text, timeout_ms } => {
            let response = match timeout_ms {
                Some(ms) => harness
                    .dut()
                    .lock()
                    .send_command(&text, Duration::from_millis(ms))?,
                None => harness.send_command(&text)?,
            };
            println!("{response}");
        }
        Commands::Regs => {
            let dump = harness.read_registers()?;
            println!("seq:       {}", dump.seq);
            println!("timestamp: {} ms", dump.timestamp_ms);
            for (channel, mv) in &dump.channels {
                println!("ch[{channel}]: {mv} mV");
            }
        }
        Commands::Inject { channel, millivolts } => {
            harness.inject(channel, millivolts)?;
            std::thread::sleep(SAMPLE_SETTLE);
            let response = harness.send_command(READ_REGS_COMMAND)?;
            let actual = regdump::parse_channel_value(&response, channel)?;
            let seq = regdump::parse_sequence_number(&response)?;
            println!("ch[{channel}]: {actual} mV (set {millivolts} mV, seq {seq})");
        }
        Commands::Smoke => {
            let dump = harness.smoke()?;
            println!(
                "smoke passed: ch[0]={} mV ch[1]={} mV (seq {}, tolerance {} mV)",
                dump.channel(0).unwrap_or_default(),
                dump.channel(1).unwrap_or_default(),
                dump.seq,
                harness.tolerance_mv()
            );
        }
        Commands::ShowConfig => {}
    }

    harness.shutdown();
    Ok(())
}
