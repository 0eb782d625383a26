//! Environment lookup and setup helpers for bench tests.

use adc_hil::config::{ConfigLoader, DutConfig, HarnessConfig, InstrumentConfig, CONFIG_PATH_ENV};
use serialport::{available_ports, SerialPortType};
use std::env;

/// Load the bench configuration named by `ADC_HIL_CONFIG`.
///
/// Returns `None` (and says why) when the variable is unset, so an ignored
/// test run without a bench skips instead of failing.
pub fn bench_config() -> Option<HarnessConfig> {
    let Ok(path) = env::var(CONFIG_PATH_ENV) else {
        println!("Skipping bench test: {CONFIG_PATH_ENV} not set");
        return None;
    };
    match ConfigLoader::load_from(&path) {
        Ok(loader) => Some(loader.into_config()),
        Err(e) => panic!("bench configuration {path} is invalid: {e}"),
    }
}

/// Bench configuration whose DUT is a real board.
pub fn physical_bench() -> Option<HarnessConfig> {
    let config = bench_config()?;
    if !matches!(config.dut, DutConfig::Physical(_)) {
        println!("Skipping bench test: configured DUT is not physical");
        return None;
    }
    Some(config)
}

/// Bench configuration with a real supply and mux.
pub fn instrumented_bench() -> Option<HarnessConfig> {
    let config = physical_bench()?;
    if !matches!(config.instrument, InstrumentConfig::Physical(_)) {
        println!("Skipping bench test: configured instrument is not physical");
        return None;
    }
    Some(config)
}

/// Print the serial ports the host can see, for diagnosing a bench.
pub fn print_available_ports() {
    let ports = available_ports().unwrap_or_default();
    if ports.is_empty() {
        println!("No serial ports detected on this system");
        return;
    }

    println!("Available serial ports ({}):", ports.len());
    for port in ports {
        match port.port_type {
            SerialPortType::UsbPort(usb) => println!(
                "  {} (USB {:04x}:{:04x} {})",
                port.port_name,
                usb.vid,
                usb.pid,
                usb.product.unwrap_or_default()
            ),
            _ => println!("  {}", port.port_name),
        }
    }
}
