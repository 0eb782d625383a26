//! The board's console UART on its own, without the harness.

use super::utils::{physical_bench, print_available_ports};
use adc_hil::channel::CommandChannel;
use adc_hil::config::DutConfig;
use adc_hil::port::{PortConfiguration, SyncSerialPort};
use std::time::Duration;

#[test]
#[ignore] // Run with --ignored flag
fn test_console_answers_with_prompt() {
    let Some(config) = physical_bench() else { return };
    let DutConfig::Physical(dut) = &config.dut else { return };

    print_available_ports();
    let port = SyncSerialPort::open(&dut.port, PortConfiguration::with_baud(dut.baud_rate))
        .expect("open console UART");
    let mut channel = CommandChannel::with_prompt(port, &config.command.prompt);
    channel.discard_input().expect("discard boot output");

    let t = channel
        .transact("", Duration::from_secs(2))
        .expect("transaction on console UART");
    println!("Empty command took {:?}", t.elapsed);
    assert!(t.saw_prompt(), "no prompt in {:?}", t.response);
}

#[test]
#[ignore]
fn test_console_reopens_after_close() {
    let Some(config) = physical_bench() else { return };
    let DutConfig::Physical(dut) = &config.dut else { return };

    for attempt in 0..3 {
        let port = SyncSerialPort::open(&dut.port, PortConfiguration::with_baud(dut.baud_rate))
            .unwrap_or_else(|e| panic!("open attempt {attempt} failed: {e}"));
        drop(port);
        std::thread::sleep(Duration::from_millis(100));
    }
}
