//! Full harness sessions against the bench.

use super::utils::{instrumented_bench, physical_bench};
use adc_hil::harness::{Harness, SAMPLE_SETTLE};
use adc_hil::regdump::PHYSICAL_TOLERANCE_MV;

#[test]
#[ignore] // Run with --ignored flag
fn test_board_register_dump() {
    let Some(config) = physical_bench() else { return };
    let mut harness = Harness::from_config(config).expect("build harness");
    harness.start().expect("start harness");

    let first = harness.read_registers().expect("first dump");
    std::thread::sleep(SAMPLE_SETTLE);
    let second = harness.read_registers().expect("second dump");

    println!("seq {} -> {}", first.seq, second.seq);
    assert!(second.seq > first.seq, "sampler is not running");
    assert!(!second.channels.is_empty());
}

#[test]
#[ignore]
fn test_bench_smoke() {
    let Some(config) = instrumented_bench() else { return };
    let mut harness = Harness::from_config(config).expect("build harness");
    harness.start().expect("start harness");
    assert_eq!(harness.tolerance_mv(), PHYSICAL_TOLERANCE_MV);

    let dump = harness.smoke().expect("smoke readback");
    println!("ch[0] = {:?} mV, ch[1] = {:?} mV", dump.channel(0), dump.channel(1));
}

#[test]
#[ignore]
fn test_bench_sweep_every_channel() {
    let Some(config) = instrumented_bench() else { return };
    let channels = config.num_channels;
    let mut harness = Harness::from_config(config).expect("build harness");
    harness.start().expect("start harness");

    for channel in 0..channels {
        let millivolts = 500 + u32::from(channel) * 150;
        harness
            .verify_injection(&[(channel, millivolts)], SAMPLE_SETTLE)
            .unwrap_or_else(|e| panic!("ch[{channel}] at {millivolts} mV: {e}"));
    }
}
