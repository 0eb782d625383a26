//! Bench tests requiring a real board, supply and multiplexer.
//!
//! These tests are ignored by default. Point `ADC_HIL_CONFIG` at a bench
//! configuration and run them with the `--ignored` flag.

pub mod bench_tests;
pub mod port_tests;
pub mod utils;
