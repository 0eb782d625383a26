//! Bench test suite.
//!
//! These tests require a real board (and, for some, a supply and mux) and
//! are ignored by default.
//! Run with: ADC_HIL_CONFIG=bench.toml cargo test --features hardware-tests -- --ignored

#![cfg(feature = "hardware-tests")]

#[path = "hardware/mod.rs"]
mod hardware;

pub use hardware::*;
