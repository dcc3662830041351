//! Host-based integration tests for duty-core
//!
//! Everything runs against the call-recording mock HAL. The `duty-trace`
//! binary prints the same call traces for inspection.

pub mod trace;

#[cfg(test)]
mod cycle_tests;
#[cfg(test)]
mod failure_tests;
#[cfg(test)]
mod interval_tests;
#[cfg(test)]
mod led_tests;
