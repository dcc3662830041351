#![cfg_attr(not(feature = "std"), no_std)]

//! # Duty Core
//!
//! Stop-mode duty-cycle orchestration for STM32L4-class microcontrollers.
//! Quiesce every GPIO, arm the RTC wakeup timer, enter Stop 2, restore the
//! run clock on wake, repeat. Hardware access goes through the capability
//! traits in [`hal`]; the firmware crate supplies the register-level side.

#[cfg(all(not(feature = "std"), any(test, feature = "test-utils")))]
extern crate std;

#[macro_use]
mod fmt;

pub mod types;
pub mod error;
pub mod hal;
pub mod clock;
pub mod wakeup;
pub mod quiesce;
pub mod uart;
pub mod controller;
pub mod interrupt;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

#[cfg(test)]
mod hal_tests;

pub use types::*;
pub use error::*;
pub use hal::{*, Duration, Instant};
pub use clock::*;
pub use wakeup::*;
pub use quiesce::*;
pub use uart::*;
pub use controller::*;
pub use interrupt::*;

/// Core library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Configuration matching the reference board: ~33 s Stop 2 cycle on an
/// 8 MHz HSE run clock, LPUART1 at 209700 baud.
pub fn default_config() -> PowerConfig {
    PowerConfig::default()
}
