#![no_std]

//! Firmware library for the Nucleo-L4R5ZI: register-level HAL and board map
//!
//! The binary in `main.rs` owns the vector table and the time driver; this
//! library only holds code that is safe to link into other images.

pub use duty_core::*;

pub use crate::board::*;
pub use crate::stm32l4_hardware::*;

pub mod board;
pub mod regs;
pub mod stm32l4_hardware;
