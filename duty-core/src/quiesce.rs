//! Peripheral Quiescer
//!
//! Every pin of every port goes to analog mode without pull resistors before
//! each sleep, then the port clocks are gated again.

use heapless::Vec;

use crate::error::{FatalInitError, InitStage};
use crate::hal::{GpioControl, PowerHal};
use crate::types::{GpioPort, ALL_PINS};
use crate::wakeup::WakeupTimer;

/// Pins to leave untouched, per port
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct QuiesceConfig {
    keep: [u16; GpioPort::COUNT],
}

impl QuiesceConfig {
    /// Also keep `pins` of `port` in their current configuration
    pub fn keep(mut self, port: GpioPort, pins: u16) -> Self {
        self.keep[port.index()] |= pins;
        self
    }

    /// Pins of `port` that will be put in analog mode
    pub const fn pins_for(&self, port: GpioPort) -> u16 {
        ALL_PINS & !self.keep[port.index()]
    }

    /// Returns true if any pin of `mask` on `port` gets quiesced
    pub const fn touches(&self, port: GpioPort, mask: u16) -> bool {
        self.pins_for(port) & mask != 0
    }
}

/// One port's share of a quiesce pass
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PortQuiesce {
    pub port: GpioPort,
    pub pins: u16,
}

/// Transient "all ports → analog" record, rebuilt before each sleep
pub type GpioQuiesceState = Vec<PortQuiesce, { GpioPort::COUNT }>;

/// Expand `config` into the per-port pin masks of one pass
pub fn plan(config: &QuiesceConfig) -> GpioQuiesceState {
    GpioPort::ALL
        .iter()
        .map(|&port| PortQuiesce {
            port,
            pins: config.pins_for(port),
        })
        .collect()
}

/// Clocks on, pins to analog, clocks off for every port in `state`
pub fn apply<G: GpioControl>(gpio: &mut G, state: &GpioQuiesceState) -> Result<(), FatalInitError> {
    let tag = FatalInitError::at(InitStage::Quiesce);
    for entry in state {
        gpio.enable_port_clock(entry.port).map_err(&tag)?;
    }
    for entry in state.iter().filter(|entry| entry.pins != 0) {
        gpio.configure_analog(entry.port, entry.pins).map_err(&tag)?;
    }
    for entry in state {
        gpio.disable_port_clock(entry.port).map_err(&tag)?;
    }
    Ok(())
}

/// Quiesce every GPIO port, then drop any armed or pending wakeup so the
/// next arm starts clean.
pub fn quiesce_all_gpio<H: PowerHal>(
    hal: &mut H,
    timer: &mut WakeupTimer,
    config: &QuiesceConfig,
) -> Result<(), FatalInitError> {
    let state = plan(config);
    apply(hal.gpio(), &state)?;
    timer.disarm(hal.rtc())?;
    trace!("quiesced {} ports", state.len());
    Ok(())
}
