//! Mock controller construction and call traces

use duty_core::hal::mock::{HalCall, LedId, MockBus, MockHal, MockLed, LOG_CAPACITY};
use duty_core::test_utils::{boot_sequence, cycle_sequence};
use duty_core::{FatalInitError, PowerConfig, PowerController, WakeSource};
use heapless::Vec;

pub type MockController<'a> = PowerController<MockHal<'a>, MockLed<'a>, MockLed<'a>>;

/// Call log of one mock run
pub type Trace = Vec<HalCall, LOG_CAPACITY>;

/// Controller wired to `bus`: LED1 as the run LED, LED2 as the fault LED
pub fn controller(bus: &MockBus, config: PowerConfig) -> MockController<'_> {
    PowerController::new(
        MockHal::new(bus),
        MockLed::new(bus, LedId::Run),
        MockLed::new(bus, LedId::Fault),
        config,
    )
}

/// Most cycles whose calls still fit in the mock log after boot
pub fn max_cycles(config: &PowerConfig) -> usize {
    let boot = boot_sequence(config).len();
    let cycle = cycle_sequence(config, WakeSource::WakeupTimer).len();
    (LOG_CAPACITY - boot) / cycle
}

/// Boot, then run `cycles` sleep cycles and return every HAL call made
pub fn trace(config: PowerConfig, cycles: usize) -> Result<Trace, FatalInitError> {
    let bus = MockBus::new();
    let mut ctl = controller(&bus, config);
    ctl.boot()?;
    for _ in 0..cycles {
        ctl.run_cycle()?;
    }
    Ok(bus.calls())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_cycles_fit_in_log() {
        let config = PowerConfig::default();
        let cycles = max_cycles(&config);
        assert!(cycles >= 10);

        let calls = trace(config, cycles).unwrap();
        assert!(calls.len() <= LOG_CAPACITY);
    }
}
