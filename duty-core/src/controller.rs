//! Power-Mode Controller
//!
//! Owns the HAL context, both status LEDs and the configuration. Boots once,
//! then runs the Run → Quiescing → Armed → Sleeping → Waking → Run cycle
//! until an error sends it to the terminal `Halted` state.

use crate::clock::{configure_run_clock, configure_stop_wakeup_clock};
use crate::error::{FatalInitError, InitStage};
use crate::hal::{PowerControl, PowerHal, StatusLed, StopEntry, UartControl};
use crate::quiesce::quiesce_all_gpio;
use crate::types::{PowerConfig, PowerState, WakeSource};
use crate::uart::configure_lpuart;
use crate::wakeup::{configure_alarm, configure_calendar, configure_tamper, init_rtc, WakeupTimer};

/// Stop-mode duty-cycle controller
pub struct PowerController<H, L1, L2> {
    hal: H,
    run_led: L1,
    fault_led: L2,
    config: PowerConfig,
    state: PowerState,
    wakeup: WakeupTimer,
    cycles: u32,
    uart_ready: bool,
    uart_warned: bool,
    /// First failure; once set every further step reports it again
    fault: Option<FatalInitError>,
}

impl<H, L1, L2> PowerController<H, L1, L2>
where
    H: PowerHal,
    L1: StatusLed,
    L2: StatusLed,
{
    /// `run_led` is LED1, `fault_led` is LED2
    pub fn new(hal: H, run_led: L1, fault_led: L2, config: PowerConfig) -> Self {
        Self {
            hal,
            run_led,
            fault_led,
            config,
            state: PowerState::Run,
            wakeup: WakeupTimer::new(),
            cycles: 0,
            uart_ready: false,
            uart_warned: false,
            fault: None,
        }
    }

    pub fn state(&self) -> PowerState {
        self.state
    }

    /// Completed sleep cycles
    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    pub fn config(&self) -> &PowerConfig {
        &self.config
    }

    pub fn hal(&mut self) -> &mut H {
        &mut self.hal
    }

    /// Failure that stopped the controller, if any
    pub fn fault(&self) -> Option<FatalInitError> {
        self.fault
    }

    /// One-time initialization: LEDs, run clock, stop-wakeup clock, LPUART1,
    /// RTC, calendar, alarm, tamper
    pub fn boot(&mut self) -> Result<(), FatalInitError> {
        self.checked(Self::boot_steps)
    }

    /// One full pass from `Run` back to `Run`. Returns what ended the sleep.
    /// After a failure the controller stays `Halted` and keeps returning
    /// that first error without touching the hardware.
    pub fn run_cycle(&mut self) -> Result<WakeSource, FatalInitError> {
        self.checked(Self::cycle)
    }

    fn checked<T>(
        &mut self,
        step: fn(&mut Self) -> Result<T, FatalInitError>,
    ) -> Result<T, FatalInitError> {
        if let Some(err) = self.fault {
            return Err(err);
        }
        step(self).map_err(|err| {
            self.latch(err);
            err
        })
    }

    fn latch(&mut self, err: FatalInitError) {
        self.state = PowerState::Halted;
        if self.fault.is_none() {
            self.fault = Some(err);
        }
    }

    fn boot_steps(&mut self) -> Result<(), FatalInitError> {
        info!("boot");
        let led = FatalInitError::at(InitStage::Led);
        self.run_led.init().map_err(&led)?;
        self.fault_led.init().map_err(&led)?;

        configure_run_clock(self.hal.clock(), &self.config.run_clock)?;
        configure_stop_wakeup_clock(self.hal.clock(), self.config.stop_wakeup_clock)?;

        configure_lpuart(self.hal.uart(), &self.config.uart)?;
        self.uart_ready = true;

        init_rtc(self.hal.rtc(), &self.config.rtc)?;
        configure_calendar(self.hal.rtc(), &self.config.calendar)?;
        configure_alarm(self.hal.rtc(), &self.config.alarm)?;
        configure_tamper(self.hal.rtc(), &self.config.tamper)?;

        self.state = PowerState::Run;
        info!("boot complete");
        Ok(())
    }

    fn cycle(&mut self) -> Result<WakeSource, FatalInitError> {
        self.enter(PowerState::Quiescing);
        self.warn_uart_pins();
        quiesce_all_gpio(&mut self.hal, &mut self.wakeup, &self.config.quiesce)?;

        self.enter(PowerState::Armed);
        self.wakeup.arm(self.hal.rtc(), &self.config.wakeup)?;

        self.enter(PowerState::Sleeping);
        let source = self.hal.power().enter_stop2(StopEntry::Wfi);

        self.enter(PowerState::Waking);
        debug!("woke: {:?}", source);
        configure_run_clock(self.hal.clock(), &self.config.run_clock)?;
        let led = FatalInitError::at(InitStage::Led);
        // Quiescing left the LED pin in analog mode
        self.run_led.init().map_err(&led)?;
        self.run_led.on().map_err(&led)?;

        self.enter(PowerState::Run);
        self.cycles = self.cycles.wrapping_add(1);
        Ok(source)
    }

    /// Boot, then cycle forever. Any failure ends in [`Self::error_handler`].
    pub fn run(mut self) -> ! {
        if let Err(err) = self.boot() {
            self.error_handler(err);
        }
        loop {
            if let Err(err) = self.run_cycle() {
                self.error_handler(err);
            }
        }
    }

    /// Terminal state: LED2 on, interrupts masked, halt. Only a reset leaves it.
    pub fn error_handler(&mut self, err: FatalInitError) -> ! {
        error!("{:?} failed: {:?}", err.stage, err.cause);
        self.latch(err);
        // Best effort: the pin may have been quiesced, and a failing LED must
        // not keep the device from halting
        let _ = self.fault_led.init();
        let _ = self.fault_led.on();
        self.hal.power().disable_interrupts();
        self.hal.power().halt()
    }

    fn enter(&mut self, next: PowerState) {
        debug_assert_eq!(self.state.next(), Some(next));
        trace!("{:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn warn_uart_pins(&mut self) {
        if !self.uart_ready || self.uart_warned {
            return;
        }
        let (port, pins) = self.hal.uart().pins();
        if self.config.quiesce.touches(port, pins) {
            warn!("quiescing LPUART1 pins on port {}; UART is lost after the first sleep", port.letter());
            self.uart_warned = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::mock::{HalCall, LedId, MockBus, MockHal, MockLed};
    use crate::hal::HalError;

    #[test]
    fn test_new_controller_starts_in_run() {
        let bus = MockBus::new();
        let controller = PowerController::new(
            MockHal::new(&bus),
            MockLed::new(&bus, LedId::Run),
            MockLed::new(&bus, LedId::Fault),
            PowerConfig::default(),
        );
        assert_eq!(controller.state(), PowerState::Run);
        assert_eq!(controller.cycles(), 0);
        assert!(bus.calls().is_empty());
    }

    #[test]
    fn test_cycle_returns_wake_source() {
        let bus = MockBus::new();
        bus.wake_with(WakeSource::Alarm);
        let mut controller = PowerController::new(
            MockHal::new(&bus),
            MockLed::new(&bus, LedId::Run),
            MockLed::new(&bus, LedId::Fault),
            PowerConfig::default(),
        );
        controller.boot().unwrap();
        assert_eq!(controller.run_cycle(), Ok(WakeSource::Alarm));
        assert_eq!(controller.cycles(), 1);
        assert_eq!(controller.state(), PowerState::Run);
        assert_eq!(bus.count(|c| *c == HalCall::EnterStop2), 1);
    }

    #[test]
    fn test_failed_cycle_halts_and_retry_repeats_error() {
        let bus = MockBus::new();
        let mut controller = PowerController::new(
            MockHal::new(&bus),
            MockLed::new(&bus, LedId::Run),
            MockLed::new(&bus, LedId::Fault),
            PowerConfig::default(),
        );
        controller.boot().unwrap();
        bus.fail_when(|c| matches!(c, HalCall::WakeupArm { .. }), 1, HalError::Rejected);

        let err = FatalInitError::new(InitStage::WakeupArm, HalError::Rejected);
        assert_eq!(controller.run_cycle(), Err(err));
        assert_eq!(controller.state(), PowerState::Halted);
        assert_eq!(controller.fault(), Some(err));

        let logged = bus.calls().len();
        assert_eq!(controller.run_cycle(), Err(err));
        assert_eq!(controller.boot(), Err(err));
        assert_eq!(bus.calls().len(), logged);
        assert_eq!(controller.cycles(), 0);
    }

    #[test]
    fn test_error_handler_records_fault() {
        let bus = MockBus::new();
        let mut controller = PowerController::new(
            MockHal::new(&bus),
            MockLed::new(&bus, LedId::Run),
            MockLed::new(&bus, LedId::Fault),
            PowerConfig::default(),
        );
        let err = FatalInitError::new(InitStage::Tamper, HalError::Timeout);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            controller.error_handler(err)
        }));
        assert!(result.is_err());
        assert_eq!(controller.fault(), Some(err));
        assert_eq!(controller.state(), PowerState::Halted);
    }
}
