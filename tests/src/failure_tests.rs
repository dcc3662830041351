//! Fault injection: every HAL step that can fail ends in the error handler

use std::panic::{catch_unwind, AssertUnwindSafe};

use duty_core::hal::mock::{HalCall, LedAction, LedId, MockBus, HALT_MESSAGE};
use duty_core::test_utils::{boot_sequence, fault_sequence};
use duty_core::{FatalInitError, HalError, InitStage, PowerConfig, PowerState};
use rstest::rstest;

use crate::trace::controller;

type Matcher = fn(&HalCall) -> bool;

#[cfg(test)]
mod tests {
    use super::*;

    #[rstest]
    #[case::run_led(|c: &HalCall| *c == HalCall::Led(LedId::Run, LedAction::Init), InitStage::Led)]
    #[case::fault_led(|c: &HalCall| *c == HalCall::Led(LedId::Fault, LedAction::Init), InitStage::Led)]
    #[case::voltage(|c: &HalCall| matches!(c, HalCall::VoltageScaling(_)), InitStage::VoltageScaling)]
    #[case::backup(|c: &HalCall| *c == HalCall::BackupAccess, InitStage::Oscillators)]
    #[case::lse_drive(|c: &HalCall| matches!(c, HalCall::LseDrive(_)), InitStage::Oscillators)]
    #[case::oscillators(|c: &HalCall| matches!(c, HalCall::Oscillators { .. }), InitStage::Oscillators)]
    #[case::bus(|c: &HalCall| matches!(c, HalCall::BusClocks { .. }), InitStage::BusClocks)]
    #[case::stop_clock(|c: &HalCall| matches!(c, HalCall::StopWakeupClock(_)), InitStage::StopWakeupClock)]
    #[case::uart(|c: &HalCall| matches!(c, HalCall::UartInit { .. }), InitStage::Uart)]
    #[case::uart_fifo(|c: &HalCall| matches!(c, HalCall::UartFifoMode(_)), InitStage::Uart)]
    #[case::rtc(|c: &HalCall| *c == HalCall::RtcInit, InitStage::Rtc)]
    #[case::time(|c: &HalCall| *c == HalCall::RtcSetTime, InitStage::Calendar)]
    #[case::alarm(|c: &HalCall| matches!(c, HalCall::RtcSetAlarm(_)), InitStage::Alarm)]
    #[case::tamper(|c: &HalCall| matches!(c, HalCall::RtcSetTamper(_)), InitStage::Tamper)]
    fn test_boot_step_failure_names_stage(#[case] step: Matcher, #[case] stage: InitStage) {
        let bus = MockBus::new();
        bus.fail_when(step, 1, HalError::Timeout);
        let mut ctl = controller(&bus, PowerConfig::default());

        assert_eq!(ctl.boot(), Err(FatalInitError::new(stage, HalError::Timeout)));

        // Nothing after the failing step ran
        let calls = bus.calls();
        assert!(step(calls.last().unwrap()));
        assert!(calls.len() <= boot_sequence(&PowerConfig::default()).len());
    }

    #[rstest]
    #[case::port_clock(|c: &HalCall| matches!(c, HalCall::GpioClockEnable(_)), InitStage::Quiesce)]
    #[case::analog(|c: &HalCall| matches!(c, HalCall::GpioAnalog { .. }), InitStage::Quiesce)]
    #[case::port_gate(|c: &HalCall| matches!(c, HalCall::GpioClockDisable(_)), InitStage::Quiesce)]
    #[case::disarm(|c: &HalCall| *c == HalCall::WakeupDisarm, InitStage::WakeupDisarm)]
    #[case::arm(|c: &HalCall| matches!(c, HalCall::WakeupArm { .. }), InitStage::WakeupArm)]
    #[case::restore(|c: &HalCall| matches!(c, HalCall::BusClocks { .. }), InitStage::BusClocks)]
    #[case::run_led(|c: &HalCall| *c == HalCall::Led(LedId::Run, LedAction::On), InitStage::Led)]
    fn test_cycle_step_failure_names_stage(#[case] step: Matcher, #[case] stage: InitStage) {
        let bus = MockBus::new();
        let mut ctl = controller(&bus, PowerConfig::default());
        ctl.boot().unwrap();
        bus.fail_when(step, 1, HalError::Rejected);

        let err = FatalInitError::new(stage, HalError::Rejected);
        assert_eq!(ctl.run_cycle(), Err(err));
        assert_eq!(ctl.state(), PowerState::Halted);
        assert_eq!(ctl.cycles(), 0);

        // Halted is terminal: a retry repeats the error and touches nothing
        let logged = bus.calls().len();
        assert_eq!(ctl.run_cycle(), Err(err));
        assert_eq!(bus.calls().len(), logged);
    }

    #[rstest]
    #[case::boot(|c: &HalCall| matches!(c, HalCall::Oscillators { .. }), 1, 0)]
    #[case::first_quiesce(|c: &HalCall| matches!(c, HalCall::GpioAnalog { .. }), 1, 0)]
    #[case::third_arm(|c: &HalCall| matches!(c, HalCall::WakeupArm { .. }), 3, 2)]
    #[case::second_restore(|c: &HalCall| matches!(c, HalCall::BusClocks { .. }), 3, 2)]
    fn test_run_halts_with_fault_sequence(
        #[case] step: Matcher,
        #[case] occurrence: u32,
        #[case] sleeps: usize,
    ) {
        let bus = MockBus::new();
        bus.fail_when(step, occurrence, HalError::Timeout);
        let ctl = controller(&bus, PowerConfig::default());

        let payload = catch_unwind(AssertUnwindSafe(move || ctl.run())).unwrap_err();
        assert_eq!(payload.downcast_ref::<&str>().copied(), Some(HALT_MESSAGE));

        let calls = bus.calls();
        let fault = fault_sequence();
        assert_eq!(&calls[calls.len() - fault.len()..], fault.as_slice());
        assert_eq!(bus.count(|c| *c == HalCall::EnterStop2), sleeps);
    }

    #[test]
    fn test_halt_ignores_failing_fault_led() {
        let bus = MockBus::new();
        bus.fail_when(
            |c| *c == HalCall::Led(LedId::Fault, LedAction::On),
            1,
            HalError::GpioError,
        );
        let mut ctl = controller(&bus, PowerConfig::default());
        ctl.boot().unwrap();

        let err = FatalInitError::new(InitStage::Quiesce, HalError::GpioError);
        let result = catch_unwind(AssertUnwindSafe(|| ctl.error_handler(err)));
        assert!(result.is_err());
        assert_eq!(bus.calls().last(), Some(&HalCall::Halt));
        assert_eq!(ctl.state(), PowerState::Halted);
    }

    #[test]
    fn test_fatal_error_display_names_stage_and_cause() {
        let err = FatalInitError::new(InitStage::Oscillators, HalError::Timeout);
        let text = format!("{}", err);
        assert!(text.contains("Oscillators"));
        assert!(text.starts_with("fatal error during"));
    }
}
