//! Controller tests against the mock HAL

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::controller::PowerController;
use crate::error::{FatalInitError, InitStage};
use crate::hal::mock::*;
use crate::hal::HalError;
use crate::test_utils::*;
use crate::types::*;
use crate::wakeup::{arm_wakeup, WakeupClock};

type MockController<'a> = PowerController<MockHal<'a>, MockLed<'a>, MockLed<'a>>;

fn controller(bus: &MockBus, config: PowerConfig) -> MockController<'_> {
    PowerController::new(
        MockHal::new(bus),
        MockLed::new(bus, LedId::Run),
        MockLed::new(bus, LedId::Fault),
        config,
    )
}

fn position(calls: &[HalCall], from: usize, matches: fn(&HalCall) -> bool) -> Option<usize> {
    calls[from..].iter().position(matches).map(|i| i + from)
}

#[test]
fn test_boot_then_two_cycles_matches_expected_trace() {
    let bus = MockBus::new();
    let config = PowerConfig::default();
    let mut ctl = controller(&bus, config);

    ctl.boot().unwrap();
    ctl.run_cycle().unwrap();
    ctl.run_cycle().unwrap();

    let mut expected: std::vec::Vec<HalCall> = std::vec::Vec::new();
    expected.extend(boot_sequence(&config));
    expected.extend(cycle_sequence(&config, WakeSource::WakeupTimer));
    expected.extend(cycle_sequence(&config, WakeSource::WakeupTimer));

    assert_eq!(bus.calls().as_slice(), expected.as_slice());
    assert_eq!(ctl.cycles(), 2);
}

#[test]
fn test_wakeup_armed_with_full_counter_and_div16() {
    let bus = MockBus::new();
    let mut ctl = controller(&bus, PowerConfig::default());
    ctl.boot().unwrap();
    ctl.run_cycle().unwrap();

    let arm = bus
        .calls()
        .iter()
        .copied()
        .find(|c| matches!(c, HalCall::WakeupArm { .. }));
    assert_eq!(
        arm,
        Some(HalCall::WakeupArm {
            counter: 0xFFFF,
            clock: WakeupClock::RtcDiv16,
        })
    );
    assert_eq!(ctl.config().wakeup.interval().as_millis(), 32_767);
}

#[test]
fn test_all_ports_quiesced_before_arm() {
    let bus = MockBus::new();
    let mut ctl = controller(&bus, PowerConfig::default());
    ctl.boot().unwrap();
    bus.clear();

    for _ in 0..3 {
        ctl.run_cycle().unwrap();
    }

    let calls = bus.calls();
    let mut from = 0;
    for _ in 0..3 {
        let arm = position(&calls, from, |c| matches!(c, HalCall::WakeupArm { .. })).unwrap();
        let analog: std::vec::Vec<GpioPort> = calls[from..arm]
            .iter()
            .filter_map(|c| match c {
                HalCall::GpioAnalog { port, pins: ALL_PINS } => Some(*port),
                _ => None,
            })
            .collect();
        assert_eq!(analog, GpioPort::ALL);
        from = arm + 1;
    }
}

#[test]
fn test_disarm_precedes_every_arm() {
    let bus = MockBus::new();
    let mut ctl = controller(&bus, PowerConfig::default());
    ctl.boot().unwrap();
    for _ in 0..4 {
        ctl.run_cycle().unwrap();
    }

    let mut armed = false;
    for call in bus.calls().iter() {
        match call {
            HalCall::WakeupArm { .. } => {
                assert!(!armed, "wakeup armed twice without a disarm");
                armed = true;
            }
            HalCall::WakeupDisarm => armed = false,
            _ => {}
        }
    }
    assert!(armed);
    assert!(bus.wakeup_armed());
}

#[test]
fn test_run_clock_restored_once_per_sleep() {
    let bus = MockBus::new();
    let mut ctl = controller(&bus, PowerConfig::default());
    ctl.boot().unwrap();
    bus.clear();
    ctl.run_cycle().unwrap();
    ctl.run_cycle().unwrap();

    let calls = bus.calls();
    let stops: std::vec::Vec<usize> = calls
        .iter()
        .enumerate()
        .filter(|(_, c)| **c == HalCall::EnterStop2)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(stops.len(), 2);

    // No clock programming between quiesce start and sleep
    assert_eq!(
        calls[..stops[0]]
            .iter()
            .filter(|c| matches!(c, HalCall::BusClocks { .. }))
            .count(),
        0
    );
    for window in [(stops[0], stops[1]), (stops[1], calls.len())] {
        let switches = calls[window.0..window.1]
            .iter()
            .filter(|c| matches!(c, HalCall::BusClocks { .. }))
            .count();
        assert_eq!(switches, 1);
    }
}

#[test]
fn test_led1_on_after_each_wake() {
    let bus = MockBus::new();
    let mut ctl = controller(&bus, PowerConfig::default());
    ctl.boot().unwrap();
    ctl.run_cycle().unwrap();

    let calls = bus.calls();
    let woke = position(&calls, 0, |c| matches!(c, HalCall::Woke(_))).unwrap();
    let clock = position(&calls, woke, |c| matches!(c, HalCall::BusClocks { .. })).unwrap();
    let led = position(&calls, woke, |c| *c == HalCall::Led(LedId::Run, LedAction::On)).unwrap();
    assert!(clock < led);
    assert_eq!(bus.count(|c| matches!(c, HalCall::Led(LedId::Fault, LedAction::On))), 0);
}

#[test]
fn test_oscillator_timeout_at_boot_halts() {
    let bus = MockBus::new();
    bus.fail_when(|c| matches!(c, HalCall::Oscillators { .. }), 1, HalError::Timeout);
    let ctl = controller(&bus, PowerConfig::default());

    let result = catch_unwind(AssertUnwindSafe(move || ctl.run()));
    let payload = result.unwrap_err();
    assert_eq!(payload.downcast_ref::<&str>().copied(), Some(HALT_MESSAGE));

    let calls = bus.calls();
    assert!(contains_sequence(&calls, &fault_sequence()));
    assert_eq!(calls.last(), Some(&HalCall::Halt));
    assert_eq!(bus.count(|c| *c == HalCall::UartInit { baud_rate: 209_700 }), 0);
    assert_eq!(bus.count(|c| *c == HalCall::EnterStop2), 0);
}

#[test]
fn test_boot_error_names_failing_stage() {
    let bus = MockBus::new();
    bus.fail_when(|c| *c == HalCall::RtcSetDate, 1, HalError::Rejected);
    let mut ctl = controller(&bus, PowerConfig::default());

    assert_eq!(
        ctl.boot(),
        Err(FatalInitError::new(InitStage::Calendar, HalError::Rejected))
    );
    assert_eq!(bus.count(|c| matches!(c, HalCall::RtcSetAlarm(_))), 0);
}

#[test]
fn test_failure_in_second_cycle_halts_with_fault_led() {
    let bus = MockBus::new();
    bus.fail_when(|c| matches!(c, HalCall::WakeupArm { .. }), 2, HalError::Rejected);
    let ctl = controller(&bus, PowerConfig::default());

    let result = catch_unwind(AssertUnwindSafe(move || ctl.run()));
    assert!(result.is_err());
    assert_eq!(bus.count(|c| *c == HalCall::EnterStop2), 1);

    let calls = bus.calls();
    let tail = &calls[calls.len() - 4..];
    assert_eq!(tail, fault_sequence().as_slice());
}

#[test]
fn test_error_handler_enters_halted() {
    let bus = MockBus::new();
    let mut ctl = controller(&bus, PowerConfig::default());
    ctl.boot().unwrap();

    let err = FatalInitError::new(InitStage::Quiesce, HalError::GpioError);
    let result = catch_unwind(AssertUnwindSafe(|| ctl.error_handler(err)));
    assert!(result.is_err());
    assert_eq!(ctl.state(), PowerState::Halted);
    assert_eq!(ctl.state().next(), None);
}

#[test]
fn test_arm_before_rtc_init_fails() {
    let bus = MockBus::new();
    let mut hal = MockHal::new(&bus);

    let result = arm_wakeup(&mut hal.rtc, &crate::wakeup::WakeupTimerConfig::default());
    assert_eq!(
        result,
        Err(FatalInitError::new(InitStage::WakeupArm, HalError::NotInitialized))
    );
    assert!(!bus.wakeup_armed());
}

#[test]
fn test_kept_uart_pins_skip_port_g_bits() {
    let bus = MockBus::new();
    let uart_pins = (1 << 7) | (1 << 8);
    let config = PowerConfig {
        quiesce: crate::quiesce::QuiesceConfig::default().keep(GpioPort::G, uart_pins),
        ..PowerConfig::default()
    };
    let mut ctl = controller(&bus, config);
    ctl.boot().unwrap();
    ctl.run_cycle().unwrap();

    assert_eq!(
        bus.count(|c| matches!(c, HalCall::GpioAnalog { port: GpioPort::G, pins } if *pins == !((1 << 7) | (1 << 8)))),
        1
    );
    assert_eq!(bus.count(|c| matches!(c, HalCall::GpioAnalog { .. })), 9);
}

#[test]
fn test_wake_source_reported_per_cycle() {
    let bus = MockBus::new();
    let mut ctl = controller(&bus, PowerConfig::default());
    ctl.boot().unwrap();

    bus.wake_with(WakeSource::Tamper);
    assert_eq!(ctl.run_cycle(), Ok(WakeSource::Tamper));
    bus.wake_with(WakeSource::Other);
    assert_eq!(ctl.run_cycle(), Ok(WakeSource::Other));
    assert_eq!(ctl.state(), PowerState::Run);
}
