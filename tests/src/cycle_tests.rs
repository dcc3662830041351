//! Sleep-cycle behaviour seen through the mock HAL call log

use duty_core::hal::mock::{HalCall, LedAction, LedId, MockBus};
use duty_core::test_utils::{boot_sequence, contains_sequence, cycle_sequence};
use duty_core::{GpioPort, PowerConfig, PowerState, QuiesceConfig, WakeSource, WakeupClock};
use rstest::rstest;

use crate::trace::{controller, trace};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boot_trace_is_exact() {
        let config = PowerConfig::default();
        let calls = trace(config, 0).unwrap();
        assert_eq!(calls.as_slice(), boot_sequence(&config).as_slice());
    }

    #[rstest]
    #[case(1)]
    #[case(3)]
    #[case(10)]
    fn test_every_cycle_repeats_the_same_calls(#[case] cycles: usize) {
        let config = PowerConfig::default();
        let calls = trace(config, cycles).unwrap();

        let boot = boot_sequence(&config);
        let cycle = cycle_sequence(&config, WakeSource::WakeupTimer);
        assert_eq!(calls.len(), boot.len() + cycles * cycle.len());
        for chunk in calls[boot.len()..].chunks(cycle.len()) {
            assert_eq!(chunk, cycle.as_slice());
        }
    }

    #[rstest]
    #[case(WakeSource::WakeupTimer)]
    #[case(WakeSource::Alarm)]
    #[case(WakeSource::Tamper)]
    #[case(WakeSource::Other)]
    fn test_any_wake_source_restores_run(#[case] source: WakeSource) {
        let bus = MockBus::new();
        let config = PowerConfig::default();
        let mut ctl = controller(&bus, config);
        ctl.boot().unwrap();
        bus.clear();
        bus.wake_with(source);

        assert_eq!(ctl.run_cycle(), Ok(source));
        assert_eq!(ctl.state(), PowerState::Run);
        assert_eq!(bus.calls().as_slice(), cycle_sequence(&config, source).as_slice());
    }

    #[test]
    fn test_cycle_counter_advances() {
        let bus = MockBus::new();
        let mut ctl = controller(&bus, PowerConfig::default());
        ctl.boot().unwrap();
        for expected in 1..=5 {
            ctl.run_cycle().unwrap();
            assert_eq!(ctl.cycles(), expected);
        }
    }

    #[test]
    fn test_uart_configured_only_at_boot() {
        let calls = trace(PowerConfig::default(), 4).unwrap();
        let inits = calls
            .iter()
            .filter(|c| matches!(c, HalCall::UartInit { .. }))
            .count();
        assert_eq!(inits, 1);
    }

    #[test]
    fn test_rtc_records_written_only_at_boot() {
        let calls = trace(PowerConfig::default(), 4).unwrap();
        for once in [HalCall::RtcInit, HalCall::RtcSetTime, HalCall::RtcSetDate] {
            assert_eq!(calls.iter().filter(|c| **c == once).count(), 1);
        }
        let alarms = calls
            .iter()
            .filter(|c| matches!(c, HalCall::RtcSetAlarm(_)))
            .count();
        assert_eq!(alarms, 1);
    }

    #[test]
    fn test_run_clock_follows_wake_and_led_ends_cycle() {
        let calls = trace(PowerConfig::default(), 1).unwrap();
        let expected = [
            HalCall::Woke(WakeSource::WakeupTimer),
            HalCall::VoltageScaling(PowerConfig::default().run_clock.voltage_scale),
        ];
        assert!(contains_sequence(&calls, &expected));
        assert_eq!(
            calls.last(),
            Some(&HalCall::Led(LedId::Run, LedAction::On))
        );
    }

    #[test]
    fn test_custom_interval_reaches_the_rtc() {
        let mut config = PowerConfig::default();
        config.wakeup.counter = 2_000;
        config.wakeup.clock = WakeupClock::RtcDiv2;
        let calls = trace(config, 2).unwrap();

        let arms: std::vec::Vec<HalCall> = calls
            .iter()
            .copied()
            .filter(|c| matches!(c, HalCall::WakeupArm { .. }))
            .collect();
        assert_eq!(
            arms,
            vec![
                HalCall::WakeupArm {
                    counter: 2_000,
                    clock: WakeupClock::RtcDiv2
                };
                2
            ]
        );
    }

    #[rstest]
    #[case(GpioPort::A, 1 << 13 | 1 << 14)]
    #[case(GpioPort::G, 1 << 7 | 1 << 8)]
    #[case(GpioPort::I, 0xFFFF)]
    fn test_kept_pins_stay_out_of_analog(#[case] port: GpioPort, #[case] keep: u16) {
        let config = PowerConfig {
            quiesce: QuiesceConfig::default().keep(port, keep),
            ..PowerConfig::default()
        };
        let calls = trace(config, 1).unwrap();

        let analog: std::vec::Vec<(GpioPort, u16)> = calls
            .iter()
            .filter_map(|c| match c {
                HalCall::GpioAnalog { port, pins } => Some((*port, *pins)),
                _ => None,
            })
            .collect();
        for (p, pins) in &analog {
            if *p == port {
                assert_eq!(pins & keep, 0);
                assert_eq!(*pins, !keep);
            } else {
                assert_eq!(*pins, 0xFFFF);
            }
        }
        // A fully kept port is skipped, its clock is still cycled
        let expected_ports = if keep == 0xFFFF { 8 } else { 9 };
        assert_eq!(analog.len(), expected_ports);
        assert_eq!(
            calls
                .iter()
                .filter(|c| matches!(c, HalCall::GpioClockDisable(_)))
                .count(),
            9
        );
    }
}
