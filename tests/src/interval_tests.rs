//! Wakeup interval arithmetic and the counter programmed into the RTC

use duty_core::hal::mock::{HalCall, MockBus};
use duty_core::{
    Duration, HalError, PowerConfig, WakeupClock, WakeupTimerConfig, LSE_HZ, LSI_NOMINAL_HZ,
};
use proptest::prelude::*;

use crate::trace::controller;

fn divided_clock() -> impl Strategy<Value = WakeupClock> {
    prop_oneof![
        Just(WakeupClock::RtcDiv16),
        Just(WakeupClock::RtcDiv8),
        Just(WakeupClock::RtcDiv4),
        Just(WakeupClock::RtcDiv2),
    ]
}

fn source_hz() -> impl Strategy<Value = u32> {
    prop_oneof![Just(LSI_NOMINAL_HZ), Just(LSE_HZ), 16_000u32..=48_000]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_interval() {
        let config = WakeupTimerConfig::default();
        assert_eq!(config.interval_micros(), 32_767_500);
        assert_eq!(
            WakeupTimerConfig::max_interval(WakeupClock::RtcDiv16, LSI_NOMINAL_HZ),
            config.interval()
        );
    }

    #[test]
    fn test_calendar_clock_counts_seconds() {
        let config = WakeupTimerConfig::for_interval(
            Duration::from_secs(90),
            WakeupClock::CkSpre,
            LSE_HZ,
        )
        .unwrap();
        assert_eq!(config.counter, 90);
        assert_eq!(config.interval(), Duration::from_secs(90));
    }

    #[test]
    fn test_interval_shorter_than_one_tick_rejected() {
        assert_eq!(
            WakeupTimerConfig::for_interval(
                Duration::from_micros(100),
                WakeupClock::RtcDiv16,
                LSI_NOMINAL_HZ
            ),
            Err(HalError::InvalidConfig)
        );
    }

    proptest! {
        #[test]
        fn prop_for_interval_picks_longest_fitting_counter(
            micros in 1_000u64..=120_000_000,
            clock in divided_clock(),
            hz in source_hz(),
        ) {
            let divider = clock.rtc_divider().unwrap() as u128;
            match WakeupTimerConfig::for_interval(Duration::from_micros(micros), clock, hz) {
                Ok(config) => {
                    prop_assert!(config.interval_micros() <= micros);
                    // One more tick would overshoot
                    let next = (config.counter as u128 + 1) * divider * 1_000_000;
                    prop_assert!(next > micros as u128 * hz as u128);
                }
                Err(err) => {
                    prop_assert_eq!(err, HalError::InvalidConfig);
                    let max = WakeupTimerConfig::max_interval(clock, hz).as_micros();
                    let tick = (divider * 1_000_000 / hz as u128) as u64;
                    prop_assert!(micros > max || micros < tick + 1);
                }
            }
        }

        #[test]
        fn prop_beyond_max_interval_rejected(
            extra in 0u64..10_000_000,
            clock in divided_clock(),
            hz in source_hz(),
        ) {
            // First duration whose tick count no longer fits in 16 bits
            let divider = clock.rtc_divider().unwrap() as u64;
            let overflow = (0x1_0000 * divider * 1_000_000).div_ceil(hz as u64);
            let result = WakeupTimerConfig::for_interval(
                Duration::from_micros(overflow + extra),
                clock,
                hz,
            );
            prop_assert_eq!(result, Err(HalError::InvalidConfig));
        }

        #[test]
        fn prop_programmed_counter_matches_config(
            counter in 1u16..=u16::MAX,
            clock in divided_clock(),
        ) {
            let bus = MockBus::new();
            let mut config = PowerConfig::default();
            config.wakeup.counter = counter;
            config.wakeup.clock = clock;
            let mut ctl = controller(&bus, config);
            ctl.boot().unwrap();
            ctl.run_cycle().unwrap();

            prop_assert_eq!(
                bus.count(|c| matches!(c, HalCall::WakeupArm { .. })),
                1
            );
            let arm = bus
                .calls()
                .iter()
                .copied()
                .find(|c| matches!(c, HalCall::WakeupArm { .. }));
            prop_assert_eq!(arm, Some(HalCall::WakeupArm { counter, clock }));
        }
    }
}
