//! Embassy time driver backed by the SysTick tick counter

use embassy_time_driver::{AlarmHandle, Driver};

use crate::vectors::TICKS;

/// Millisecond time base; `embassy-time` runs at `tick-hz-1_000`
pub struct SysTickDriver;

impl Driver for SysTickDriver {
    fn now(&self) -> u64 {
        TICKS.now_ms() as u64
    }

    unsafe fn allocate_alarm(&self) -> Option<AlarmHandle> {
        // Nothing awaits timers; only busy-wait deadlines use `now`
        None
    }

    fn set_alarm_callback(&self, _alarm: AlarmHandle, _callback: fn(*mut ()), _ctx: *mut ()) {}

    fn set_alarm(&self, _alarm: AlarmHandle, _timestamp: u64) -> bool {
        false
    }
}

embassy_time_driver::time_driver_impl!(static DRIVER: SysTickDriver = SysTickDriver);
