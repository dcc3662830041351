//! Hardware Abstraction Layer for the stop-mode duty cycle

// Re-export time types based on feature
#[cfg(feature = "embassy-time")]
pub use embassy_time::{Duration, Instant};

#[cfg(not(feature = "embassy-time"))]
pub use self::mock_time::{Duration, Instant};

#[cfg(not(feature = "embassy-time"))]
mod mock_time {
    /// Millisecond instant for builds without embassy-time
    #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
    pub struct Instant(u64);

    impl Instant {
        pub const fn from_millis(ms: u64) -> Self {
            Self(ms)
        }

        pub fn duration_since(&self, earlier: Instant) -> Duration {
            Duration::from_millis(self.0.saturating_sub(earlier.0))
        }

        pub const fn as_millis(&self) -> u64 {
            self.0
        }
    }

    /// Microsecond duration for builds without embassy-time
    #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
    pub struct Duration(u64);

    impl Duration {
        pub const fn from_micros(us: u64) -> Self {
            Self(us)
        }

        pub const fn from_millis(ms: u64) -> Self {
            Self(ms * 1_000)
        }

        pub const fn from_secs(s: u64) -> Self {
            Self(s * 1_000_000)
        }

        pub const fn as_micros(&self) -> u64 {
            self.0
        }

        pub const fn as_millis(&self) -> u64 {
            self.0 / 1_000
        }

        pub const fn as_secs(&self) -> u64 {
            self.0 / 1_000_000
        }
    }
}

use embedded_hal::digital::OutputPin;

use crate::clock::{BusClockConfig, FlashLatency, LseDrive, OscillatorConfig, StopWakeupClock, VoltageScale};
use crate::types::{GpioPort, WakeSource};
use crate::uart::{FifoThreshold, UartConfig};
use crate::wakeup::{AlarmConfig, RtcConfig, RtcDate, RtcTime, TamperConfig, WakeupClock};

/// Error types for HAL operations
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HalError {
    /// A ready flag did not come up in time
    Timeout,
    /// Peripheral refused the configuration
    Rejected,
    /// Parameters out of range or mutually incompatible
    InvalidConfig,
    /// Peripheral used before its initialization
    NotInitialized,
    /// Resource already in use
    Busy,
    /// GPIO operation failed
    GpioError,
}

impl core::fmt::Display for HalError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            HalError::Timeout => write!(f, "Hardware ready flag timed out"),
            HalError::Rejected => write!(f, "Configuration rejected by peripheral"),
            HalError::InvalidConfig => write!(f, "Invalid configuration"),
            HalError::NotInitialized => write!(f, "Hardware not initialized"),
            HalError::Busy => write!(f, "Resource busy"),
            HalError::GpioError => write!(f, "GPIO operation failed"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for HalError {}

/// How the core stops executing when entering a low-power mode
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StopEntry {
    /// Wait for interrupt
    Wfi,
    /// Wait for event
    Wfe,
}

/// Oscillators, bus prescalers, regulator range
pub trait ClockControl {
    /// Program the regulator range; waits until the regulator settles
    fn set_voltage_scaling(&mut self, scale: VoltageScale) -> Result<(), HalError>;

    /// Lift write protection on the backup domain (LSE, RTC)
    fn enable_backup_access(&mut self) -> Result<(), HalError>;

    /// LSE oscillator drive strength
    fn set_lse_drive(&mut self, drive: LseDrive) -> Result<(), HalError>;

    /// Start the requested oscillators and wait for them to be ready
    fn configure_oscillators(&mut self, osc: &OscillatorConfig) -> Result<(), HalError>;

    /// Switch SYSCLK, program prescalers and flash wait states.
    /// `sysclk_hz` is the resulting SYSCLK frequency, used for the tick.
    fn configure_bus_clocks(
        &mut self,
        bus: &BusClockConfig,
        latency: FlashLatency,
        sysclk_hz: u32,
    ) -> Result<(), HalError>;

    /// Clock used by the hardware right after leaving stop mode
    fn set_stop_wakeup_clock(&mut self, clock: StopWakeupClock) -> Result<(), HalError>;
}

/// GPIO ports
pub trait GpioControl {
    fn enable_port_clock(&mut self, port: GpioPort) -> Result<(), HalError>;

    /// Put `pins` of `port` in analog mode with pull resistors off
    fn configure_analog(&mut self, port: GpioPort, pins: u16) -> Result<(), HalError>;

    fn disable_port_clock(&mut self, port: GpioPort) -> Result<(), HalError>;
}

/// Real-time clock: calendar, alarm, tamper and wakeup timer
pub trait RtcControl {
    /// Select the RTC clock, program prescalers and output
    fn init(&mut self, config: &RtcConfig) -> Result<(), HalError>;

    fn set_time(&mut self, time: &RtcTime) -> Result<(), HalError>;

    fn set_date(&mut self, date: &RtcDate) -> Result<(), HalError>;

    /// Program an alarm and enable its interrupt
    fn set_alarm_it(&mut self, alarm: &AlarmConfig) -> Result<(), HalError>;

    /// Program a tamper input
    fn set_tamper(&mut self, tamper: &TamperConfig) -> Result<(), HalError>;

    /// Program the periodic wakeup timer and enable its interrupt.
    /// Fails with [`HalError::NotInitialized`] before [`RtcControl::init`].
    fn set_wakeup_timer_it(&mut self, counter: u16, clock: WakeupClock) -> Result<(), HalError>;

    /// Stop the wakeup timer and drop any pending wakeup event
    fn deactivate_wakeup_timer(&mut self) -> Result<(), HalError>;
}

/// Low-power UART
pub trait UartControl {
    fn init(&mut self, config: &UartConfig) -> Result<(), HalError>;

    fn set_tx_fifo_threshold(&mut self, threshold: FifoThreshold) -> Result<(), HalError>;

    fn set_rx_fifo_threshold(&mut self, threshold: FifoThreshold) -> Result<(), HalError>;

    fn enable_fifo_mode(&mut self) -> Result<(), HalError>;

    fn disable_fifo_mode(&mut self) -> Result<(), HalError>;

    /// Port and pin mask carrying TX/RX
    fn pins(&self) -> (GpioPort, u16);
}

/// Power modes and the processor itself
pub trait PowerControl {
    /// Enter Stop 2 and return once an enabled interrupt woke the device
    fn enter_stop2(&mut self, entry: StopEntry) -> WakeSource;

    /// Mask every interrupt
    fn disable_interrupts(&mut self);

    /// Stop forever
    fn halt(&mut self) -> !;
}

/// Status indicator (LED)
pub trait StatusLed {
    /// (Re)configure the pin and switch the LED off
    fn init(&mut self) -> Result<(), HalError>;

    fn set(&mut self, on: bool) -> Result<(), HalError>;

    fn on(&mut self) -> Result<(), HalError> {
        self.set(true)
    }

    fn off(&mut self) -> Result<(), HalError> {
        self.set(false)
    }
}

/// Complete HAL interface for the controller
pub trait PowerHal {
    type Clock: ClockControl;
    type Gpio: GpioControl;
    type Rtc: RtcControl;
    type Uart: UartControl;
    type Power: PowerControl;

    /// Access to clock tree
    fn clock(&mut self) -> &mut Self::Clock;

    /// Access to GPIO ports
    fn gpio(&mut self) -> &mut Self::Gpio;

    /// Access to RTC
    fn rtc(&mut self) -> &mut Self::Rtc;

    /// Access to LPUART1
    fn uart(&mut self) -> &mut Self::Uart;

    /// Access to power modes
    fn power(&mut self) -> &mut Self::Power;
}

/// Status LED on any embedded-hal output pin
pub struct EmbeddedHalLed<P> {
    pin: P,
    active_low: bool,
    lit: bool,
}

impl<P> EmbeddedHalLed<P>
where
    P: OutputPin,
{
    pub fn new(pin: P, active_low: bool) -> Self {
        Self {
            pin,
            active_low,
            lit: false,
        }
    }

    /// Last state written
    pub fn is_lit(&self) -> bool {
        self.lit
    }

    pub fn pin_mut(&mut self) -> &mut P {
        &mut self.pin
    }

    /// Give the pin back
    pub fn release(self) -> P {
        self.pin
    }
}

impl<P> StatusLed for EmbeddedHalLed<P>
where
    P: OutputPin,
{
    fn init(&mut self) -> Result<(), HalError> {
        self.set(false)
    }

    fn set(&mut self, on: bool) -> Result<(), HalError> {
        let level = if self.active_low { !on } else { on };
        if level {
            self.pin.set_high().map_err(|_| HalError::GpioError)?;
        } else {
            self.pin.set_low().map_err(|_| HalError::GpioError)?;
        }
        self.lit = on;
        Ok(())
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    //! Call-recording mock implementations for testing

    use super::*;
    use crate::clock::{HseMode, SysClkSource};
    use crate::wakeup::{Alarm, Tamper};
    use core::cell::{Cell, RefCell};
    use heapless::Vec;

    /// Calls kept by a [`MockBus`]
    pub const LOG_CAPACITY: usize = 1024;

    /// Panic payload of [`MockPower::halt`]
    pub const HALT_MESSAGE: &str = "mock HAL halted";

    #[derive(Copy, Clone, PartialEq, Eq, Debug)]
    pub enum LedId {
        /// LED1, run mode
        Run,
        /// LED2, fatal error
        Fault,
    }

    #[derive(Copy, Clone, PartialEq, Eq, Debug)]
    pub enum LedAction {
        Init,
        On,
        Off,
    }

    /// One observed HAL call
    #[derive(Copy, Clone, PartialEq, Eq, Debug)]
    pub enum HalCall {
        VoltageScaling(VoltageScale),
        BackupAccess,
        LseDrive(LseDrive),
        Oscillators { hse: HseMode, lse: bool },
        BusClocks { sysclk: SysClkSource, latency: FlashLatency },
        StopWakeupClock(StopWakeupClock),
        GpioClockEnable(GpioPort),
        GpioAnalog { port: GpioPort, pins: u16 },
        GpioClockDisable(GpioPort),
        UartInit { baud_rate: u32 },
        UartTxThreshold(FifoThreshold),
        UartRxThreshold(FifoThreshold),
        UartFifoMode(bool),
        RtcInit,
        RtcSetTime,
        RtcSetDate,
        RtcSetAlarm(Alarm),
        RtcSetTamper(Tamper),
        WakeupArm { counter: u16, clock: WakeupClock },
        WakeupDisarm,
        EnterStop2,
        Woke(WakeSource),
        DisableInterrupts,
        Halt,
        Led(LedId, LedAction),
    }

    #[derive(Copy, Clone)]
    struct Failure {
        matches: fn(&HalCall) -> bool,
        remaining: u32,
        error: HalError,
    }

    /// Shared state behind every mock peripheral: the call log, an optional
    /// injected failure and the simulated wake source.
    pub struct MockBus {
        log: RefCell<Vec<HalCall, LOG_CAPACITY>>,
        failure: Cell<Option<Failure>>,
        wake: Cell<WakeSource>,
        rtc_ready: Cell<bool>,
        wakeup_armed: Cell<bool>,
    }

    impl Default for MockBus {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MockBus {
        pub fn new() -> Self {
            Self {
                log: RefCell::new(Vec::new()),
                failure: Cell::new(None),
                wake: Cell::new(WakeSource::WakeupTimer),
                rtc_ready: Cell::new(false),
                wakeup_armed: Cell::new(false),
            }
        }

        /// Fail the `occurrence`-th (1-based) call matching `matches`
        pub fn fail_when(&self, matches: fn(&HalCall) -> bool, occurrence: u32, error: HalError) {
            self.failure.set(Some(Failure {
                matches,
                remaining: occurrence.max(1),
                error,
            }));
        }

        /// Interrupt that ends every subsequent Stop 2
        pub fn wake_with(&self, source: WakeSource) {
            self.wake.set(source);
        }

        /// Snapshot of the call log
        pub fn calls(&self) -> Vec<HalCall, LOG_CAPACITY> {
            self.log.borrow().clone()
        }

        /// Number of logged calls matching `matches`
        pub fn count(&self, matches: fn(&HalCall) -> bool) -> usize {
            self.log.borrow().iter().filter(|call| matches(call)).count()
        }

        pub fn clear(&self) {
            self.log.borrow_mut().clear();
        }

        pub fn wakeup_armed(&self) -> bool {
            self.wakeup_armed.get()
        }

        /// Log `call` and apply the injected failure, if it matches
        pub fn record(&self, call: HalCall) -> Result<(), HalError> {
            assert!(self.log.borrow_mut().push(call).is_ok(), "mock call log full");

            if let Some(mut failure) = self.failure.get() {
                if (failure.matches)(&call) {
                    failure.remaining -= 1;
                    if failure.remaining == 0 {
                        self.failure.set(None);
                        return Err(failure.error);
                    }
                    self.failure.set(Some(failure));
                }
            }
            Ok(())
        }
    }

    pub struct MockClock<'a> {
        bus: &'a MockBus,
    }

    impl ClockControl for MockClock<'_> {
        fn set_voltage_scaling(&mut self, scale: VoltageScale) -> Result<(), HalError> {
            self.bus.record(HalCall::VoltageScaling(scale))
        }

        fn enable_backup_access(&mut self) -> Result<(), HalError> {
            self.bus.record(HalCall::BackupAccess)
        }

        fn set_lse_drive(&mut self, drive: LseDrive) -> Result<(), HalError> {
            self.bus.record(HalCall::LseDrive(drive))
        }

        fn configure_oscillators(&mut self, osc: &OscillatorConfig) -> Result<(), HalError> {
            self.bus.record(HalCall::Oscillators {
                hse: osc.hse,
                lse: osc.lse,
            })
        }

        fn configure_bus_clocks(
            &mut self,
            bus: &BusClockConfig,
            latency: FlashLatency,
            _sysclk_hz: u32,
        ) -> Result<(), HalError> {
            self.bus.record(HalCall::BusClocks {
                sysclk: bus.sysclk,
                latency,
            })
        }

        fn set_stop_wakeup_clock(&mut self, clock: StopWakeupClock) -> Result<(), HalError> {
            self.bus.record(HalCall::StopWakeupClock(clock))
        }
    }

    pub struct MockGpio<'a> {
        bus: &'a MockBus,
    }

    impl GpioControl for MockGpio<'_> {
        fn enable_port_clock(&mut self, port: GpioPort) -> Result<(), HalError> {
            self.bus.record(HalCall::GpioClockEnable(port))
        }

        fn configure_analog(&mut self, port: GpioPort, pins: u16) -> Result<(), HalError> {
            self.bus.record(HalCall::GpioAnalog { port, pins })
        }

        fn disable_port_clock(&mut self, port: GpioPort) -> Result<(), HalError> {
            self.bus.record(HalCall::GpioClockDisable(port))
        }
    }

    pub struct MockRtc<'a> {
        bus: &'a MockBus,
    }

    impl<'a> MockRtc<'a> {
        pub fn new(bus: &'a MockBus) -> Self {
            Self { bus }
        }
    }

    impl RtcControl for MockRtc<'_> {
        fn init(&mut self, _config: &RtcConfig) -> Result<(), HalError> {
            self.bus.record(HalCall::RtcInit)?;
            self.bus.rtc_ready.set(true);
            Ok(())
        }

        fn set_time(&mut self, _time: &RtcTime) -> Result<(), HalError> {
            self.bus.record(HalCall::RtcSetTime)
        }

        fn set_date(&mut self, _date: &RtcDate) -> Result<(), HalError> {
            self.bus.record(HalCall::RtcSetDate)
        }

        fn set_alarm_it(&mut self, alarm: &AlarmConfig) -> Result<(), HalError> {
            self.bus.record(HalCall::RtcSetAlarm(alarm.alarm))
        }

        fn set_tamper(&mut self, tamper: &TamperConfig) -> Result<(), HalError> {
            self.bus.record(HalCall::RtcSetTamper(tamper.tamper))
        }

        fn set_wakeup_timer_it(&mut self, counter: u16, clock: WakeupClock) -> Result<(), HalError> {
            self.bus.record(HalCall::WakeupArm { counter, clock })?;
            if !self.bus.rtc_ready.get() {
                return Err(HalError::NotInitialized);
            }
            self.bus.wakeup_armed.set(true);
            Ok(())
        }

        fn deactivate_wakeup_timer(&mut self) -> Result<(), HalError> {
            self.bus.record(HalCall::WakeupDisarm)?;
            self.bus.wakeup_armed.set(false);
            Ok(())
        }
    }

    pub struct MockUart<'a> {
        bus: &'a MockBus,
    }

    impl UartControl for MockUart<'_> {
        fn init(&mut self, config: &UartConfig) -> Result<(), HalError> {
            self.bus.record(HalCall::UartInit {
                baud_rate: config.baud_rate,
            })
        }

        fn set_tx_fifo_threshold(&mut self, threshold: FifoThreshold) -> Result<(), HalError> {
            self.bus.record(HalCall::UartTxThreshold(threshold))
        }

        fn set_rx_fifo_threshold(&mut self, threshold: FifoThreshold) -> Result<(), HalError> {
            self.bus.record(HalCall::UartRxThreshold(threshold))
        }

        fn enable_fifo_mode(&mut self) -> Result<(), HalError> {
            self.bus.record(HalCall::UartFifoMode(true))
        }

        fn disable_fifo_mode(&mut self) -> Result<(), HalError> {
            self.bus.record(HalCall::UartFifoMode(false))
        }

        fn pins(&self) -> (GpioPort, u16) {
            // PG7 TX, PG8 RX
            (GpioPort::G, (1 << 7) | (1 << 8))
        }
    }

    pub struct MockPower<'a> {
        bus: &'a MockBus,
    }

    impl PowerControl for MockPower<'_> {
        fn enter_stop2(&mut self, _entry: StopEntry) -> WakeSource {
            let source = self.bus.wake.get();
            self.bus.record(HalCall::EnterStop2).ok();
            self.bus.record(HalCall::Woke(source)).ok();
            source
        }

        fn disable_interrupts(&mut self) {
            self.bus.record(HalCall::DisableInterrupts).ok();
        }

        fn halt(&mut self) -> ! {
            self.bus.record(HalCall::Halt).ok();
            std::panic::panic_any(HALT_MESSAGE)
        }
    }

    /// Mock hardware collection
    pub struct MockHal<'a> {
        pub clock: MockClock<'a>,
        pub gpio: MockGpio<'a>,
        pub rtc: MockRtc<'a>,
        pub uart: MockUart<'a>,
        pub power: MockPower<'a>,
    }

    impl<'a> MockHal<'a> {
        pub fn new(bus: &'a MockBus) -> Self {
            Self {
                clock: MockClock { bus },
                gpio: MockGpio { bus },
                rtc: MockRtc { bus },
                uart: MockUart { bus },
                power: MockPower { bus },
            }
        }
    }

    impl<'a> PowerHal for MockHal<'a> {
        type Clock = MockClock<'a>;
        type Gpio = MockGpio<'a>;
        type Rtc = MockRtc<'a>;
        type Uart = MockUart<'a>;
        type Power = MockPower<'a>;

        fn clock(&mut self) -> &mut Self::Clock {
            &mut self.clock
        }

        fn gpio(&mut self) -> &mut Self::Gpio {
            &mut self.gpio
        }

        fn rtc(&mut self) -> &mut Self::Rtc {
            &mut self.rtc
        }

        fn uart(&mut self) -> &mut Self::Uart {
            &mut self.uart
        }

        fn power(&mut self) -> &mut Self::Power {
            &mut self.power
        }
    }

    pub struct MockLed<'a> {
        bus: &'a MockBus,
        id: LedId,
        lit: bool,
    }

    impl<'a> MockLed<'a> {
        pub fn new(bus: &'a MockBus, id: LedId) -> Self {
            Self { bus, id, lit: false }
        }

        pub fn is_lit(&self) -> bool {
            self.lit
        }
    }

    impl StatusLed for MockLed<'_> {
        fn init(&mut self) -> Result<(), HalError> {
            self.bus.record(HalCall::Led(self.id, LedAction::Init))?;
            self.lit = false;
            Ok(())
        }

        fn set(&mut self, on: bool) -> Result<(), HalError> {
            let action = if on { LedAction::On } else { LedAction::Off };
            self.bus.record(HalCall::Led(self.id, action))?;
            self.lit = on;
            Ok(())
        }
    }
}
