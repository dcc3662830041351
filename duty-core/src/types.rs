//! Core data types for the stop-mode duty cycle

use crate::clock::{RunClockProfile, StopWakeupClock};
use crate::hal::HalError;
use crate::quiesce::QuiesceConfig;
use crate::uart::UartConfig;
use crate::wakeup::{AlarmConfig, RtcCalendar, RtcConfig, TamperConfig, WakeupTimerConfig};

/// Every pin of a GPIO port
pub const ALL_PINS: u16 = 0xFFFF;

/// GPIO ports of the device
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GpioPort {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
    I,
}

impl GpioPort {
    /// Number of ports
    pub const COUNT: usize = 9;

    /// All ports in register order
    pub const ALL: [GpioPort; GpioPort::COUNT] = [
        GpioPort::A,
        GpioPort::B,
        GpioPort::C,
        GpioPort::D,
        GpioPort::E,
        GpioPort::F,
        GpioPort::G,
        GpioPort::H,
        GpioPort::I,
    ];

    /// Position of the port in the register map (A = 0)
    pub const fn index(&self) -> usize {
        *self as usize
    }

    /// Port letter, for log output
    pub const fn letter(&self) -> char {
        match self {
            GpioPort::A => 'A',
            GpioPort::B => 'B',
            GpioPort::C => 'C',
            GpioPort::D => 'D',
            GpioPort::E => 'E',
            GpioPort::F => 'F',
            GpioPort::G => 'G',
            GpioPort::H => 'H',
            GpioPort::I => 'I',
        }
    }
}

/// What brought the device out of Stop 2
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WakeSource {
    /// RTC periodic wakeup timer
    WakeupTimer,
    /// RTC calendar alarm
    Alarm,
    /// RTC tamper input
    Tamper,
    /// Any other enabled interrupt
    Other,
}

/// Power-mode controller states
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerState {
    /// Run clock profile active
    Run,
    /// GPIOs being moved to analog mode
    Quiescing,
    /// Wakeup timer programmed, about to sleep
    Armed,
    /// Stop 2, no instruction execution
    Sleeping,
    /// Back from Stop 2, run clock not yet restored
    Waking,
    /// Error handler entered; only a reset leaves this state
    Halted,
}

impl PowerState {
    /// Successor in the duty cycle. `Halted` has none.
    pub const fn next(&self) -> Option<PowerState> {
        match self {
            PowerState::Run => Some(PowerState::Quiescing),
            PowerState::Quiescing => Some(PowerState::Armed),
            PowerState::Armed => Some(PowerState::Sleeping),
            PowerState::Sleeping => Some(PowerState::Waking),
            PowerState::Waking => Some(PowerState::Run),
            PowerState::Halted => None,
        }
    }

    /// Returns true if the run clock profile is guaranteed in this state
    pub const fn on_run_clock(&self) -> bool {
        match self {
            PowerState::Run | PowerState::Quiescing | PowerState::Armed => true,
            PowerState::Sleeping | PowerState::Waking | PowerState::Halted => false,
        }
    }

    /// Returns true if this is the terminal error state
    pub const fn is_terminal(&self) -> bool {
        matches!(self, PowerState::Halted)
    }
}

/// Everything the controller needs to boot and cycle
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PowerConfig {
    /// Clock tree for run mode (boot and every wake)
    pub run_clock: RunClockProfile,
    /// Clock the hardware selects when leaving stop mode
    pub stop_wakeup_clock: StopWakeupClock,
    /// LPUART1 settings
    pub uart: UartConfig,
    /// RTC prescalers and output
    pub rtc: RtcConfig,
    /// Time and date written once at boot
    pub calendar: RtcCalendar,
    /// Calendar alarm armed once at boot
    pub alarm: AlarmConfig,
    /// Tamper input armed once at boot
    pub tamper: TamperConfig,
    /// Periodic wakeup used by every cycle
    pub wakeup: WakeupTimerConfig,
    /// Pins excluded from quiescing
    pub quiesce: QuiesceConfig,
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            run_clock: RunClockProfile::default(),
            stop_wakeup_clock: StopWakeupClock::Msi,
            uart: UartConfig::default(),
            rtc: RtcConfig::default(),
            calendar: RtcCalendar::default(),
            alarm: AlarmConfig::default(),
            tamper: TamperConfig::default(),
            wakeup: WakeupTimerConfig::default(),
            quiesce: QuiesceConfig::default(),
        }
    }
}

impl PowerConfig {
    /// Check every record before anything touches the hardware
    pub fn validate(&self) -> Result<(), HalError> {
        let sysclk_hz = self.run_clock.validate()?;
        self.uart.brr(self.run_clock.pclk1_hz(sysclk_hz))?;
        self.rtc.validate()?;
        self.calendar.validate()?;
        self.alarm.validate()?;
        self.tamper.validate()?;
        self.wakeup.validate()?;
        Ok(())
    }

    /// Same configuration with a different wakeup interval
    pub fn with_wake_interval(mut self, interval: crate::hal::Duration) -> Result<Self, HalError> {
        self.wakeup =
            WakeupTimerConfig::for_interval(interval, self.wakeup.clock, self.wakeup.source_hz)?;
        Ok(self)
    }

    /// Same counter and divider, timed against the RTC clock actually fitted
    pub fn with_wakeup_source_hz(mut self, source_hz: u32) -> Self {
        self.wakeup.source_hz = source_hz;
        self
    }
}
