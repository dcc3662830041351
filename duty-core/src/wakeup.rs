//! Wakeup Timer and the other RTC-driven events
//!
//! The periodic wakeup timer ends every Stop 2 period. Calendar, alarm and
//! tamper are written once at boot.

use crate::error::{FatalInitError, InitStage};
use crate::hal::{Duration, HalError, RtcControl};

/// Nominal LSI frequency used for the wakeup time base
pub const LSI_NOMINAL_HZ: u32 = 32_000;

/// LSE crystal frequency
pub const LSE_HZ: u32 = 32_768;

/// Wakeup timer clock selection (RTC_CR.WUCKSEL)
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WakeupClock {
    RtcDiv16,
    RtcDiv8,
    RtcDiv4,
    RtcDiv2,
    /// 1 Hz calendar clock
    CkSpre,
}

impl WakeupClock {
    pub const fn bits(&self) -> u32 {
        match self {
            WakeupClock::RtcDiv16 => 0b000,
            WakeupClock::RtcDiv8 => 0b001,
            WakeupClock::RtcDiv4 => 0b010,
            WakeupClock::RtcDiv2 => 0b011,
            WakeupClock::CkSpre => 0b100,
        }
    }

    /// RTCCLK divider, `None` for the calendar clock
    pub const fn rtc_divider(&self) -> Option<u32> {
        match self {
            WakeupClock::RtcDiv16 => Some(16),
            WakeupClock::RtcDiv8 => Some(8),
            WakeupClock::RtcDiv4 => Some(4),
            WakeupClock::RtcDiv2 => Some(2),
            WakeupClock::CkSpre => None,
        }
    }
}

/// Periodic wakeup: `counter` ticks of `divider / source_hz` seconds
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WakeupTimerConfig {
    pub counter: u16,
    pub clock: WakeupClock,
    /// RTC clock feeding the divider
    pub source_hz: u32,
}

impl Default for WakeupTimerConfig {
    /// Longest period available with RTCCLK/16: 0xFFFF × 0.5 ms ≈ 32.77 s
    fn default() -> Self {
        Self {
            counter: 0xFFFF,
            clock: WakeupClock::RtcDiv16,
            source_hz: LSI_NOMINAL_HZ,
        }
    }
}

impl WakeupTimerConfig {
    /// Period between wakeups in microseconds
    pub fn interval_micros(&self) -> u64 {
        match self.clock.rtc_divider() {
            Some(divider) => {
                self.counter as u64 * divider as u64 * 1_000_000 / self.source_hz.max(1) as u64
            }
            None => self.counter as u64 * 1_000_000,
        }
    }

    /// Period between wakeups
    pub fn interval(&self) -> Duration {
        Duration::from_micros(self.interval_micros())
    }

    /// Longest period `clock` can express from `source_hz`
    pub fn max_interval(clock: WakeupClock, source_hz: u32) -> Duration {
        Self {
            counter: u16::MAX,
            clock,
            source_hz,
        }
        .interval()
    }

    /// Counter for the longest period not exceeding `interval`
    pub fn for_interval(
        interval: Duration,
        clock: WakeupClock,
        source_hz: u32,
    ) -> Result<Self, HalError> {
        if source_hz == 0 {
            return Err(HalError::InvalidConfig);
        }
        let micros = interval.as_micros() as u128;
        let ticks = match clock.rtc_divider() {
            Some(divider) => micros * source_hz as u128 / (divider as u128 * 1_000_000),
            None => micros / 1_000_000,
        };
        if ticks == 0 || ticks > u16::MAX as u128 {
            return Err(HalError::InvalidConfig);
        }
        Ok(Self {
            counter: ticks as u16,
            clock,
            source_hz,
        })
    }

    pub fn validate(&self) -> Result<(), HalError> {
        if self.counter == 0 || self.source_hz == 0 {
            return Err(HalError::InvalidConfig);
        }
        Ok(())
    }
}

/// Calendar hour format
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HourFormat {
    H24,
    H12,
}

/// Signal routed to the RTC output pin
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RtcOutput {
    Disabled,
    AlarmA,
    AlarmB,
    Wakeup,
}

impl RtcOutput {
    /// RTC_CR.OSEL encoding
    pub const fn bits(&self) -> u32 {
        *self as u32
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OutputPolarity {
    High,
    Low,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OutputType {
    OpenDrain,
    PushPull,
}

/// RTC prescalers and output
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RtcConfig {
    pub hour_format: HourFormat,
    /// 7-bit asynchronous prescaler
    pub async_prediv: u8,
    /// 15-bit synchronous prescaler
    pub sync_prediv: u16,
    pub output: RtcOutput,
    /// Move RTC_OUT from PC13 to PB2
    pub output_remap: bool,
    pub polarity: OutputPolarity,
    pub output_type: OutputType,
}

impl Default for RtcConfig {
    fn default() -> Self {
        Self {
            hour_format: HourFormat::H24,
            async_prediv: 127,
            sync_prediv: 255,
            output: RtcOutput::Disabled,
            output_remap: false,
            polarity: OutputPolarity::High,
            output_type: OutputType::OpenDrain,
        }
    }
}

impl RtcConfig {
    /// Calendar clock (ck_spre) frequency from `rtcclk_hz`
    pub fn calendar_hz(&self, rtcclk_hz: u32) -> u32 {
        rtcclk_hz / ((self.async_prediv as u32 + 1) * (self.sync_prediv as u32 + 1))
    }

    pub fn validate(&self) -> Result<(), HalError> {
        if self.async_prediv > 0x7F || self.sync_prediv > 0x7FFF {
            return Err(HalError::InvalidConfig);
        }
        Ok(())
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DaylightSaving {
    None,
    Add1Hour,
    Sub1Hour,
}

/// Time of day; hours are 0..24 in 24-hour format
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RtcTime {
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
    /// PM flag, 12-hour format only
    pub pm: bool,
    pub daylight_saving: DaylightSaving,
    /// Value of the BKP "store operation" bit
    pub store_operation: bool,
}

impl Default for RtcTime {
    fn default() -> Self {
        Self {
            hours: 0,
            minutes: 0,
            seconds: 0,
            pm: false,
            daylight_saving: DaylightSaving::None,
            store_operation: false,
        }
    }
}

impl RtcTime {
    pub fn validate(&self) -> Result<(), HalError> {
        if self.hours > 23 || self.minutes > 59 || self.seconds > 59 {
            return Err(HalError::InvalidConfig);
        }
        Ok(())
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Weekday {
    Monday = 1,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    /// RTC_DR.WDU encoding (Monday = 1)
    pub const fn bits(&self) -> u32 {
        *self as u32
    }
}

/// Calendar date; `year` is 0..=99
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RtcDate {
    pub weekday: Weekday,
    pub month: u8,
    pub day: u8,
    pub year: u8,
}

impl Default for RtcDate {
    fn default() -> Self {
        Self {
            weekday: Weekday::Monday,
            month: 1,
            day: 1,
            year: 0,
        }
    }
}

impl RtcDate {
    pub fn validate(&self) -> Result<(), HalError> {
        if !(1..=12).contains(&self.month) || !(1..=31).contains(&self.day) || self.year > 99 {
            return Err(HalError::InvalidConfig);
        }
        Ok(())
    }
}

/// Time and date written at boot
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RtcCalendar {
    pub time: RtcTime,
    pub date: RtcDate,
}

impl RtcCalendar {
    pub fn validate(&self) -> Result<(), HalError> {
        self.time.validate()?;
        self.date.validate()
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Alarm {
    A,
    B,
}

/// Calendar fields excluded from the alarm comparison
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AlarmMask {
    pub day: bool,
    pub hours: bool,
    pub minutes: bool,
    pub seconds: bool,
}

impl AlarmMask {
    /// Compare every field
    pub const NONE: AlarmMask = AlarmMask {
        day: false,
        hours: false,
        minutes: false,
        seconds: false,
    };

    /// Compare nothing: fires every second
    pub const ALL: AlarmMask = AlarmMask {
        day: true,
        hours: true,
        minutes: true,
        seconds: true,
    };
}

/// Sub-second comparison of an alarm
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SubSecondMask {
    /// No sub-second bits compared
    All,
    /// Compare the `n` least significant bits (1..=15)
    Compare(u8),
}

impl SubSecondMask {
    /// RTC_ALRMASSR.MASKSS encoding
    pub const fn bits(&self) -> u32 {
        match self {
            SubSecondMask::All => 0,
            SubSecondMask::Compare(n) => *n as u32,
        }
    }
}

/// Day match of an alarm
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AlarmDay {
    /// Day of month, 1..=31
    Date(u8),
    Weekday(Weekday),
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AlarmConfig {
    pub alarm: Alarm,
    pub time: RtcTime,
    pub sub_seconds: u16,
    pub mask: AlarmMask,
    pub sub_second_mask: SubSecondMask,
    pub day: AlarmDay,
}

impl Default for AlarmConfig {
    /// Alarm A at 00:00:00 on day 1, all fields compared
    fn default() -> Self {
        Self {
            alarm: Alarm::A,
            time: RtcTime::default(),
            sub_seconds: 0,
            mask: AlarmMask::NONE,
            sub_second_mask: SubSecondMask::All,
            day: AlarmDay::Date(1),
        }
    }
}

impl AlarmConfig {
    pub fn validate(&self) -> Result<(), HalError> {
        self.time.validate()?;
        if self.sub_seconds > 0x7FFF {
            return Err(HalError::InvalidConfig);
        }
        if let SubSecondMask::Compare(n) = self.sub_second_mask {
            if !(1..=15).contains(&n) {
                return Err(HalError::InvalidConfig);
            }
        }
        if let AlarmDay::Date(d) = self.day {
            if !(1..=31).contains(&d) {
                return Err(HalError::InvalidConfig);
            }
        }
        Ok(())
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Tamper {
    T1,
    T2,
    T3,
}

impl Tamper {
    /// Zero-based tamper index
    pub const fn index(&self) -> u32 {
        *self as u32
    }
}

/// Active edge (filter disabled) or level (filter enabled)
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TamperTrigger {
    RisingEdge,
    FallingEdge,
    LowLevel,
    HighLevel,
}

impl TamperTrigger {
    const fn is_edge(&self) -> bool {
        matches!(self, TamperTrigger::RisingEdge | TamperTrigger::FallingEdge)
    }

    /// RTC_TAMPCR.TAMPxTRG value
    pub const fn trg_bit(&self) -> bool {
        matches!(self, TamperTrigger::FallingEdge | TamperTrigger::HighLevel)
    }
}

/// Consecutive samples needed to validate a level tamper
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TamperFilter {
    Disabled,
    Samples2,
    Samples4,
    Samples8,
}

impl TamperFilter {
    pub const fn bits(&self) -> u32 {
        *self as u32
    }
}

/// Tamper sampling frequency, as an RTCCLK divider
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TamperSampling {
    Div32768,
    Div16384,
    Div8192,
    Div4096,
    Div2048,
    Div1024,
    Div512,
    Div256,
}

impl TamperSampling {
    pub const fn bits(&self) -> u32 {
        *self as u32
    }
}

/// Pull-up precharge duration before sampling
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TamperPrecharge {
    Rtcclk1,
    Rtcclk2,
    Rtcclk4,
    Rtcclk8,
}

impl TamperPrecharge {
    pub const fn bits(&self) -> u32 {
        *self as u32
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TamperConfig {
    pub tamper: Tamper,
    pub trigger: TamperTrigger,
    /// Erase backup registers on detection
    pub erase_backup: bool,
    /// Mask the flag once detected (level triggers only)
    pub mask_flag: bool,
    pub filter: TamperFilter,
    pub sampling: TamperSampling,
    pub precharge: TamperPrecharge,
    pub pull_up: bool,
    /// Save a timestamp on detection
    pub timestamp_on_detection: bool,
}

impl Default for TamperConfig {
    fn default() -> Self {
        Self {
            tamper: Tamper::T1,
            trigger: TamperTrigger::RisingEdge,
            erase_backup: true,
            mask_flag: false,
            filter: TamperFilter::Disabled,
            sampling: TamperSampling::Div32768,
            precharge: TamperPrecharge::Rtcclk1,
            pull_up: true,
            timestamp_on_detection: true,
        }
    }
}

impl TamperConfig {
    /// Edge triggers need the filter off, level triggers need it on; masking
    /// the flag only makes sense for level triggers.
    pub fn validate(&self) -> Result<(), HalError> {
        let filtered = self.filter != TamperFilter::Disabled;
        if self.trigger.is_edge() == filtered {
            return Err(HalError::InvalidConfig);
        }
        if self.mask_flag && self.trigger.is_edge() {
            return Err(HalError::InvalidConfig);
        }
        Ok(())
    }
}

/// Program the periodic wakeup interrupt
pub fn arm_wakeup<R: RtcControl>(rtc: &mut R, config: &WakeupTimerConfig) -> Result<(), FatalInitError> {
    config
        .validate()
        .map_err(FatalInitError::at(InitStage::WakeupArm))?;
    rtc.set_wakeup_timer_it(config.counter, config.clock)
        .map_err(FatalInitError::at(InitStage::WakeupArm))
}

/// Stop the wakeup timer and clear any pending wakeup event
pub fn disable_wakeup<R: RtcControl>(rtc: &mut R) -> Result<(), FatalInitError> {
    rtc.deactivate_wakeup_timer()
        .map_err(FatalInitError::at(InitStage::WakeupDisarm))
}

/// Tracks whether the wakeup timer is armed, so it is never armed twice
/// without a deactivation in between.
#[derive(Debug, Default)]
pub struct WakeupTimer {
    armed: bool,
}

impl WakeupTimer {
    pub const fn new() -> Self {
        Self { armed: false }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn arm<R: RtcControl>(
        &mut self,
        rtc: &mut R,
        config: &WakeupTimerConfig,
    ) -> Result<(), FatalInitError> {
        if self.armed {
            return Err(FatalInitError::new(InitStage::WakeupArm, HalError::Busy));
        }
        arm_wakeup(rtc, config)?;
        self.armed = true;
        trace!("wakeup armed: {} us", config.interval_micros());
        Ok(())
    }

    pub fn disarm<R: RtcControl>(&mut self, rtc: &mut R) -> Result<(), FatalInitError> {
        disable_wakeup(rtc)?;
        self.armed = false;
        Ok(())
    }
}

/// Select the RTC clock and program prescalers
pub fn init_rtc<R: RtcControl>(rtc: &mut R, config: &RtcConfig) -> Result<(), FatalInitError> {
    config.validate().map_err(FatalInitError::at(InitStage::Rtc))?;
    rtc.init(config).map_err(FatalInitError::at(InitStage::Rtc))
}

/// Write time, then date
pub fn configure_calendar<R: RtcControl>(
    rtc: &mut R,
    calendar: &RtcCalendar,
) -> Result<(), FatalInitError> {
    calendar
        .validate()
        .map_err(FatalInitError::at(InitStage::Calendar))?;
    rtc.set_time(&calendar.time)
        .map_err(FatalInitError::at(InitStage::Calendar))?;
    rtc.set_date(&calendar.date)
        .map_err(FatalInitError::at(InitStage::Calendar))
}

/// Arm the calendar-match interrupt
pub fn configure_alarm<R: RtcControl>(rtc: &mut R, alarm: &AlarmConfig) -> Result<(), FatalInitError> {
    alarm.validate().map_err(FatalInitError::at(InitStage::Alarm))?;
    rtc.set_alarm_it(alarm)
        .map_err(FatalInitError::at(InitStage::Alarm))
}

/// Arm the tamper-detect input
pub fn configure_tamper<R: RtcControl>(
    rtc: &mut R,
    tamper: &TamperConfig,
) -> Result<(), FatalInitError> {
    tamper.validate().map_err(FatalInitError::at(InitStage::Tamper))?;
    rtc.set_tamper(tamper)
        .map_err(FatalInitError::at(InitStage::Tamper))
}
