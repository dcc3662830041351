//! Fatal initialization errors

use core::fmt;

use crate::hal::HalError;

/// Step that was being performed when the hardware reported a failure
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InitStage {
    /// Run clock profile rejected before programming
    ClockProfile,
    /// Regulator voltage range
    VoltageScaling,
    /// Backup-domain access, LSE drive, HSE/LSE start
    Oscillators,
    /// SYSCLK switch, bus prescalers, flash latency
    BusClocks,
    /// Clock selected on stop-mode exit
    StopWakeupClock,
    /// LPUART1 init and FIFO setup
    Uart,
    /// RTC prescalers and output
    Rtc,
    /// Time and date
    Calendar,
    /// Calendar alarm
    Alarm,
    /// Tamper input
    Tamper,
    /// GPIO reconfiguration before sleep
    Quiesce,
    /// Wakeup timer programming
    WakeupArm,
    /// Wakeup timer deactivation
    WakeupDisarm,
    /// Status LED access
    Led,
}

/// The one error class of the firmware: some hardware step failed and the
/// device must stop in the error handler.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FatalInitError {
    /// Failing step
    pub stage: InitStage,
    /// What the HAL reported
    pub cause: HalError,
}

impl FatalInitError {
    pub const fn new(stage: InitStage, cause: HalError) -> Self {
        Self { stage, cause }
    }

    /// Adapter for `map_err`: tags a [`HalError`] with the stage it came from
    pub fn at(stage: InitStage) -> impl Fn(HalError) -> FatalInitError {
        move |cause| FatalInitError::new(stage, cause)
    }
}

impl fmt::Display for FatalInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fatal error during {:?}: {}", self.stage, self.cause)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for FatalInitError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_at_tags_stage() {
        let tag = FatalInitError::at(InitStage::Oscillators);
        let err = tag(HalError::Timeout);
        assert_eq!(err.stage, InitStage::Oscillators);
        assert_eq!(err.cause, HalError::Timeout);
    }

    #[test]
    fn test_display_names_stage_and_cause() {
        use std::string::ToString;

        let text = FatalInitError::new(InitStage::Rtc, HalError::NotInitialized).to_string();
        assert!(text.contains("Rtc"));
        assert!(text.contains("not initialized"));
    }
}
