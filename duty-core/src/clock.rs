//! Clock Configurator: the run-mode clock tree
//!
//! Stop 2 turns off HSE and PLL; the device wakes on MSI (or HSI16), so the
//! run profile is programmed at boot and again after every wake.

use crate::error::{FatalInitError, InitStage};
use crate::hal::{ClockControl, HalError};

/// MSI frequency out of reset
pub const MSI_RESET_HZ: u32 = 4_000_000;

/// HSI16 frequency
pub const HSI16_HZ: u32 = 16_000_000;

/// Main regulator output range
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VoltageScale {
    /// High performance, up to 80 MHz
    Range1,
    /// Low power, up to 26 MHz
    Range2,
}

impl VoltageScale {
    /// Highest SYSCLK the range allows
    pub const fn max_sysclk_hz(&self) -> u32 {
        match self {
            VoltageScale::Range1 => 80_000_000,
            VoltageScale::Range2 => 26_000_000,
        }
    }

    /// Highest HCLK that `latency` wait states support in this range
    pub const fn max_hclk_hz(&self, latency: FlashLatency) -> u32 {
        match (self, latency) {
            (VoltageScale::Range1, FlashLatency::Ws0) => 16_000_000,
            (VoltageScale::Range1, FlashLatency::Ws1) => 32_000_000,
            (VoltageScale::Range1, FlashLatency::Ws2) => 48_000_000,
            (VoltageScale::Range1, FlashLatency::Ws3) => 64_000_000,
            (VoltageScale::Range1, FlashLatency::Ws4) => 80_000_000,
            (VoltageScale::Range2, FlashLatency::Ws0) => 6_000_000,
            (VoltageScale::Range2, FlashLatency::Ws1) => 12_000_000,
            (VoltageScale::Range2, FlashLatency::Ws2) => 18_000_000,
            (VoltageScale::Range2, FlashLatency::Ws3 | FlashLatency::Ws4) => 26_000_000,
        }
    }
}

/// Flash wait states
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashLatency {
    Ws0,
    Ws1,
    Ws2,
    Ws3,
    Ws4,
}

impl FlashLatency {
    pub const fn wait_states(&self) -> u8 {
        *self as u8
    }
}

/// SYSCLK source
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SysClkSource {
    Msi,
    Hsi16,
    Hse,
    Pll,
}

impl SysClkSource {
    /// RCC_CFGR.SW encoding
    pub const fn bits(&self) -> u32 {
        match self {
            SysClkSource::Msi => 0b00,
            SysClkSource::Hsi16 => 0b01,
            SysClkSource::Hse => 0b10,
            SysClkSource::Pll => 0b11,
        }
    }
}

/// AHB prescaler
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AhbPrescaler {
    Div1,
    Div2,
    Div4,
    Div8,
    Div16,
    Div64,
    Div128,
    Div256,
    Div512,
}

impl AhbPrescaler {
    pub const fn divisor(&self) -> u32 {
        match self {
            AhbPrescaler::Div1 => 1,
            AhbPrescaler::Div2 => 2,
            AhbPrescaler::Div4 => 4,
            AhbPrescaler::Div8 => 8,
            AhbPrescaler::Div16 => 16,
            AhbPrescaler::Div64 => 64,
            AhbPrescaler::Div128 => 128,
            AhbPrescaler::Div256 => 256,
            AhbPrescaler::Div512 => 512,
        }
    }

    /// RCC_CFGR.HPRE encoding
    pub const fn bits(&self) -> u32 {
        match self {
            AhbPrescaler::Div1 => 0b0000,
            AhbPrescaler::Div2 => 0b1000,
            AhbPrescaler::Div4 => 0b1001,
            AhbPrescaler::Div8 => 0b1010,
            AhbPrescaler::Div16 => 0b1011,
            AhbPrescaler::Div64 => 0b1100,
            AhbPrescaler::Div128 => 0b1101,
            AhbPrescaler::Div256 => 0b1110,
            AhbPrescaler::Div512 => 0b1111,
        }
    }

    /// Decode RCC_CFGR.HPRE; every value below 0b1000 means no division
    pub const fn from_bits(bits: u32) -> Self {
        match bits & 0b1111 {
            0b1000 => AhbPrescaler::Div2,
            0b1001 => AhbPrescaler::Div4,
            0b1010 => AhbPrescaler::Div8,
            0b1011 => AhbPrescaler::Div16,
            0b1100 => AhbPrescaler::Div64,
            0b1101 => AhbPrescaler::Div128,
            0b1110 => AhbPrescaler::Div256,
            0b1111 => AhbPrescaler::Div512,
            _ => AhbPrescaler::Div1,
        }
    }
}

/// APB1/APB2 prescaler
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ApbPrescaler {
    Div1,
    Div2,
    Div4,
    Div8,
    Div16,
}

impl ApbPrescaler {
    pub const fn divisor(&self) -> u32 {
        match self {
            ApbPrescaler::Div1 => 1,
            ApbPrescaler::Div2 => 2,
            ApbPrescaler::Div4 => 4,
            ApbPrescaler::Div8 => 8,
            ApbPrescaler::Div16 => 16,
        }
    }

    /// RCC_CFGR.PPREx encoding
    pub const fn bits(&self) -> u32 {
        match self {
            ApbPrescaler::Div1 => 0b000,
            ApbPrescaler::Div2 => 0b100,
            ApbPrescaler::Div4 => 0b101,
            ApbPrescaler::Div8 => 0b110,
            ApbPrescaler::Div16 => 0b111,
        }
    }
}

/// LSE oscillator drive capability
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LseDrive {
    Low,
    MediumLow,
    MediumHigh,
    High,
}

impl LseDrive {
    /// RCC_BDCR.LSEDRV encoding
    pub const fn bits(&self) -> u32 {
        *self as u32
    }
}

/// HSE oscillator state
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HseMode {
    Off,
    /// External crystal
    Crystal,
    /// External clock fed to OSC_IN
    Bypass,
}

/// PLL handling while programming the oscillators
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PllState {
    /// Leave the PLL as it is
    None,
    /// Switch the PLL off
    Off,
}

/// Oscillators to start
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OscillatorConfig {
    pub hse: HseMode,
    /// HSE frequency; ignored when HSE is off
    pub hse_hz: u32,
    pub lse: bool,
    pub lse_drive: LseDrive,
    pub pll: PllState,
}

/// SYSCLK source and bus dividers
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusClockConfig {
    pub sysclk: SysClkSource,
    pub ahb: AhbPrescaler,
    pub apb1: ApbPrescaler,
    pub apb2: ApbPrescaler,
}

/// Clock used by the hardware on stop-mode exit
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StopWakeupClock {
    Msi,
    Hsi16,
}

impl StopWakeupClock {
    /// SYSCLK right after leaving stop mode. MSI keeps its reset range.
    pub const fn hz(&self) -> u32 {
        match self {
            StopWakeupClock::Msi => MSI_RESET_HZ,
            StopWakeupClock::Hsi16 => HSI16_HZ,
        }
    }
}

/// The RUN clock profile
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RunClockProfile {
    pub voltage_scale: VoltageScale,
    pub oscillators: OscillatorConfig,
    pub bus: BusClockConfig,
    pub flash_latency: FlashLatency,
}

impl Default for RunClockProfile {
    /// 8 MHz HSE crystal straight to SYSCLK, LSE on for the RTC, zero wait states
    fn default() -> Self {
        Self {
            voltage_scale: VoltageScale::Range1,
            oscillators: OscillatorConfig {
                hse: HseMode::Crystal,
                hse_hz: 8_000_000,
                lse: true,
                lse_drive: LseDrive::Low,
                pll: PllState::None,
            },
            bus: BusClockConfig {
                sysclk: SysClkSource::Hse,
                ahb: AhbPrescaler::Div1,
                apb1: ApbPrescaler::Div1,
                apb2: ApbPrescaler::Div1,
            },
            flash_latency: FlashLatency::Ws0,
        }
    }
}

impl RunClockProfile {
    /// SYSCLK this profile produces, if its source is one the profile starts
    pub fn sysclk_hz(&self) -> Option<u32> {
        match self.bus.sysclk {
            SysClkSource::Msi => Some(MSI_RESET_HZ),
            SysClkSource::Hsi16 => Some(HSI16_HZ),
            SysClkSource::Hse => match self.oscillators.hse {
                HseMode::Off => None,
                HseMode::Crystal | HseMode::Bypass => Some(self.oscillators.hse_hz),
            },
            // The run profile never starts the PLL
            SysClkSource::Pll => None,
        }
    }

    pub fn hclk_hz(&self, sysclk_hz: u32) -> u32 {
        sysclk_hz / self.bus.ahb.divisor()
    }

    pub fn pclk1_hz(&self, sysclk_hz: u32) -> u32 {
        self.hclk_hz(sysclk_hz) / self.bus.apb1.divisor()
    }

    pub fn pclk2_hz(&self, sysclk_hz: u32) -> u32 {
        self.hclk_hz(sysclk_hz) / self.bus.apb2.divisor()
    }

    /// Check that voltage range and flash latency can carry the resulting
    /// frequency. Returns SYSCLK in Hz.
    pub fn validate(&self) -> Result<u32, HalError> {
        let sysclk_hz = self.sysclk_hz().ok_or(HalError::InvalidConfig)?;
        if sysclk_hz == 0 || sysclk_hz > self.voltage_scale.max_sysclk_hz() {
            return Err(HalError::InvalidConfig);
        }
        if self.hclk_hz(sysclk_hz) > self.voltage_scale.max_hclk_hz(self.flash_latency) {
            return Err(HalError::InvalidConfig);
        }
        if self.oscillators.hse != HseMode::Off
            && !(4_000_000..=48_000_000).contains(&self.oscillators.hse_hz)
        {
            return Err(HalError::InvalidConfig);
        }
        Ok(sysclk_hz)
    }
}

/// Program the run profile: regulator range, backup access, LSE drive,
/// oscillators, then SYSCLK switch with bus dividers and flash latency.
pub fn configure_run_clock<C: ClockControl>(
    clock: &mut C,
    profile: &RunClockProfile,
) -> Result<(), FatalInitError> {
    let sysclk_hz = profile
        .validate()
        .map_err(FatalInitError::at(InitStage::ClockProfile))?;

    clock
        .set_voltage_scaling(profile.voltage_scale)
        .map_err(FatalInitError::at(InitStage::VoltageScaling))?;

    clock
        .enable_backup_access()
        .map_err(FatalInitError::at(InitStage::Oscillators))?;
    clock
        .set_lse_drive(profile.oscillators.lse_drive)
        .map_err(FatalInitError::at(InitStage::Oscillators))?;
    clock
        .configure_oscillators(&profile.oscillators)
        .map_err(FatalInitError::at(InitStage::Oscillators))?;

    clock
        .configure_bus_clocks(&profile.bus, profile.flash_latency, sysclk_hz)
        .map_err(FatalInitError::at(InitStage::BusClocks))?;

    debug!("run clock: SYSCLK {} Hz", sysclk_hz);
    Ok(())
}

/// Select the clock the hardware runs on right after stop mode
pub fn configure_stop_wakeup_clock<C: ClockControl>(
    clock: &mut C,
    wakeup_clock: StopWakeupClock,
) -> Result<(), FatalInitError> {
    clock
        .set_stop_wakeup_clock(wakeup_clock)
        .map_err(FatalInitError::at(InitStage::StopWakeupClock))
}
