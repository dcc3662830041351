//! STM32L4 hardware implementation
//!
//! Register-level implementations of the duty-core HAL traits. Every ready
//! flag is polled against an `embassy_time` deadline; the time base is the
//! SysTick counter, so SysTick must be running before any of these are used.

use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::interrupt::InterruptNumber;
use cortex_m::peripheral::{NVIC, SCB, SYST};
use duty_core::clock::{
    AhbPrescaler, BusClockConfig, FlashLatency, HseMode, LseDrive, OscillatorConfig, PllState, StopWakeupClock,
    VoltageScale, MSI_RESET_HZ,
};
use duty_core::hal::{
    ClockControl, GpioControl, HalError, PowerControl, PowerHal, RtcControl, StopEntry, UartControl,
};
use duty_core::interrupt::{RtcEventAck, WakeFlags};
use duty_core::types::{GpioPort, WakeSource};
use duty_core::uart::{FifoThreshold, FlowControl, Parity, UartConfig};
use duty_core::wakeup::{
    Alarm, AlarmConfig, AlarmDay, DaylightSaving, HourFormat, OutputPolarity, OutputType, RtcConfig,
    RtcDate, RtcTime, TamperConfig, WakeupClock,
};
use embassy_time::{Duration, Instant};
use portable_atomic::{AtomicU32, Ordering};

use crate::board::{LPUART1_AF, LPUART1_PINS};
use crate::regs::*;

const HSE_TIMEOUT: Duration = Duration::from_millis(100);
const LSE_TIMEOUT: Duration = Duration::from_millis(5000);
const CLOCK_SWITCH_TIMEOUT: Duration = Duration::from_millis(5000);
const RTC_TIMEOUT: Duration = Duration::from_millis(1000);
const VOS_TIMEOUT: Duration = Duration::from_millis(50);
const UART_TIMEOUT: Duration = Duration::from_millis(1000);

/// LPUART1 ISR and its enable-acknowledge flags
const LPUART_ISR: u32 = 0x1C;
const LPUART_ISR_TEACK: u32 = 1 << 21;
const LPUART_ISR_REACK: u32 = 1 << 22;

/// PCLK1, the LPUART1 kernel clock; MSI until the run profile is applied
static PCLK1_HZ: AtomicU32 = AtomicU32::new(MSI_RESET_HZ);

/// Poll `ready` until it holds or `timeout` expires
fn wait_for(timeout: Duration, mut ready: impl FnMut() -> bool) -> Result<(), HalError> {
    let start = Instant::now();
    while !ready() {
        if start.elapsed() > timeout {
            return Err(HalError::Timeout);
        }
    }
    Ok(())
}

const fn bcd(value: u8) -> u32 {
    (((value / 10) << 4) | (value % 10)) as u32
}

// ========================================
// Clock tree
// ========================================

/// Reload SysTick for a 1 ms tick at `hclk_hz`
fn set_tick_rate(hclk_hz: u32) {
    // Only the reload and current-value registers; Stm32Clock owns SYST
    unsafe {
        let syst = &*SYST::PTR;
        syst.rvr.write(hclk_hz / 1_000 - 1);
        syst.cvr.write(0);
    }
}

/// HCLK right after Stop 2: the stop-wakeup oscillator through the AHB
/// prescaler, which the stop mode retains
fn wake_hclk_hz() -> u32 {
    let cfgr = read(RCC_BASE, RCC_CFGR);
    let wake = if cfgr & RCC_CFGR_STOPWUCK != 0 {
        StopWakeupClock::Hsi16
    } else {
        StopWakeupClock::Msi
    };
    wake.hz() / AhbPrescaler::from_bits(cfgr >> RCC_CFGR_HPRE_SHIFT).divisor()
}

/// RCC, PWR and FLASH; holds SysTick so the tick follows HCLK
pub struct Stm32Clock {
    _syst: SYST,
}

impl Stm32Clock {
    fn new(mut syst: SYST) -> Self {
        syst.set_clock_source(SystClkSource::Core);
        syst.enable_interrupt();
        set_tick_rate(MSI_RESET_HZ);
        syst.enable_counter();
        Self { _syst: syst }
    }

    fn set_flash_latency(latency: FlashLatency) -> Result<(), HalError> {
        let ws = latency.wait_states() as u32;
        modify(FLASH_BASE, FLASH_ACR, FLASH_ACR_LATENCY_MASK, ws);
        if read(FLASH_BASE, FLASH_ACR) & FLASH_ACR_LATENCY_MASK != ws {
            return Err(HalError::Rejected);
        }
        Ok(())
    }
}

impl ClockControl for Stm32Clock {
    fn set_voltage_scaling(&mut self, scale: VoltageScale) -> Result<(), HalError> {
        set_bits(RCC_BASE, RCC_APB1ENR1, RCC_APB1ENR1_PWREN);
        let vos = match scale {
            VoltageScale::Range1 => 0b01,
            VoltageScale::Range2 => 0b10,
        };
        modify(PWR_BASE, PWR_CR1, PWR_CR1_VOS_MASK, vos << PWR_CR1_VOS_SHIFT);
        wait_for(VOS_TIMEOUT, || read(PWR_BASE, PWR_SR2) & PWR_SR2_VOSF == 0)
    }

    fn enable_backup_access(&mut self) -> Result<(), HalError> {
        set_bits(PWR_BASE, PWR_CR1, PWR_CR1_DBP);
        wait_for(RTC_TIMEOUT, || read(PWR_BASE, PWR_CR1) & PWR_CR1_DBP != 0)
    }

    fn set_lse_drive(&mut self, drive: LseDrive) -> Result<(), HalError> {
        modify(
            RCC_BASE,
            RCC_BDCR,
            RCC_BDCR_LSEDRV_MASK,
            drive.bits() << RCC_BDCR_LSEDRV_SHIFT,
        );
        Ok(())
    }

    fn configure_oscillators(&mut self, osc: &OscillatorConfig) -> Result<(), HalError> {
        let on_hse = (read(RCC_BASE, RCC_CFGR) >> RCC_CFGR_SWS_SHIFT) & 0b11 == 0b10;
        match osc.hse {
            HseMode::Off => {
                // Cannot stop the clock SYSCLK runs on
                if on_hse {
                    return Err(HalError::Rejected);
                }
                clear_bits(RCC_BASE, RCC_CR, RCC_CR_HSEON);
            }
            HseMode::Crystal | HseMode::Bypass if on_hse => {}
            HseMode::Crystal | HseMode::Bypass => {
                clear_bits(RCC_BASE, RCC_CR, RCC_CR_HSEON);
                wait_for(HSE_TIMEOUT, || read(RCC_BASE, RCC_CR) & RCC_CR_HSERDY == 0)?;
                if osc.hse == HseMode::Bypass {
                    set_bits(RCC_BASE, RCC_CR, RCC_CR_HSEBYP);
                } else {
                    clear_bits(RCC_BASE, RCC_CR, RCC_CR_HSEBYP);
                }
                set_bits(RCC_BASE, RCC_CR, RCC_CR_HSEON);
                wait_for(HSE_TIMEOUT, || read(RCC_BASE, RCC_CR) & RCC_CR_HSERDY != 0)?;
            }
        }

        if osc.lse {
            set_bits(RCC_BASE, RCC_BDCR, RCC_BDCR_LSEON);
            wait_for(LSE_TIMEOUT, || read(RCC_BASE, RCC_BDCR) & RCC_BDCR_LSERDY != 0)?;
        }

        if osc.pll == PllState::Off {
            clear_bits(RCC_BASE, RCC_CR, RCC_CR_PLLON);
            wait_for(CLOCK_SWITCH_TIMEOUT, || read(RCC_BASE, RCC_CR) & RCC_CR_PLLRDY == 0)?;
        }
        Ok(())
    }

    fn configure_bus_clocks(
        &mut self,
        bus: &BusClockConfig,
        latency: FlashLatency,
        sysclk_hz: u32,
    ) -> Result<(), HalError> {
        let current = read(FLASH_BASE, FLASH_ACR) & FLASH_ACR_LATENCY_MASK;
        let raising = latency.wait_states() as u32 > current;
        if raising {
            Self::set_flash_latency(latency)?;
        }

        // Slowest APB dividers while HCLK changes
        modify(
            RCC_BASE,
            RCC_CFGR,
            (0b111 << RCC_CFGR_PPRE1_SHIFT) | (0b111 << RCC_CFGR_PPRE2_SHIFT),
            (0b111 << RCC_CFGR_PPRE1_SHIFT) | (0b111 << RCC_CFGR_PPRE2_SHIFT),
        );
        modify(RCC_BASE, RCC_CFGR, 0b1111 << RCC_CFGR_HPRE_SHIFT, bus.ahb.bits() << RCC_CFGR_HPRE_SHIFT);

        let source = bus.sysclk.bits();
        let ready = match source {
            0b10 => read(RCC_BASE, RCC_CR) & RCC_CR_HSERDY != 0,
            0b11 => read(RCC_BASE, RCC_CR) & RCC_CR_PLLRDY != 0,
            _ => true,
        };
        if !ready {
            return Err(HalError::NotInitialized);
        }
        modify(RCC_BASE, RCC_CFGR, RCC_CFGR_SW_MASK, source);
        wait_for(CLOCK_SWITCH_TIMEOUT, || {
            (read(RCC_BASE, RCC_CFGR) >> RCC_CFGR_SWS_SHIFT) & 0b11 == source
        })?;

        if !raising {
            Self::set_flash_latency(latency)?;
        }

        modify(
            RCC_BASE,
            RCC_CFGR,
            (0b111 << RCC_CFGR_PPRE1_SHIFT) | (0b111 << RCC_CFGR_PPRE2_SHIFT),
            (bus.apb1.bits() << RCC_CFGR_PPRE1_SHIFT) | (bus.apb2.bits() << RCC_CFGR_PPRE2_SHIFT),
        );

        let hclk_hz = sysclk_hz / bus.ahb.divisor();
        PCLK1_HZ.store(hclk_hz / bus.apb1.divisor(), Ordering::Relaxed);
        set_tick_rate(hclk_hz);
        Ok(())
    }

    fn set_stop_wakeup_clock(&mut self, clock: StopWakeupClock) -> Result<(), HalError> {
        match clock {
            StopWakeupClock::Msi => clear_bits(RCC_BASE, RCC_CFGR, RCC_CFGR_STOPWUCK),
            StopWakeupClock::Hsi16 => set_bits(RCC_BASE, RCC_CFGR, RCC_CFGR_STOPWUCK),
        }
        Ok(())
    }
}

// ========================================
// GPIO
// ========================================

/// GPIO ports A..I
pub struct Stm32Gpio;

impl GpioControl for Stm32Gpio {
    fn enable_port_clock(&mut self, port: GpioPort) -> Result<(), HalError> {
        set_bits(RCC_BASE, RCC_AHB2ENR, 1 << port.index());
        // Read back: the clock takes effect after the bus write completes
        let _ = read(RCC_BASE, RCC_AHB2ENR);
        Ok(())
    }

    fn configure_analog(&mut self, port: GpioPort, pins: u16) -> Result<(), HalError> {
        if read(RCC_BASE, RCC_AHB2ENR) & (1 << port.index()) == 0 {
            return Err(HalError::NotInitialized);
        }
        let mut field = 0u32;
        let mut analog = 0u32;
        for pin in 0..16 {
            if pins & (1 << pin) != 0 {
                field |= 0b11 << (pin * 2);
                analog |= GPIO_MODE_ANALOG << (pin * 2);
            }
        }
        let base = gpio_base(port.index());
        modify(base, GPIO_MODER, field, analog);
        clear_bits(base, GPIO_PUPDR, field);
        Ok(())
    }

    fn disable_port_clock(&mut self, port: GpioPort) -> Result<(), HalError> {
        clear_bits(RCC_BASE, RCC_AHB2ENR, 1 << port.index());
        Ok(())
    }
}

// ========================================
// RTC
// ========================================

/// RTC calendar, alarms, tamper and wakeup timer
pub struct Stm32Rtc {
    ready: bool,
}

impl Stm32Rtc {
    fn unlock() {
        write(RTC_BASE, RTC_WPR, RTC_WPR_KEY1);
        write(RTC_BASE, RTC_WPR, RTC_WPR_KEY2);
    }

    fn lock() {
        write(RTC_BASE, RTC_WPR, RTC_WPR_LOCK);
    }

    /// Run `f` with write protection lifted; protection is restored on error too
    fn unlocked(f: impl FnOnce() -> Result<(), HalError>) -> Result<(), HalError> {
        Self::unlock();
        let result = f();
        Self::lock();
        result
    }

    fn enter_init() -> Result<(), HalError> {
        if read(RTC_BASE, RTC_ISR) & RTC_ISR_INITF == 0 {
            set_bits(RTC_BASE, RTC_ISR, RTC_ISR_INIT);
            wait_for(RTC_TIMEOUT, || read(RTC_BASE, RTC_ISR) & RTC_ISR_INITF != 0)?;
        }
        Ok(())
    }

    fn exit_init() {
        clear_bits(RTC_BASE, RTC_ISR, RTC_ISR_INIT);
    }

    fn require_ready(&self) -> Result<(), HalError> {
        if self.ready {
            Ok(())
        } else {
            Err(HalError::NotInitialized)
        }
    }

    /// Rising-edge EXTI line plus its NVIC entry, so the event can end Stop 2
    fn enable_exti(line: u32, irq: RtcIrq) {
        set_bits(EXTI_BASE, EXTI_IMR1, line);
        set_bits(EXTI_BASE, EXTI_RTSR1, line);
        unsafe { NVIC::unmask(irq) };
    }
}

/// Clear ISR event flags (write-0-to-clear) without touching INIT
fn clear_isr_flags(flags: u32) {
    let init = read(RTC_BASE, RTC_ISR) & RTC_ISR_INIT;
    write(RTC_BASE, RTC_ISR, !(flags | RTC_ISR_INIT) | init);
}

impl RtcControl for Stm32Rtc {
    fn init(&mut self, config: &RtcConfig) -> Result<(), HalError> {
        set_bits(RCC_BASE, RCC_APB1ENR1, RCC_APB1ENR1_PWREN | RCC_APB1ENR1_RTCAPBEN);
        let bdcr = read(RCC_BASE, RCC_BDCR);
        match bdcr & RCC_BDCR_RTCSEL_MASK {
            0 => modify(RCC_BASE, RCC_BDCR, RCC_BDCR_RTCSEL_MASK, RCC_BDCR_RTCSEL_LSE),
            RCC_BDCR_RTCSEL_LSE => {}
            // Changing the source needs a backup-domain reset
            _ => return Err(HalError::Rejected),
        }
        if bdcr & RCC_BDCR_LSERDY == 0 {
            return Err(HalError::NotInitialized);
        }
        set_bits(RCC_BASE, RCC_BDCR, RCC_BDCR_RTCEN);

        Self::unlocked(|| {
            Self::enter_init()?;
            let mut cr = read(RTC_BASE, RTC_CR) & !(RTC_CR_FMT | RTC_CR_OSEL_MASK | RTC_CR_POL);
            if config.hour_format == HourFormat::H12 {
                cr |= RTC_CR_FMT;
            }
            cr |= config.output.bits() << RTC_CR_OSEL_SHIFT;
            if config.polarity == OutputPolarity::Low {
                cr |= RTC_CR_POL;
            }
            write(RTC_BASE, RTC_CR, cr);
            // Two separate writes: synchronous first
            write(RTC_BASE, RTC_PRER, config.sync_prediv as u32);
            write(
                RTC_BASE,
                RTC_PRER,
                ((config.async_prediv as u32) << 16) | config.sync_prediv as u32,
            );
            Self::exit_init();

            let mut or = 0;
            if config.output_remap {
                or |= RTC_OR_OUT_RMP;
            }
            if config.output_type == OutputType::PushPull {
                or |= RTC_OR_ALARMOUTTYPE;
            }
            write(RTC_BASE, RTC_OR, or);
            Ok(())
        })?;

        self.ready = true;
        Ok(())
    }

    fn set_time(&mut self, time: &RtcTime) -> Result<(), HalError> {
        self.require_ready()?;
        Self::unlocked(|| {
            Self::enter_init()?;
            let mut tr = (bcd(time.hours) << 16) | (bcd(time.minutes) << 8) | bcd(time.seconds);
            if time.pm {
                tr |= 1 << 22;
            }
            write(RTC_BASE, RTC_TR, tr);

            let mut cr = read(RTC_BASE, RTC_CR) & !RTC_CR_BKP;
            match time.daylight_saving {
                DaylightSaving::None => {}
                DaylightSaving::Add1Hour => cr |= RTC_CR_ADD1H,
                DaylightSaving::Sub1Hour => cr |= RTC_CR_SUB1H,
            }
            if time.store_operation {
                cr |= RTC_CR_BKP;
            }
            write(RTC_BASE, RTC_CR, cr);
            Self::exit_init();
            Ok(())
        })
    }

    fn set_date(&mut self, date: &RtcDate) -> Result<(), HalError> {
        self.require_ready()?;
        Self::unlocked(|| {
            Self::enter_init()?;
            let dr = (bcd(date.year) << 16)
                | (date.weekday.bits() << 13)
                | (bcd(date.month) << 8)
                | bcd(date.day);
            write(RTC_BASE, RTC_DR, dr);
            Self::exit_init();
            Ok(())
        })
    }

    fn set_alarm_it(&mut self, alarm: &AlarmConfig) -> Result<(), HalError> {
        self.require_ready()?;
        let (enable, irq, write_flag, alrmr, alrmssr) = match alarm.alarm {
            Alarm::A => (RTC_CR_ALRAE, RTC_CR_ALRAIE, RTC_ISR_ALRAWF, RTC_ALRMAR, RTC_ALRMASSR),
            Alarm::B => (RTC_CR_ALRBE, RTC_CR_ALRBIE, RTC_ISR_ALRBWF, RTC_ALRMBR, RTC_ALRMBSSR),
        };

        let mut value = (bcd(alarm.time.hours) << 16)
            | (bcd(alarm.time.minutes) << 8)
            | bcd(alarm.time.seconds);
        if alarm.time.pm {
            value |= 1 << 22;
        }
        value |= match alarm.day {
            AlarmDay::Date(day) => bcd(day) << 24,
            AlarmDay::Weekday(weekday) => (1 << 30) | (weekday.bits() << 24),
        };
        if alarm.mask.day {
            value |= 1 << 31;
        }
        if alarm.mask.hours {
            value |= 1 << 23;
        }
        if alarm.mask.minutes {
            value |= 1 << 15;
        }
        if alarm.mask.seconds {
            value |= 1 << 7;
        }
        let subseconds = (alarm.sub_second_mask.bits() << 24) | alarm.sub_seconds as u32;

        Self::unlocked(|| {
            clear_bits(RTC_BASE, RTC_CR, enable);
            clear_isr_flags(RTC_ISR_ALRAF | RTC_ISR_ALRBF);
            wait_for(RTC_TIMEOUT, || read(RTC_BASE, RTC_ISR) & write_flag != 0)?;
            write(RTC_BASE, alrmr, value);
            write(RTC_BASE, alrmssr, subseconds);
            set_bits(RTC_BASE, RTC_CR, enable | irq);
            Ok(())
        })?;

        Self::enable_exti(EXTI_LINE_RTC_ALARM, RtcIrq::Alarm);
        Ok(())
    }

    fn set_tamper(&mut self, tamper: &TamperConfig) -> Result<(), HalError> {
        self.require_ready()?;
        let n = tamper.tamper.index();
        let enable_bit: u32 = [0, 3, 5][n as usize];
        let mut value = read(RTC_BASE, RTC_TAMPCR);

        // Per-tamper bits
        value &= !((0b11 << enable_bit) | (0b111 << (16 + 3 * n)));
        if tamper.trigger.trg_bit() {
            value |= 1 << (enable_bit + 1);
        }
        value |= 1 << (16 + 3 * n);
        if !tamper.erase_backup {
            value |= 1 << (17 + 3 * n);
        }
        if tamper.mask_flag {
            value |= 1 << (18 + 3 * n);
        }

        // Shared bits
        value &= !((1 << 7) | (0b111 << 8) | (0b11 << 11) | (0b11 << 13) | (1 << 15));
        if tamper.timestamp_on_detection {
            value |= 1 << 7;
        }
        value |= tamper.sampling.bits() << 8;
        value |= tamper.filter.bits() << 11;
        value |= tamper.precharge.bits() << 13;
        if !tamper.pull_up {
            value |= 1 << 15;
        }

        write(RTC_BASE, RTC_TAMPCR, value);
        write(RTC_BASE, RTC_TAMPCR, value | (1 << enable_bit));
        Self::enable_exti(EXTI_LINE_RTC_TAMP, RtcIrq::TampStamp);
        Ok(())
    }

    fn set_wakeup_timer_it(&mut self, counter: u16, clock: WakeupClock) -> Result<(), HalError> {
        self.require_ready()?;
        Self::unlocked(|| {
            clear_bits(RTC_BASE, RTC_CR, RTC_CR_WUTE);
            wait_for(RTC_TIMEOUT, || read(RTC_BASE, RTC_ISR) & RTC_ISR_WUTWF != 0)?;
            write(RTC_BASE, RTC_WUTR, counter as u32);
            modify(RTC_BASE, RTC_CR, RTC_CR_WUCKSEL_MASK, clock.bits());
            clear_isr_flags(RTC_ISR_WUTF);
            Ok(())
        })?;

        Self::enable_exti(EXTI_LINE_RTC_WAKEUP, RtcIrq::Wakeup);
        write(EXTI_BASE, EXTI_PR1, EXTI_LINE_RTC_WAKEUP);

        Self::unlocked(|| {
            set_bits(RTC_BASE, RTC_CR, RTC_CR_WUTE | RTC_CR_WUTIE);
            Ok(())
        })
    }

    fn deactivate_wakeup_timer(&mut self) -> Result<(), HalError> {
        Self::unlocked(|| {
            clear_bits(RTC_BASE, RTC_CR, RTC_CR_WUTE | RTC_CR_WUTIE);
            wait_for(RTC_TIMEOUT, || read(RTC_BASE, RTC_ISR) & RTC_ISR_WUTWF != 0)?;
            clear_isr_flags(RTC_ISR_WUTF);
            Ok(())
        })?;
        write(EXTI_BASE, EXTI_PR1, EXTI_LINE_RTC_WAKEUP);
        Ok(())
    }
}

/// NVIC positions of the RTC interrupt lines
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[repr(u16)]
pub enum RtcIrq {
    TampStamp = 2,
    Wakeup = 3,
    Alarm = 41,
}

impl RtcIrq {
    /// Map a `DefaultHandler` IRQ number back to its line
    pub const fn from_irqn(irqn: i16) -> Option<Self> {
        match irqn {
            2 => Some(RtcIrq::TampStamp),
            3 => Some(RtcIrq::Wakeup),
            41 => Some(RtcIrq::Alarm),
            _ => None,
        }
    }
}

unsafe impl InterruptNumber for RtcIrq {
    fn number(self) -> u16 {
        self as u16
    }
}

/// Clears RTC event flags from the interrupt handlers
pub struct Stm32RtcAck;

impl RtcEventAck for Stm32RtcAck {
    fn acknowledge(&self, source: WakeSource) {
        let (flags, line) = match source {
            WakeSource::Alarm => (RTC_ISR_ALRAF | RTC_ISR_ALRBF, EXTI_LINE_RTC_ALARM),
            WakeSource::WakeupTimer => (RTC_ISR_WUTF, EXTI_LINE_RTC_WAKEUP),
            // Tamper 1 and its timestamp; both are outside write protection
            WakeSource::Tamper => (RTC_ISR_TAMP1F | RTC_ISR_TSF, EXTI_LINE_RTC_TAMP),
            WakeSource::Other => return,
        };
        clear_isr_flags(flags);
        write(EXTI_BASE, EXTI_PR1, line);
    }
}

// ========================================
// LPUART1
// ========================================

/// Low-power UART on PG7/PG8
pub struct Stm32Lpuart;

impl Stm32Lpuart {
    /// Run `f` with UE cleared; FIFO and threshold bits only change while disabled
    fn while_disabled(f: impl FnOnce()) {
        let cr1 = read(LPUART1_BASE, LPUART_CR1);
        clear_bits(LPUART1_BASE, LPUART_CR1, LPUART_CR1_UE);
        f();
        let fifo = read(LPUART1_BASE, LPUART_CR1) & LPUART_CR1_FIFOEN;
        write(LPUART1_BASE, LPUART_CR1, (cr1 & !LPUART_CR1_FIFOEN) | fifo);
    }

    fn configure_pins() {
        // Port G sits on VDDIO2
        set_bits(RCC_BASE, RCC_APB1ENR1, RCC_APB1ENR1_PWREN);
        set_bits(PWR_BASE, PWR_CR2, PWR_CR2_IOSV);

        let (port, pins) = LPUART1_PINS;
        set_bits(RCC_BASE, RCC_AHB2ENR, 1 << port.index());
        let base = gpio_base(port.index());
        for pin in 0..16u32 {
            if pins & (1 << pin) == 0 {
                continue;
            }
            modify(base, GPIO_MODER, 0b11 << (pin * 2), GPIO_MODE_AF << (pin * 2));
            let (afr, shift) = if pin < 8 { (GPIO_AFRL, pin * 4) } else { (GPIO_AFRH, (pin - 8) * 4) };
            modify(base, afr, 0b1111 << shift, LPUART1_AF << shift);
        }
    }
}

impl UartControl for Stm32Lpuart {
    fn init(&mut self, config: &UartConfig) -> Result<(), HalError> {
        if config.one_bit_sampling {
            // LPUART has no one-bit sampling
            return Err(HalError::InvalidConfig);
        }
        let brr = config.brr(PCLK1_HZ.load(Ordering::Relaxed))?;

        set_bits(RCC_BASE, RCC_APB1ENR2, RCC_APB1ENR2_LPUART1EN);
        clear_bits(RCC_BASE, RCC_CCIPR, RCC_CCIPR_LPUART1SEL_MASK);
        Self::configure_pins();

        clear_bits(LPUART1_BASE, LPUART_CR1, LPUART_CR1_UE);

        let (m1, m0) = config.word_length.m_bits();
        let mut cr1 = 0;
        if m1 {
            cr1 |= LPUART_CR1_M1;
        }
        if m0 {
            cr1 |= LPUART_CR1_M0;
        }
        match config.parity {
            Parity::None => {}
            Parity::Even => cr1 |= LPUART_CR1_PCE,
            Parity::Odd => cr1 |= LPUART_CR1_PCE | LPUART_CR1_PS,
        }
        if config.mode.tx() {
            cr1 |= LPUART_CR1_TE;
        }
        if config.mode.rx() {
            cr1 |= LPUART_CR1_RE;
        }
        write(LPUART1_BASE, LPUART_CR1, cr1);
        write(LPUART1_BASE, LPUART_CR2, config.stop_bits.bits() << LPUART_CR2_STOP_SHIFT);

        let cr3 = match config.flow_control {
            FlowControl::None => 0,
            FlowControl::Rts => LPUART_CR3_RTSE,
            FlowControl::Cts => LPUART_CR3_CTSE,
            FlowControl::RtsCts => LPUART_CR3_RTSE | LPUART_CR3_CTSE,
        };
        write(LPUART1_BASE, LPUART_CR3, cr3);
        write(LPUART1_BASE, LPUART_PRESC, config.prescaler.bits());
        write(LPUART1_BASE, LPUART_BRR, brr);

        set_bits(LPUART1_BASE, LPUART_CR1, LPUART_CR1_UE);
        if config.mode.tx() {
            wait_for(UART_TIMEOUT, || read(LPUART1_BASE, LPUART_ISR) & LPUART_ISR_TEACK != 0)?;
        }
        if config.mode.rx() {
            wait_for(UART_TIMEOUT, || read(LPUART1_BASE, LPUART_ISR) & LPUART_ISR_REACK != 0)?;
        }
        Ok(())
    }

    fn set_tx_fifo_threshold(&mut self, threshold: FifoThreshold) -> Result<(), HalError> {
        Self::while_disabled(|| {
            modify(
                LPUART1_BASE,
                LPUART_CR3,
                0b111 << LPUART_CR3_TXFTCFG_SHIFT,
                threshold.bits() << LPUART_CR3_TXFTCFG_SHIFT,
            )
        });
        Ok(())
    }

    fn set_rx_fifo_threshold(&mut self, threshold: FifoThreshold) -> Result<(), HalError> {
        Self::while_disabled(|| {
            modify(
                LPUART1_BASE,
                LPUART_CR3,
                0b111 << LPUART_CR3_RXFTCFG_SHIFT,
                threshold.bits() << LPUART_CR3_RXFTCFG_SHIFT,
            )
        });
        Ok(())
    }

    fn enable_fifo_mode(&mut self) -> Result<(), HalError> {
        Self::while_disabled(|| set_bits(LPUART1_BASE, LPUART_CR1, LPUART_CR1_FIFOEN));
        Ok(())
    }

    fn disable_fifo_mode(&mut self) -> Result<(), HalError> {
        Self::while_disabled(|| clear_bits(LPUART1_BASE, LPUART_CR1, LPUART_CR1_FIFOEN));
        Ok(())
    }

    fn pins(&self) -> (GpioPort, u16) {
        LPUART1_PINS
    }
}

// ========================================
// Power modes
// ========================================

/// Stop 2 entry and the processor's interrupt mask
pub struct Stm32Power {
    scb: SCB,
    wake: &'static WakeFlags,
}

impl PowerControl for Stm32Power {
    fn enter_stop2(&mut self, entry: StopEntry) -> WakeSource {
        // Stale events must not be reported for this sleep
        let _ = self.wake.take();

        modify(PWR_BASE, PWR_CR1, PWR_CR1_LPMS_MASK, PWR_CR1_LPMS_STOP2);
        self.scb.set_sleepdeep();
        match entry {
            StopEntry::Wfi => cortex_m::asm::wfi(),
            StopEntry::Wfe => {
                cortex_m::asm::sev();
                cortex_m::asm::wfe();
                cortex_m::asm::wfe();
            }
        }
        self.scb.clear_sleepdeep();
        // Timeouts during the run clock restore count on the wake clock
        set_tick_rate(wake_hclk_hz());

        self.wake.take().unwrap_or(WakeSource::Other)
    }

    fn disable_interrupts(&mut self) {
        cortex_m::interrupt::disable();
    }

    fn halt(&mut self) -> ! {
        loop {
            cortex_m::asm::nop();
        }
    }
}

/// Complete STM32L4 HAL
pub struct Stm32l4Hal {
    clock: Stm32Clock,
    gpio: Stm32Gpio,
    rtc: Stm32Rtc,
    uart: Stm32Lpuart,
    power: Stm32Power,
}

impl Stm32l4Hal {
    /// Takes SysTick (time base) and SCB (sleep control). `wake` is the latch
    /// the RTC interrupt handlers write into.
    pub fn new(syst: SYST, scb: SCB, wake: &'static WakeFlags) -> Self {
        Self {
            clock: Stm32Clock::new(syst),
            gpio: Stm32Gpio,
            rtc: Stm32Rtc { ready: false },
            uart: Stm32Lpuart,
            power: Stm32Power { scb, wake },
        }
    }
}

impl PowerHal for Stm32l4Hal {
    type Clock = Stm32Clock;
    type Gpio = Stm32Gpio;
    type Rtc = Stm32Rtc;
    type Uart = Stm32Lpuart;
    type Power = Stm32Power;

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
