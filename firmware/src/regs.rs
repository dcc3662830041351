//! STM32L4 register map and volatile access helpers

// ========================================
// Base addresses
// ========================================

pub const RCC_BASE: u32 = 0x4002_1000;
pub const PWR_BASE: u32 = 0x4000_7000;
pub const FLASH_BASE: u32 = 0x4002_2000;
pub const RTC_BASE: u32 = 0x4000_2800;
pub const EXTI_BASE: u32 = 0x4001_0400;
pub const LPUART1_BASE: u32 = 0x4000_8000;
pub const GPIOA_BASE: u32 = 0x4800_0000;
/// Distance between two GPIO ports
pub const GPIO_STRIDE: u32 = 0x400;

// ========================================
// RCC
// ========================================

pub const RCC_CR: u32 = 0x00;
pub const RCC_CFGR: u32 = 0x08;
pub const RCC_AHB2ENR: u32 = 0x4C;
pub const RCC_APB1ENR1: u32 = 0x58;
pub const RCC_APB1ENR2: u32 = 0x5C;
pub const RCC_CCIPR: u32 = 0x88;
pub const RCC_BDCR: u32 = 0x90;

pub const RCC_CR_HSEON: u32 = 1 << 16;
pub const RCC_CR_HSERDY: u32 = 1 << 17;
pub const RCC_CR_HSEBYP: u32 = 1 << 18;
pub const RCC_CR_PLLON: u32 = 1 << 24;
pub const RCC_CR_PLLRDY: u32 = 1 << 25;

pub const RCC_CFGR_SW_MASK: u32 = 0b11;
pub const RCC_CFGR_SWS_SHIFT: u32 = 2;
pub const RCC_CFGR_HPRE_SHIFT: u32 = 4;
pub const RCC_CFGR_PPRE1_SHIFT: u32 = 8;
pub const RCC_CFGR_PPRE2_SHIFT: u32 = 11;
pub const RCC_CFGR_STOPWUCK: u32 = 1 << 15;

pub const RCC_APB1ENR1_RTCAPBEN: u32 = 1 << 10;
pub const RCC_APB1ENR1_PWREN: u32 = 1 << 28;
pub const RCC_APB1ENR2_LPUART1EN: u32 = 1 << 0;

/// LPUART1SEL = PCLK1
pub const RCC_CCIPR_LPUART1SEL_MASK: u32 = 0b11 << 10;

pub const RCC_BDCR_LSEON: u32 = 1 << 0;
pub const RCC_BDCR_LSERDY: u32 = 1 << 1;
pub const RCC_BDCR_LSEDRV_SHIFT: u32 = 3;
pub const RCC_BDCR_LSEDRV_MASK: u32 = 0b11 << 3;
pub const RCC_BDCR_RTCSEL_MASK: u32 = 0b11 << 8;
pub const RCC_BDCR_RTCSEL_LSE: u32 = 0b01 << 8;
pub const RCC_BDCR_RTCEN: u32 = 1 << 15;

// ========================================
// PWR / FLASH
// ========================================

pub const PWR_CR1: u32 = 0x00;
pub const PWR_CR2: u32 = 0x04;
pub const PWR_SR2: u32 = 0x14;

pub const PWR_CR1_LPMS_MASK: u32 = 0b111;
pub const PWR_CR1_LPMS_STOP2: u32 = 0b010;
pub const PWR_CR1_DBP: u32 = 1 << 8;
pub const PWR_CR1_VOS_SHIFT: u32 = 9;
pub const PWR_CR1_VOS_MASK: u32 = 0b11 << 9;
pub const PWR_CR2_IOSV: u32 = 1 << 9;
pub const PWR_SR2_VOSF: u32 = 1 << 10;

pub const FLASH_ACR: u32 = 0x00;
pub const FLASH_ACR_LATENCY_MASK: u32 = 0b1111;

// ========================================
// GPIO
// ========================================

pub const GPIO_MODER: u32 = 0x00;
pub const GPIO_OTYPER: u32 = 0x04;
pub const GPIO_PUPDR: u32 = 0x0C;
pub const GPIO_BSRR: u32 = 0x18;
pub const GPIO_AFRL: u32 = 0x20;
pub const GPIO_AFRH: u32 = 0x24;

pub const GPIO_MODE_OUTPUT: u32 = 0b01;
pub const GPIO_MODE_AF: u32 = 0b10;
pub const GPIO_MODE_ANALOG: u32 = 0b11;

// ========================================
// RTC
// ========================================

pub const RTC_TR: u32 = 0x00;
pub const RTC_DR: u32 = 0x04;
pub const RTC_CR: u32 = 0x08;
pub const RTC_ISR: u32 = 0x0C;
pub const RTC_PRER: u32 = 0x10;
pub const RTC_WUTR: u32 = 0x14;
pub const RTC_ALRMAR: u32 = 0x1C;
pub const RTC_ALRMBR: u32 = 0x20;
pub const RTC_WPR: u32 = 0x24;
pub const RTC_TAMPCR: u32 = 0x40;
pub const RTC_ALRMASSR: u32 = 0x44;
pub const RTC_ALRMBSSR: u32 = 0x48;
pub const RTC_OR: u32 = 0x4C;

pub const RTC_CR_WUCKSEL_MASK: u32 = 0b111;
pub const RTC_CR_FMT: u32 = 1 << 6;
pub const RTC_CR_ALRAE: u32 = 1 << 8;
pub const RTC_CR_ALRBE: u32 = 1 << 9;
pub const RTC_CR_WUTE: u32 = 1 << 10;
pub const RTC_CR_ALRAIE: u32 = 1 << 12;
pub const RTC_CR_ALRBIE: u32 = 1 << 13;
pub const RTC_CR_WUTIE: u32 = 1 << 14;
pub const RTC_CR_BKP: u32 = 1 << 18;
pub const RTC_CR_POL: u32 = 1 << 20;
pub const RTC_CR_OSEL_SHIFT: u32 = 21;
pub const RTC_CR_OSEL_MASK: u32 = 0b11 << 21;
pub const RTC_CR_ADD1H: u32 = 1 << 16;
pub const RTC_CR_SUB1H: u32 = 1 << 17;

pub const RTC_ISR_ALRAWF: u32 = 1 << 0;
pub const RTC_ISR_ALRBWF: u32 = 1 << 1;
pub const RTC_ISR_WUTWF: u32 = 1 << 2;
pub const RTC_ISR_INITF: u32 = 1 << 6;
pub const RTC_ISR_INIT: u32 = 1 << 7;
pub const RTC_ISR_ALRAF: u32 = 1 << 8;
pub const RTC_ISR_ALRBF: u32 = 1 << 9;
pub const RTC_ISR_WUTF: u32 = 1 << 10;
pub const RTC_ISR_TSF: u32 = 1 << 11;
pub const RTC_ISR_TAMP1F: u32 = 1 << 13;

pub const RTC_OR_ALARMOUTTYPE: u32 = 1 << 0;
pub const RTC_OR_OUT_RMP: u32 = 1 << 1;

/// Write-protection unlock keys
pub const RTC_WPR_KEY1: u32 = 0xCA;
pub const RTC_WPR_KEY2: u32 = 0x53;
pub const RTC_WPR_LOCK: u32 = 0xFF;

// ========================================
// EXTI
// ========================================

pub const EXTI_IMR1: u32 = 0x00;
pub const EXTI_RTSR1: u32 = 0x08;
pub const EXTI_PR1: u32 = 0x14;

pub const EXTI_LINE_RTC_ALARM: u32 = 1 << 18;
pub const EXTI_LINE_RTC_TAMP: u32 = 1 << 19;
pub const EXTI_LINE_RTC_WAKEUP: u32 = 1 << 20;

// ========================================
// LPUART1
// ========================================

pub const LPUART_CR1: u32 = 0x00;
pub const LPUART_CR2: u32 = 0x04;
pub const LPUART_CR3: u32 = 0x08;
pub const LPUART_BRR: u32 = 0x0C;
pub const LPUART_PRESC: u32 = 0x2C;

pub const LPUART_CR1_UE: u32 = 1 << 0;
pub const LPUART_CR1_RE: u32 = 1 << 2;
pub const LPUART_CR1_TE: u32 = 1 << 3;
pub const LPUART_CR1_PS: u32 = 1 << 9;
pub const LPUART_CR1_PCE: u32 = 1 << 10;
pub const LPUART_CR1_M0: u32 = 1 << 12;
pub const LPUART_CR1_M1: u32 = 1 << 28;
pub const LPUART_CR1_FIFOEN: u32 = 1 << 29;
pub const LPUART_CR2_STOP_SHIFT: u32 = 12;
pub const LPUART_CR3_RTSE: u32 = 1 << 8;
pub const LPUART_CR3_CTSE: u32 = 1 << 9;
pub const LPUART_CR3_RXFTCFG_SHIFT: u32 = 25;
pub const LPUART_CR3_TXFTCFG_SHIFT: u32 = 29;

// ========================================
// Access
// ========================================

#[inline(always)]
pub fn read(base: u32, offset: u32) -> u32 {
    unsafe { core::ptr::read_volatile((base + offset) as *const u32) }
}

#[inline(always)]
pub fn write(base: u32, offset: u32, value: u32) {
    unsafe { core::ptr::write_volatile((base + offset) as *mut u32, value) }
}

/// Read-modify-write: clear `clear`, then set `set`
#[inline(always)]
pub fn modify(base: u32, offset: u32, clear: u32, set: u32) {
    let value = read(base, offset);
    write(base, offset, (value & !clear) | set);
}

#[inline(always)]
pub fn set_bits(base: u32, offset: u32, bits: u32) {
    modify(base, offset, 0, bits);
}

#[inline(always)]
pub fn clear_bits(base: u32, offset: u32, bits: u32) {
    modify(base, offset, bits, 0);
}

/// Base address of GPIO port `index` (A = 0)
pub const fn gpio_base(index: usize) -> u32 {
    GPIOA_BASE + GPIO_STRIDE * index as u32
}
