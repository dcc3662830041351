//! Nucleo-L4R5ZI board map: status LEDs and oscillator frequencies

use core::convert::Infallible;

use duty_core::hal::{EmbeddedHalLed, HalError, StatusLed};
use duty_core::types::GpioPort;
use duty_core::wakeup::LSE_HZ;
use embedded_hal::digital::{ErrorType, OutputPin};

use crate::regs::*;

/// HSE frequency on the board
pub const HSE_HZ: u32 = 8_000_000;

/// The RTC runs from the 32.768 kHz LSE crystal
pub const RTC_CLOCK_HZ: u32 = LSE_HZ;

/// LED1 (green), run mode
pub const LED1: (GpioPort, u8) = (GpioPort::C, 7);
/// LED2 (blue), fatal error
pub const LED2: (GpioPort, u8) = (GpioPort::B, 7);

/// LPUART1 TX/RX: PG7, PG8 on AF8
pub const LPUART1_PINS: (GpioPort, u16) = (GpioPort::G, (1 << 7) | (1 << 8));
pub const LPUART1_AF: u32 = 8;

/// One push-pull output pin, driven through BSRR
pub struct BoardPin {
    base: u32,
    port: GpioPort,
    pin: u8,
}

impl BoardPin {
    pub const fn new(port: GpioPort, pin: u8) -> Self {
        Self {
            base: gpio_base(port.index()),
            port,
            pin,
        }
    }

    /// Port clock on, pin to push-pull output. Needed again after every
    /// quiesce, which gates the clock and leaves the pin analog.
    pub fn configure_output(&mut self) {
        set_bits(RCC_BASE, RCC_AHB2ENR, 1 << self.port.index());
        let shift = self.pin as u32 * 2;
        modify(self.base, GPIO_MODER, 0b11 << shift, GPIO_MODE_OUTPUT << shift);
        clear_bits(self.base, GPIO_OTYPER, 1 << self.pin);
        clear_bits(self.base, GPIO_PUPDR, 0b11 << shift);
    }
}

impl ErrorType for BoardPin {
    type Error = Infallible;
}

impl OutputPin for BoardPin {
    fn set_high(&mut self) -> Result<(), Self::Error> {
        write(self.base, GPIO_BSRR, 1 << self.pin);
        Ok(())
    }

    fn set_low(&mut self) -> Result<(), Self::Error> {
        write(self.base, GPIO_BSRR, 1 << (self.pin as u32 + 16));
        Ok(())
    }
}

/// Active-high board LED
pub struct BoardLed {
    led: EmbeddedHalLed<BoardPin>,
}

impl BoardLed {
    pub fn new((port, pin): (GpioPort, u8)) -> Self {
        Self {
            led: EmbeddedHalLed::new(BoardPin::new(port, pin), false),
        }
    }

    pub fn led1() -> Self {
        Self::new(LED1)
    }

    pub fn led2() -> Self {
        Self::new(LED2)
    }
}

impl StatusLed for BoardLed {
    fn init(&mut self) -> Result<(), HalError> {
        self.led.pin_mut().configure_output();
        self.led.init()
    }

    fn set(&mut self, on: bool) -> Result<(), HalError> {
        self.led.set(on)
    }
}
