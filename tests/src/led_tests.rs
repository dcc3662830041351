//! Status LED driver on embedded-hal output pins

use core::convert::Infallible;

use duty_core::{EmbeddedHalLed, HalError, StatusLed};
use embedded_hal::digital::{ErrorKind, ErrorType, OutputPin};
use embedded_hal_mock::eh1::pin::{Mock as PinMock, State as PinState, Transaction as PinTransaction};

/// Output pin whose writes always fail
struct BrokenPin;

impl ErrorType for BrokenPin {
    type Error = ErrorKind;
}

impl OutputPin for BrokenPin {
    fn set_high(&mut self) -> Result<(), Self::Error> {
        Err(ErrorKind::Other)
    }

    fn set_low(&mut self) -> Result<(), Self::Error> {
        Err(ErrorKind::Other)
    }
}

/// Pin that only remembers its level
#[derive(Default)]
struct LevelPin {
    high: bool,
}

impl ErrorType for LevelPin {
    type Error = Infallible;
}

impl OutputPin for LevelPin {
    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.high = true;
        Ok(())
    }

    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.high = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_high_led_levels() {
        let expectations = [
            PinTransaction::set(PinState::Low),
            PinTransaction::set(PinState::High),
            PinTransaction::set(PinState::Low),
        ];
        let mut led = EmbeddedHalLed::new(PinMock::new(&expectations), false);

        led.init().unwrap();
        assert!(!led.is_lit());
        led.on().unwrap();
        assert!(led.is_lit());
        led.off().unwrap();
        assert!(!led.is_lit());

        led.release().done();
    }

    #[test]
    fn test_active_low_led_levels() {
        let expectations = [
            PinTransaction::set(PinState::High),
            PinTransaction::set(PinState::Low),
        ];
        let mut led = EmbeddedHalLed::new(PinMock::new(&expectations), true);

        led.init().unwrap();
        led.on().unwrap();
        assert!(led.is_lit());

        led.release().done();
    }

    #[test]
    fn test_pin_error_maps_to_gpio_error() {
        let mut led = EmbeddedHalLed::new(BrokenPin, false);
        assert_eq!(led.init(), Err(HalError::GpioError));
        assert_eq!(led.on(), Err(HalError::GpioError));
        // A failed write leaves the recorded state alone
        assert!(!led.is_lit());
    }

    #[test]
    fn test_pin_mut_reaches_the_pin() {
        let mut led = EmbeddedHalLed::new(LevelPin::default(), false);
        led.on().unwrap();
        assert!(led.pin_mut().high);
        led.off().unwrap();
        assert!(!led.release().high);
    }
}
