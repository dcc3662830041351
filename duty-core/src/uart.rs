//! LPUART1 setup

use crate::error::{FatalInitError, InitStage};
use crate::hal::{HalError, UartControl};

/// Lowest BRR value the LPUART accepts
pub const LPUART_BRR_MIN: u32 = 0x300;
/// BRR is 20 bits wide
pub const LPUART_BRR_MAX: u32 = 0xF_FFFF;

/// Data bits per frame, parity included
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WordLength {
    Bits7,
    Bits8,
    Bits9,
}

impl WordLength {
    /// CR1 (M1, M0)
    pub const fn m_bits(&self) -> (bool, bool) {
        match self {
            WordLength::Bits7 => (true, false),
            WordLength::Bits8 => (false, false),
            WordLength::Bits9 => (false, true),
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StopBits {
    One,
    Two,
}

impl StopBits {
    /// CR2.STOP encoding; LPUART only supports 1 and 2
    pub const fn bits(&self) -> u32 {
        match self {
            StopBits::One => 0b00,
            StopBits::Two => 0b10,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Parity {
    None,
    Even,
    Odd,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UartMode {
    Rx,
    Tx,
    TxRx,
}

impl UartMode {
    pub const fn tx(&self) -> bool {
        matches!(self, UartMode::Tx | UartMode::TxRx)
    }

    pub const fn rx(&self) -> bool {
        matches!(self, UartMode::Rx | UartMode::TxRx)
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlowControl {
    None,
    Rts,
    Cts,
    RtsCts,
}

/// FIFO fill level that raises the threshold flag
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FifoThreshold {
    Eighth,
    Quarter,
    Half,
    ThreeQuarters,
    SevenEighths,
    Full,
}

impl FifoThreshold {
    /// CR3.TXFTCFG / CR3.RXFTCFG encoding
    pub const fn bits(&self) -> u32 {
        *self as u32
    }
}

/// Kernel clock prescaler (PRESC register)
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UartPrescaler {
    Div1,
    Div2,
    Div4,
    Div6,
    Div8,
    Div10,
    Div12,
    Div16,
    Div32,
    Div64,
    Div128,
    Div256,
}

impl UartPrescaler {
    pub const fn bits(&self) -> u32 {
        *self as u32
    }

    pub const fn divisor(&self) -> u32 {
        match self {
            UartPrescaler::Div1 => 1,
            UartPrescaler::Div2 => 2,
            UartPrescaler::Div4 => 4,
            UartPrescaler::Div6 => 6,
            UartPrescaler::Div8 => 8,
            UartPrescaler::Div10 => 10,
            UartPrescaler::Div12 => 12,
            UartPrescaler::Div16 => 16,
            UartPrescaler::Div32 => 32,
            UartPrescaler::Div64 => 64,
            UartPrescaler::Div128 => 128,
            UartPrescaler::Div256 => 256,
        }
    }
}

/// LPUART1 line settings
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UartConfig {
    pub baud_rate: u32,
    pub word_length: WordLength,
    pub stop_bits: StopBits,
    pub parity: Parity,
    pub mode: UartMode,
    pub flow_control: FlowControl,
    pub one_bit_sampling: bool,
    pub prescaler: UartPrescaler,
    pub tx_threshold: FifoThreshold,
    pub rx_threshold: FifoThreshold,
    /// Leave FIFO mode on after setting the thresholds
    pub fifo_mode: bool,
}

impl Default for UartConfig {
    fn default() -> Self {
        Self {
            baud_rate: 209_700,
            word_length: WordLength::Bits7,
            stop_bits: StopBits::One,
            parity: Parity::None,
            mode: UartMode::TxRx,
            flow_control: FlowControl::None,
            one_bit_sampling: false,
            prescaler: UartPrescaler::Div1,
            tx_threshold: FifoThreshold::Eighth,
            rx_threshold: FifoThreshold::Eighth,
            fifo_mode: false,
        }
    }
}

impl UartConfig {
    /// BRR value for kernel clock `fck_hz`: 256 × fck / baud.
    /// The baud rate must lie within [fck/4096, fck/3].
    pub fn brr(&self, fck_hz: u32) -> Result<u32, HalError> {
        let clk = (fck_hz / self.prescaler.divisor()) as u64;
        let baud = self.baud_rate as u64;
        if baud == 0 || baud * 3 > clk || baud * 4096 < clk {
            return Err(HalError::InvalidConfig);
        }
        let brr = (clk * 256 + baud / 2) / baud;
        if !(LPUART_BRR_MIN as u64..=LPUART_BRR_MAX as u64).contains(&brr) {
            return Err(HalError::InvalidConfig);
        }
        Ok(brr as u32)
    }
}

/// Init, FIFO thresholds, then FIFO mode as configured (off by default,
/// which leaves the thresholds without effect)
pub fn configure_lpuart<U: UartControl>(uart: &mut U, config: &UartConfig) -> Result<(), FatalInitError> {
    let tag = FatalInitError::at(InitStage::Uart);
    uart.init(config).map_err(&tag)?;
    uart.set_tx_fifo_threshold(config.tx_threshold).map_err(&tag)?;
    uart.set_rx_fifo_threshold(config.rx_threshold).map_err(&tag)?;
    if config.fifo_mode {
        uart.enable_fifo_mode().map_err(&tag)?;
    } else {
        uart.disable_fifo_mode().map_err(&tag)?;
    }
    debug!("LPUART1: {} baud", config.baud_rate);
    Ok(())
}
