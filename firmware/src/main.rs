#![no_std]
#![no_main]

#[cfg(feature = "defmt")]
use defmt_rtt as _;

// Panic handler
#[cfg(feature = "defmt")]
use panic_probe as _;
#[cfg(not(feature = "defmt"))]
use panic_halt as _;

use cortex_m_rt::entry;

use stop2_firmware::*;

mod time_driver;
mod vectors;

use vectors::WAKE;

/// Firmware entry point: boot the clocks and peripherals, then cycle
/// between Run and Stop 2 forever
#[entry]
fn main() -> ! {
    #[cfg(feature = "defmt")]
    defmt::info!("stop2 duty-cycle firmware v{}", VERSION);

    let Some(cp) = cortex_m::Peripherals::take() else {
        loop {
            cortex_m::asm::nop();
        }
    };

    let hal = Stm32l4Hal::new(cp.SYST, cp.SCB, &WAKE);
    let config = default_config().with_wakeup_source_hz(RTC_CLOCK_HZ);

    #[cfg(feature = "defmt")]
    defmt::info!(
        "wakeup every {} ms, sysclk {} Hz",
        config.wakeup.interval().as_millis(),
        config.run_clock.sysclk_hz()
    );

    PowerController::new(hal, BoardLed::led1(), BoardLed::led2(), config).run()
}
