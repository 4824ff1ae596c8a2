// Blinks an LED on GPIO8 (the ESP32-C3 DevKit onboard LED).
//
// Pin map:
//   GPIO8 -> LED (active high)

#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]

use defmt::info;
use esp32_peripherals::gpio::Led;
use esp_hal::clock::CpuClock;
use esp_hal::gpio::{Level, Output, OutputConfig};
use esp_hal::main;
use esp_hal::time::Duration;
use esp_hal::timer::timg::TimerGroup;
use esp_hal::timer::Timer;
use {esp_backtrace as _, esp_println as _};

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

const BLINK_PERIOD: Duration = Duration::from_millis(500);

#[main]
fn main() -> ! {
    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::_80MHz);
    let peripherals = esp_hal::init(config);

    let mut led = Led::new(Output::new(
        peripherals.GPIO8,
        Level::Low,
        OutputConfig::default(),
    ));

    // Timer group 0 acts as the time base for the toggle.
    let timer_group_0 = TimerGroup::new(peripherals.TIMG0);
    let timer = timer_group_0.timer0;
    timer.start();
    let mut start = timer.now();

    info!("Blinking every {} ms", BLINK_PERIOD.as_millis());

    loop {
        if start.elapsed() >= BLINK_PERIOD {
            let Ok(()) = led.toggle();
            start = timer.now();
        }
    }
}
