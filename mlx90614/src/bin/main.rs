// Reads an MLX90614 infrared thermometer once per second.
//
// Pin map:
//   GPIO6 <> SDA
//   GPIO7 -> SCL

#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]

use defmt::{info, warn};
use embassy_executor::Spawner;
use embassy_time::{Duration, Timer};
use esp32_peripherals::mlx90614::{self, Mlx90614};
use esp_hal::clock::CpuClock;
use esp_hal::i2c::master::{Config as I2cConfig, I2c};
use esp_hal::time::Rate;
use esp_hal::timer::systimer::SystemTimer;
use {esp_backtrace as _, esp_println as _};

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

// SMBus tops out at 100 kHz.
const I2C_FREQUENCY: Rate = Rate::from_khz(100);

#[esp_hal_embassy::main]
async fn main(spawner: Spawner) {
    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    let timer0 = SystemTimer::new(peripherals.SYSTIMER);
    esp_hal_embassy::init(timer0.alarm0);

    info!("Embassy initialized!");

    let i2c = I2c::new(
        peripherals.I2C0,
        I2cConfig::default().with_frequency(I2C_FREQUENCY),
    )
    .expect("I2C configuration is valid")
    .with_sda(peripherals.GPIO6)
    .with_scl(peripherals.GPIO7);

    let mut sensor = Mlx90614::new(i2c, mlx90614::Config::default());

    let _ = spawner;

    loop {
        match sensor.ambient_temperature() {
            Ok(t) => info!("Ambient Temp: {} C", t),
            Err(e) => warn!("Ambient read failed: {}", e),
        }
        match sensor.object_temperature() {
            Ok(t) => info!("Object Temp: {} C", t),
            Err(e) => warn!("Object read failed: {}", e),
        }

        Timer::after(Duration::from_secs(1)).await;
    }
}
