// Forced-mode BME688 readings every two seconds.
//
// Pin map:
//   GPIO6 <> SDA
//   GPIO7 -> SCL
//   SDO tied high (address 0x77)

#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]

use defmt::{error, info, warn};
use embassy_executor::Spawner;
use embassy_time::{Duration, Timer};
use esp32_peripherals::bme688::{self, Bme688};
use esp_hal::clock::CpuClock;
use esp_hal::delay::Delay;
use esp_hal::i2c::master::{Config as I2cConfig, I2c};
use esp_hal::time::Rate;
use esp_hal::timer::systimer::SystemTimer;
use {esp_backtrace as _, esp_println as _};

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

const SAMPLE_PERIOD: Duration = Duration::from_secs(2);

#[esp_hal_embassy::main]
async fn main(spawner: Spawner) {
    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    let timer0 = SystemTimer::new(peripherals.SYSTIMER);
    esp_hal_embassy::init(timer0.alarm0);

    info!("Embassy initialized!");

    let i2c = I2c::new(
        peripherals.I2C0,
        I2cConfig::default().with_frequency(Rate::from_khz(100)),
    )
    .expect("I2C configuration is valid")
    .with_sda(peripherals.GPIO6)
    .with_scl(peripherals.GPIO7);

    let sensor_config = bme688::Config::default();
    info!(
        "Heater {} C for {} ms, forced wait {} ms",
        sensor_config.heater_temp_c,
        sensor_config.heater_ms,
        sensor_config.forced_wait_ms()
    );

    let mut sensor = match Bme688::new(i2c, Delay::new(), sensor_config) {
        Ok(sensor) => sensor,
        Err(e) => {
            error!("BME688 init failed: {}", e);
            loop {
                Timer::after(Duration::from_secs(1)).await;
            }
        }
    };
    info!("BME688 found ({})", sensor.variant());

    let _ = spawner;

    loop {
        match sensor.measure() {
            Ok(m) => {
                info!("Temperature: {} C", m.temperature);
                info!("Pressure: {} hPa", m.pressure_hpa());
                info!("Humidity: {} %", m.humidity);
                info!("Gas Resistance: {} Ohms", m.gas_resistance);
                if !m.gas_valid || !m.heater_stable {
                    warn!(
                        "Gas reading unreliable (valid: {}, heater stable: {})",
                        m.gas_valid, m.heater_stable
                    );
                }
            }
            Err(e) => warn!("Measurement failed: {}", e),
        }

        Timer::after(SAMPLE_PERIOD).await;
    }
}
