// Classifies BME688 gas resistance against labelled thresholds read from
// `GAS.CSV` on an SD card.
//
// Pin map:
//   GPIO4 -> SD SCK
//   GPIO5 -> SD MOSI
//   GPIO8 <- SD MISO
//   GPIO7 -> SD CS
//   GPIO6 <> BME688 SDA
//   GPIO10 -> BME688 SCL

#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]

use defmt::{error, info, warn};
use embassy_executor::Spawner;
use embassy_time::{Delay, Duration, Timer};
use embedded_hal_bus::spi::ExclusiveDevice;
use embedded_sdmmc::SdCard;
use esp32_peripherals::bme688::{self, Bme688};
use esp32_peripherals::gas::{GasClassifier, THRESHOLDS_FILE};
use esp32_peripherals::sdcard::{DummyTimesource, SdStorage};
use esp_hal::clock::CpuClock;
use esp_hal::gpio::{Level, Output, OutputConfig};
use esp_hal::i2c::master::{Config as I2cConfig, I2c};
use esp_hal::spi::master::{Config, Spi};
use esp_hal::spi::Mode;
use esp_hal::time::Rate;
use esp_hal::timer::systimer::SystemTimer;
use heapless::Vec;
use {esp_backtrace as _, esp_println as _};

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

const SAMPLE_PERIOD: Duration = Duration::from_secs(2);

// Ten rows of `num,resistance,label` fit comfortably.
const CSV_CAPACITY: usize = 640;

#[esp_hal_embassy::main]
async fn main(spawner: Spawner) {
    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    let timer0 = SystemTimer::new(peripherals.SYSTIMER);
    esp_hal_embassy::init(timer0.alarm0);

    info!("Embassy initialized!");

    let spi_config = Config::default()
        .with_frequency(Rate::from_khz(400))
        .with_mode(Mode::_0);
    let spi_bus = Spi::new(peripherals.SPI2, spi_config)
        .expect("SPI configuration is valid")
        .with_sck(peripherals.GPIO4)
        .with_mosi(peripherals.GPIO5)
        .with_miso(peripherals.GPIO8);

    let chip_select = Output::new(peripherals.GPIO7, Level::High, OutputConfig::default());
    let Ok(spi_dev) = ExclusiveDevice::new(spi_bus, chip_select, Delay);

    let mut classifier = GasClassifier::new();
    match SdStorage::open(SdCard::new(spi_dev, Delay), DummyTimesource::default()) {
        Ok(storage) => {
            let mut csv: Vec<u8, CSV_CAPACITY> = Vec::new();
            let read = storage.read_file(THRESHOLDS_FILE, |chunk| {
                let room = CSV_CAPACITY - csv.len();
                let _ = csv.extend_from_slice(&chunk[..chunk.len().min(room)]);
            });
            match read {
                Ok(len) if len > CSV_CAPACITY => {
                    warn!("{} is {} bytes, only the first {} are used", THRESHOLDS_FILE, len, CSV_CAPACITY)
                }
                Ok(_) => {}
                Err(e) => error!("Failed to read {}: {}", THRESHOLDS_FILE, e),
            }

            // Keep whatever decodes; a row cut by the capacity is dropped as malformed.
            let text = match core::str::from_utf8(&csv) {
                Ok(text) => text,
                Err(e) => core::str::from_utf8(&csv[..e.valid_up_to()]).unwrap_or_default(),
            };
            let loaded = classifier.load_csv(text);
            info!("Loaded {} gas thresholds", loaded);
            for t in classifier.thresholds() {
                info!("  #{}: {} Ohms -> {}", t.sample, t.resistance, t.label.as_str());
            }

            if let Err(e) = storage.close() {
                warn!("Unmount failed: {}", e);
            }
        }
        Err(e) => error!("SD card not available: {}", e),
    }

    let i2c = I2c::new(
        peripherals.I2C0,
        I2cConfig::default().with_frequency(Rate::from_khz(100)),
    )
    .expect("I2C configuration is valid")
    .with_sda(peripherals.GPIO6)
    .with_scl(peripherals.GPIO10);

    let mut sensor = match Bme688::new(i2c, esp_hal::delay::Delay::new(), bme688::Config::default()) {
        Ok(sensor) => sensor,
        Err(e) => {
            error!("BME688 init failed: {}", e);
            loop {
                Timer::after(Duration::from_secs(1)).await;
            }
        }
    };

    let _ = spawner;

    loop {
        match sensor.read_gas_resistance() {
            Ok(resistance) => info!(
                "Measured gas resistance: {} Ohms, Classified as: {}",
                resistance,
                classifier.classify(resistance)
            ),
            Err(e) => warn!("Gas reading failed: {}", e),
        }
        Timer::after(SAMPLE_PERIOD).await;
    }
}
