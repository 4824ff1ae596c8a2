// Appends ten BME688 readings, one per second, to `logs/log.txt` on an SD
// card and unmounts it.
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
use embassy_time::{Delay, Duration, Instant, Timer};
use embedded_hal_bus::spi::ExclusiveDevice;
use embedded_sdmmc::{BlockDevice, SdCard, TimeSource};
use esp32_peripherals::bme688::{self, Bme688};
use esp32_peripherals::recorder::{Recorder, RECORD_COUNT, RECORD_INTERVAL_MS};
use esp32_peripherals::sdcard::{DummyTimesource, SdStorage};
use esp_hal::clock::CpuClock;
use esp_hal::gpio::{Level, Output, OutputConfig};
use esp_hal::i2c::master::{Config as I2cConfig, I2c};
use esp_hal::spi::master::{Config, Spi};
use esp_hal::spi::Mode;
use esp_hal::time::Rate;
use esp_hal::timer::systimer::SystemTimer;
use {esp_backtrace as _, esp_println as _};

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

async fn park() -> ! {
    loop {
        Timer::after(Duration::from_secs(2)).await;
    }
}

fn unmount<D: BlockDevice, T: TimeSource>(storage: SdStorage<D, T>) {
    match storage.close() {
        Ok(_) => info!("SD card unmounted"),
        Err(e) => error!("Failed to unmount SD card: {}", e),
    }
}

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

    let mut storage = match SdStorage::open(SdCard::new(spi_dev, Delay), DummyTimesource::default()) {
        Ok(storage) => storage,
        Err(e) => {
            error!("Failed to mount SD card: {}", e);
            park().await
        }
    };
    info!("SD card mounted, {} bytes", storage.card_size_bytes());

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
            unmount(storage);
            park().await
        }
    };

    // Health check before anything is written.
    if let Err(e) = sensor.measure() {
        error!("Initial BME688 measurement failed: {}", e);
        unmount(storage);
        park().await
    }

    let mut recorder = Recorder::prepare(&mut storage);
    info!("Logging to {}", recorder.path());

    let _ = spawner;

    for _ in 0..RECORD_COUNT {
        match sensor.measure() {
            Ok(m) => {
                let now = Instant::now().as_millis();
                match recorder.record(&mut storage, now, &m) {
                    Ok(()) => info!("Record {} written at {} ms", recorder.written(), now),
                    Err(e) => warn!("Failed to write record: {}", e),
                }
            }
            Err(e) => warn!("Skipping record: {}", e),
        }
        Timer::after(Duration::from_millis(RECORD_INTERVAL_MS)).await;
    }

    info!("{} of {} records written", recorder.written(), RECORD_COUNT);
    unmount(storage);

    park().await
}
