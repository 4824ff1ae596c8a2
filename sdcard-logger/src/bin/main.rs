// Exercises the SD card: size, file write and read back, directory create
// and delete.
//
// Pin map:
//   GPIO4 -> SCK
//   GPIO5 -> MOSI
//   GPIO8 <- MISO
//   GPIO7 -> CS

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
use esp32_peripherals::sdcard::{DummyTimesource, SdStorage, StorageError};
use esp_hal::clock::CpuClock;
use esp_hal::gpio::{Level, Output, OutputConfig};
use esp_hal::spi::master::{Config, Spi};
use esp_hal::spi::Mode;
use esp_hal::time::Rate;
use esp_hal::timer::systimer::SystemTimer;
use esp_println::{print, println};
use {esp_backtrace as _, esp_println as _};

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

const HELLO_PATH: &str = "HELLO.TXT";
const SCRATCH_DIR: &str = "SCRATCH";
const SCRATCH_FILE: &str = "TMP.TXT";

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

    let _ = spawner;

    println!("Init SD card controller and retrieve card size...");
    match SdStorage::open(SdCard::new(spi_dev, Delay), DummyTimesource::default()) {
        Ok(storage) => {
            println!("Card size is {} bytes", storage.card_size_bytes());

            match storage.write_file(HELLO_PATH, b"Hello from ESP32-C3!\n") {
                Ok(()) => info!("Appended to {}", HELLO_PATH),
                Err(e) => error!("Write failed: {}", e),
            }

            println!("--- {} ---", HELLO_PATH);
            match storage.read_file(HELLO_PATH, |chunk| {
                for b in chunk {
                    print!("{}", *b as char);
                }
            }) {
                Ok(len) => println!("--- {} bytes ---", len),
                Err(e) => error!("Read failed: {}", e),
            }

            if let Err(e) = storage.create_directory(SCRATCH_DIR) {
                warn!("Could not create {}: {}", SCRATCH_DIR, e);
            }
            match storage.directory_exists(SCRATCH_DIR) {
                Ok(exists) => info!("{} exists: {}", SCRATCH_DIR, exists),
                Err(e) => error!("Lookup failed: {}", e),
            }
            match storage.delete_directory(SCRATCH_DIR) {
                Ok(()) => info!("Removed {}", SCRATCH_DIR),
                Err(StorageError::Unsupported) => {
                    warn!("{} is empty but the FAT driver cannot remove directories", SCRATCH_DIR)
                }
                Err(e) => error!("Delete failed: {}", e),
            }

            let scratch_file = storage
                .write_file(SCRATCH_FILE, b"temporary\n")
                .and_then(|()| storage.delete_file(SCRATCH_FILE));
            match scratch_file {
                Ok(()) => info!("Created and deleted {}", SCRATCH_FILE),
                Err(e) => error!("Scratch file round trip failed: {}", e),
            }

            match storage.close() {
                Ok(_) => info!("SD card unmounted"),
                Err(e) => error!("Unmount failed: {}", e),
            }
        }
        Err(e) => error!("Failed to mount SD card: {}", e),
    }

    loop {
        Timer::after(Duration::from_secs(2)).await;
    }
}
