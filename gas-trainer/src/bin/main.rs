// Records labelled BME688 gas samples into `GAS.CSV` on an SD card, the file
// `gas-classifier` loads its thresholds from. Driven from a serial terminal:
// Enter takes a sample, the next line labels it, `exit` ends the session.
//
// Pin map:
//   GPIO4 -> SD SCK
//   GPIO5 -> SD MOSI
//   GPIO8 <- SD MISO
//   GPIO7 -> SD CS
//   GPIO6 <> BME688 SDA
//   GPIO10 -> BME688 SCL
//   GPIO20 <- console RX (UART0)
//   GPIO21 -> console TX (UART0)

#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]

use defmt::{error, info, warn};
use embassy_executor::Spawner;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::{Delay, Duration, Timer};
use embedded_hal_bus::spi::ExclusiveDevice;
use embedded_io_async::Read;
use embedded_sdmmc::{BlockDevice, SdCard, TimeSource};
use esp32_peripherals::bme688::{self, Bme688};
use esp32_peripherals::gas::{format_row, CSV_HEADER, MAX_THRESHOLDS, THRESHOLDS_FILE};
use esp32_peripherals::hc05::LineBuffer;
use esp32_peripherals::sdcard::{DummyTimesource, SdStorage, StorageError};
use esp_hal::clock::CpuClock;
use esp_hal::gpio::{Level, Output, OutputConfig};
use esp_hal::i2c::master::{Config as I2cConfig, I2c};
use esp_hal::spi::master::{Config, Spi};
use esp_hal::spi::Mode;
use esp_hal::time::Rate;
use esp_hal::timer::systimer::SystemTimer;
use esp_hal::uart::{Config as UartConfig, Uart, UartRx};
use esp_hal::Async;
use esp_println::{print, println};
use heapless::Vec;
use {esp_backtrace as _, esp_println as _};

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

const CONSOLE_BAUD: u32 = 115_200;
const LINE_LEN: usize = 64;
const EXIT_COMMAND: &str = "exit";

type Line = Vec<u8, LINE_LEN>;

static LINES: Channel<CriticalSectionRawMutex, Line, 4> = Channel::new();

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

fn forward(line: &[u8]) {
    let Ok(line) = Line::from_slice(line) else {
        return;
    };
    if LINES.try_send(line).is_err() {
        warn!("Console queue full, dropping a line");
    }
}

#[embassy_executor::task]
async fn console_task(mut rx: UartRx<'static, Async>) {
    let mut lines: LineBuffer<LINE_LEN> = LineBuffer::new();
    let mut buf = [0u8; LINE_LEN];

    loop {
        match Read::read(&mut rx, &mut buf).await {
            Ok(n) => lines.feed(&buf[..n], forward),
            Err(e) => warn!("Console read error: {}", e),
        }
    }
}

#[esp_hal_embassy::main]
async fn main(spawner: Spawner) {
    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    let timer0 = SystemTimer::new(peripherals.SYSTIMER);
    esp_hal_embassy::init(timer0.alarm0);

    info!("Embassy initialized!");

    let uart = Uart::new(
        peripherals.UART0,
        UartConfig::default().with_baudrate(CONSOLE_BAUD),
    )
    .expect("UART configuration is valid")
    .with_rx(peripherals.GPIO20)
    .with_tx(peripherals.GPIO21)
    .into_async();
    let (rx, _tx) = uart.split();
    spawner.spawn(console_task(rx)).unwrap();

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

    let storage = match SdStorage::open(SdCard::new(spi_dev, Delay), DummyTimesource::default()) {
        Ok(storage) => storage,
        Err(e) => {
            error!("Failed to mount SD card: {}", e);
            park().await
        }
    };

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

    // Every session starts a fresh file.
    match storage.delete_file(THRESHOLDS_FILE) {
        Ok(()) => info!("Replacing the previous {}", THRESHOLDS_FILE),
        Err(StorageError::Fs(embedded_sdmmc::Error::NotFound)) => {}
        Err(e) => {
            error!("Cannot remove old {}: {}", THRESHOLDS_FILE, e);
            unmount(storage);
            park().await
        }
    }
    if let Err(e) = storage.write_file(THRESHOLDS_FILE, CSV_HEADER.as_bytes()) {
        error!("Cannot create {}: {}", THRESHOLDS_FILE, e);
        unmount(storage);
        park().await
    }

    println!("Gas density training mode.");
    println!("Press Enter to record a sample, then type its label (e.g. air, CO2, ethanol).");
    println!("Type '{}' as the label to finish.", EXIT_COMMAND);

    let mut samples: u32 = 0;
    loop {
        println!("Press Enter to record sample #{}...", samples + 1);
        let _ = LINES.receive().await;

        let reading = match sensor.start_forced() {
            Ok(()) => {
                Timer::after(Duration::from_millis(u64::from(sensor.forced_wait_ms()))).await;
                sensor.read_forced()
            }
            Err(e) => Err(e),
        };
        let resistance = match reading {
            Ok(m) => m.gas_resistance,
            Err(e) => {
                warn!("Gas reading failed: {}", e);
                continue;
            }
        };
        println!("Measured gas resistance: {:.2} Ohms", resistance);

        println!("Enter label for this sample (or '{}' to finish):", EXIT_COMMAND);
        let line = LINES.receive().await;
        let Ok(text) = core::str::from_utf8(&line) else {
            warn!("Label is not valid UTF-8, sample discarded");
            continue;
        };
        let label = text.trim();
        if label == EXIT_COMMAND {
            break;
        }

        let Some(row) = format_row(samples + 1, resistance, label) else {
            warn!("Empty label, sample discarded");
            continue;
        };
        match storage.write_file(THRESHOLDS_FILE, row.as_bytes()) {
            Ok(()) => {
                samples += 1;
                print!("Sample {}: {}", samples, row.as_str());
                if samples as usize == MAX_THRESHOLDS + 1 {
                    warn!("gas-classifier only loads the first {} samples", MAX_THRESHOLDS);
                }
            }
            Err(e) => error!("Failed to save sample: {}", e),
        }
    }

    println!("Sampling finished. {} samples saved to {}", samples, THRESHOLDS_FILE);
    unmount(storage);

    park().await
}
