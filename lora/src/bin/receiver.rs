// QwiicRF node 0x01: polls for packets and hex-dumps everything that is not
// idle-line noise.
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

use defmt::{error, info, warn};
use embassy_executor::Spawner;
use embassy_time::{Duration, Timer};
use esp32_peripherals::qwiicrf::{is_noise, HexDump, QwiicRf, MAX_FRAME};
use esp_hal::clock::CpuClock;
use esp_hal::i2c::master::{Config as I2cConfig, I2c};
use esp_hal::time::Rate;
use esp_hal::timer::systimer::SystemTimer;
use esp_println::println;
use {esp_backtrace as _, esp_println as _};

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

const OWN_ADDRESS: u8 = 0x01;
const POLL_INTERVAL: Duration = Duration::from_millis(1);

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

    let mut radio = QwiicRf::new(i2c);
    radio.init();

    if let Err(e) = radio.set_rf_address(OWN_ADDRESS) {
        error!("QwiicRF init failed: {}", e);
        loop {
            Timer::after(Duration::from_secs(1)).await;
        }
    }
    match radio.rf_address() {
        Ok(address) => info!("QwiicRF listening as {:#x}", address),
        Err(e) => warn!("Could not read back RF address: {}", e),
    }

    let _ = spawner;

    let mut buf = [0u8; MAX_FRAME];
    loop {
        match radio.read_packet(&mut buf) {
            Ok(0) => {}
            Ok(n) if is_noise(&buf[..n]) => {}
            Ok(n) => {
                let sender = radio.packet_sender().unwrap_or(0);
                println!("From 0x{:02X}: {}", sender, HexDump(&buf[..n]));
            }
            Err(e) => warn!("Read failed: {}", e),
        }
        Timer::after(POLL_INTERVAL).await;
    }
}
