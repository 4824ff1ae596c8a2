// QwiicRF node 0x02: once a second sends a paired packet and an addressed
// packet to node 0x01.
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
use esp32_peripherals::qwiicrf::QwiicRf;
use esp_hal::clock::CpuClock;
use esp_hal::i2c::master::{Config as I2cConfig, I2c};
use esp_hal::time::Rate;
use esp_hal::timer::systimer::SystemTimer;
use {esp_backtrace as _, esp_println as _};

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

const OWN_ADDRESS: u8 = 0x02;
const PEER_ADDRESS: u8 = 0x01;
const SEND_PERIOD: Duration = Duration::from_secs(1);

const PAIRED_MESSAGE: &[u8] = b"Hello from ESP32";
const DIRECT_MESSAGE: &[u8] = b"Hi 0x01 from 0x02";

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

    let setup = radio
        .set_rf_address(OWN_ADDRESS)
        .and_then(|()| radio.set_paired_address(PEER_ADDRESS));
    if let Err(e) = setup {
        error!("QwiicRF init failed: {}", e);
        loop {
            Timer::after(Duration::from_secs(1)).await;
        }
    }
    info!("QwiicRF ready as {:#x}, paired with {:#x}", OWN_ADDRESS, PEER_ADDRESS);

    let _ = spawner;

    loop {
        match radio.send_packet(PAIRED_MESSAGE) {
            Ok(()) => info!("Sent to paired node: {=[u8]:a}", PAIRED_MESSAGE),
            Err(e) => warn!("Paired send failed: {}", e),
        }
        match radio.send_packet_to(PEER_ADDRESS, DIRECT_MESSAGE) {
            Ok(()) => info!("Sent to {:#x}: {=[u8]:a}", PEER_ADDRESS, DIRECT_MESSAGE),
            Err(e) => warn!("Direct send failed: {}", e),
        }
        Timer::after(SEND_PERIOD).await;
    }
}
