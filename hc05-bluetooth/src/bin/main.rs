// Bridges an HC-05 Bluetooth module to the log. A reader task assembles
// UART bytes into lines and hands them to `main` over a channel.
//
// Pin map:
//   GPIO21 -> HC-05 RXD
//   GPIO20 <- HC-05 TXD

#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]

use defmt::{info, warn};
use embassy_executor::Spawner;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::{with_timeout, Duration};
use embedded_io_async::Read;
use esp32_peripherals::hc05::{LineBuffer, Lossy, BAUD_RATE, READ_TIMEOUT_MS, RX_BUFFER_SIZE};
use esp_hal::clock::CpuClock;
use esp_hal::timer::systimer::SystemTimer;
use esp_hal::uart::{Config as UartConfig, Uart, UartRx};
use esp_hal::Async;
use esp_println::println;
use heapless::Vec;
use {esp_backtrace as _, esp_println as _};

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

type Line = Vec<u8, RX_BUFFER_SIZE>;

static LINES: Channel<CriticalSectionRawMutex, Line, 4> = Channel::new();

fn forward(line: &[u8]) {
    if line.is_empty() {
        return;
    }
    let Ok(line) = Line::from_slice(line) else {
        return;
    };
    if LINES.try_send(line).is_err() {
        warn!("Line queue full, dropping a line");
    }
}

#[embassy_executor::task]
async fn reader_task(mut rx: UartRx<'static, Async>) {
    let mut lines: LineBuffer<RX_BUFFER_SIZE> = LineBuffer::new();
    let mut buf = [0u8; RX_BUFFER_SIZE];
    let timeout = Duration::from_millis(READ_TIMEOUT_MS);

    loop {
        match with_timeout(timeout, Read::read(&mut rx, &mut buf)).await {
            Ok(Ok(n)) => lines.feed(&buf[..n], forward),
            Ok(Err(e)) => warn!("UART read error: {}", e),
            // Quiet line: whatever arrived without a newline is shown now.
            Err(_) => lines.flush(forward),
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
        peripherals.UART1,
        UartConfig::default().with_baudrate(BAUD_RATE),
    )
    .expect("UART configuration is valid")
    .with_rx(peripherals.GPIO20)
    .with_tx(peripherals.GPIO21)
    .into_async();
    let (rx, _tx) = uart.split();

    spawner.spawn(reader_task(rx)).unwrap();
    info!("Listening on UART1 at {} baud", BAUD_RATE);

    loop {
        let line = LINES.receive().await;
        println!("RX from HC-05: {}", Lossy(&line));
    }
}
