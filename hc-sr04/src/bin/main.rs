// HC-SR04 ranging. The GPIO interrupt timestamps both echo edges and signals
// the pulse width to the measuring task.
//
// Pin map:
//   GPIO4 -> TRIG
//   GPIO5 <- ECHO (through a 5 V to 3.3 V divider)

#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]

use core::cell::RefCell;

use critical_section::Mutex;
use defmt::{info, warn};
use embassy_executor::Spawner;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{with_timeout, Duration, Timer};
use esp32_peripherals::hcsr04::{
    self, reading_from_echo, EchoCapture, Reading, ECHO_TIMEOUT_MS, SAMPLE_PERIOD_MS, SETTLE_MS,
};
use esp_hal::clock::CpuClock;
use esp_hal::delay::Delay;
use esp_hal::gpio::{Event, Input, InputConfig, Io, Level, Output, OutputConfig, Pull};
use esp_hal::handler;
use esp_hal::time::Instant;
use esp_hal::timer::systimer::SystemTimer;
use {esp_backtrace as _, esp_println as _};

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

static ECHO: Mutex<RefCell<Option<Input<'static>>>> = Mutex::new(RefCell::new(None));
static CAPTURE: Mutex<RefCell<EchoCapture>> = Mutex::new(RefCell::new(EchoCapture::new()));

// Only the latest width matters.
static ECHO_WIDTH: Signal<CriticalSectionRawMutex, u32> = Signal::new();

#[handler]
fn gpio() {
    let now_us = Instant::now().duration_since_epoch().as_micros();
    critical_section::with(|cs| {
        let mut slot = ECHO.borrow_ref_mut(cs);
        let Some(echo) = slot.as_mut() else {
            return;
        };
        echo.clear_interrupt();

        if let Some(width) = CAPTURE.borrow_ref_mut(cs).on_edge(echo.is_high(), now_us) {
            ECHO_WIDTH.signal(width);
        }
    });
}

#[embassy_executor::task]
async fn ranging_task(mut trig: Output<'static>) {
    let mut delay = Delay::new();
    Timer::after(Duration::from_millis(SETTLE_MS)).await;

    loop {
        ECHO_WIDTH.reset();
        let Ok(()) = hcsr04::trigger(&mut trig, &mut delay);

        match with_timeout(Duration::from_millis(ECHO_TIMEOUT_MS), ECHO_WIDTH.wait()).await {
            Ok(width) => match reading_from_echo(width) {
                Reading::Distance { cm } => info!("Distance: {} cm", cm),
                Reading::OutOfRange => warn!("Out of range ({} us echo)", width),
            },
            Err(_) => warn!("No echo received"),
        }

        Timer::after(Duration::from_millis(SAMPLE_PERIOD_MS)).await;
    }
}

#[esp_hal_embassy::main]
async fn main(spawner: Spawner) {
    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    let timer0 = SystemTimer::new(peripherals.SYSTIMER);
    esp_hal_embassy::init(timer0.alarm0);

    info!("Embassy initialized!");

    let mut io = Io::new(peripherals.IO_MUX);
    io.set_interrupt_handler(gpio);

    let trig = Output::new(peripherals.GPIO4, Level::Low, OutputConfig::default());

    let mut echo = Input::new(peripherals.GPIO5, InputConfig::default().with_pull(Pull::Down));
    critical_section::with(|cs| {
        echo.listen(Event::AnyEdge);
        ECHO.borrow_ref_mut(cs).replace(echo);
    });

    spawner.spawn(ranging_task(trig)).unwrap();

    loop {
        Timer::after(Duration::from_secs(5)).await;
    }
}
