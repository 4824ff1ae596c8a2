// Mirrors a push button on an LED and counts debounced presses from the
// GPIO interrupt.
//
// Pin map:
//   GPIO9 <- button to GND (internal pull-up, BOOT button on the DevKit)
//   GPIO4 -> LED (active high)

#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]

use core::cell::{Cell, RefCell};

use critical_section::Mutex;
use defmt::info;
use esp32_peripherals::gpio::{Button, Debouncer, Led};
use esp_hal::clock::CpuClock;
use esp_hal::delay::Delay;
use esp_hal::gpio::{DriveStrength, Event, Input, InputConfig, Io, Level, Output, OutputConfig, Pull};
use esp_hal::time::Instant;
use esp_hal::{handler, main};
use esp_println::println;
use {esp_backtrace as _, esp_println as _};

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

const DEBOUNCE_MS: u64 = 500;
const POLL_MS: u32 = 10;

// The button lives here because both the ISR and the polling loop read it.
static BUTTON: Mutex<RefCell<Option<Button<Input<'static>>>>> = Mutex::new(RefCell::new(None));
static DEBOUNCER: Mutex<RefCell<Debouncer>> = Mutex::new(RefCell::new(Debouncer::new(DEBOUNCE_MS)));
static COUNT: Mutex<Cell<u32>> = Mutex::new(Cell::new(0));

#[handler]
fn gpio() {
    critical_section::with(|cs| {
        if let Some(button) = BUTTON.borrow_ref_mut(cs).as_mut() {
            button.pin_mut().clear_interrupt();
        }

        let now = Instant::now().duration_since_epoch().as_millis();
        if DEBOUNCER.borrow_ref_mut(cs).accept(now) {
            let count = COUNT.borrow(cs).get() + 1;
            COUNT.borrow(cs).set(count);
            println!("Button Press Count = {count}");
        }
    });
}

#[main]
fn main() -> ! {
    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::_80MHz);
    let peripherals = esp_hal::init(config);

    let mut io = Io::new(peripherals.IO_MUX);
    io.set_interrupt_handler(gpio);

    let led_config = OutputConfig::default().with_drive_strength(DriveStrength::_5mA);
    let mut led = Led::new(Output::new(peripherals.GPIO4, Level::Low, led_config));

    let mut input = Input::new(peripherals.GPIO9, InputConfig::default().with_pull(Pull::Up));
    input.listen(Event::FallingEdge);

    critical_section::with(|cs| {
        BUTTON.borrow_ref_mut(cs).replace(Button::new(input));
    });

    info!("Press the button: LED follows it, presses are counted");

    let delay = Delay::new();
    loop {
        let pressed = critical_section::with(|cs| {
            BUTTON
                .borrow_ref_mut(cs)
                .as_mut()
                .and_then(|button| button.is_pressed().ok())
                .unwrap_or(false)
        });
        let Ok(()) = led.set(pressed);
        delay.delay_millis(POLL_MS);
    }
}
