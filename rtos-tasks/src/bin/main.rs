// Two embassy tasks on one executor: a button mirrored on an LED and a
// BME688 sampled every two seconds. The LED sits behind an async mutex so
// the sensor task can flash it when a reading fails.
//
// Pin map:
//   GPIO9 <- button to GND (internal pull-up)
//   GPIO2 -> LED (active high)
//   GPIO6 <> BME688 SDA
//   GPIO7 -> BME688 SCL

#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]

use defmt::{error, info};
use embassy_executor::Spawner;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::{Duration, Timer};
use esp32_peripherals::bme688::{self, Bme688};
use esp32_peripherals::gpio::{Button, Led};
use esp_hal::clock::CpuClock;
use esp_hal::delay::Delay;
use esp_hal::gpio::{Input, InputConfig, Level, Output, OutputConfig, Pull};
use esp_hal::i2c::master::{Config as I2cConfig, I2c};
use esp_hal::time::Rate;
use esp_hal::timer::systimer::SystemTimer;
use esp_hal::Blocking;
use {esp_backtrace as _, esp_println as _};

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

const BUTTON_POLL: Duration = Duration::from_millis(10);
const SENSOR_PERIOD: Duration = Duration::from_millis(2000);
const ERROR_FLASH: Duration = Duration::from_millis(200);

type SharedLed = Mutex<CriticalSectionRawMutex, Option<Led<Output<'static>>>>;
type Sensor = Bme688<I2c<'static, Blocking>, Delay>;

static LED: SharedLed = Mutex::new(None);

#[embassy_executor::task]
async fn button_task(mut button: Button<Input<'static>>) {
    loop {
        let Ok(pressed) = button.is_pressed();
        if let Some(led) = LED.lock().await.as_mut() {
            let Ok(()) = led.set(pressed);
        }
        Timer::after(BUTTON_POLL).await;
    }
}

#[embassy_executor::task]
async fn bme688_task(mut sensor: Sensor) {
    loop {
        // Await the conversion so the button task keeps running meanwhile.
        let reading = match sensor.start_forced() {
            Ok(()) => {
                Timer::after(Duration::from_millis(u64::from(sensor.forced_wait_ms()))).await;
                sensor.read_forced()
            }
            Err(e) => Err(e),
        };
        match reading {
            Ok(m) => {
                info!("[BME688] Temperature: {} C", m.temperature);
                info!("[BME688] Humidity: {} %", m.humidity);
                info!("[BME688] Pressure: {} hPa", m.pressure_hpa());
                info!("[BME688] Gas Resistance: {} Ohms", m.gas_resistance);
            }
            Err(e) => {
                error!("[BME688] measurement failed: {}", e);
                // Hold the LED for the flash so the button task cannot
                // overwrite it halfway.
                let mut led = LED.lock().await;
                if let Some(led) = led.as_mut() {
                    let Ok(()) = led.on();
                    Timer::after(ERROR_FLASH).await;
                    let Ok(()) = led.off();
                }
            }
        }
        Timer::after(SENSOR_PERIOD).await;
    }
}

#[esp_hal_embassy::main]
async fn main(spawner: Spawner) {
    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    let timer0 = SystemTimer::new(peripherals.SYSTIMER);
    esp_hal_embassy::init(timer0.alarm0);

    info!("Embassy initialized!");

    let led = Led::new(Output::new(peripherals.GPIO2, Level::Low, OutputConfig::default()));
    LED.lock().await.replace(led);

    let button = Button::new(Input::new(
        peripherals.GPIO9,
        InputConfig::default().with_pull(Pull::Up),
    ));
    spawner.spawn(button_task(button)).unwrap();

    let i2c = I2c::new(
        peripherals.I2C0,
        I2cConfig::default().with_frequency(Rate::from_khz(100)),
    )
    .expect("I2C configuration is valid")
    .with_sda(peripherals.GPIO6)
    .with_scl(peripherals.GPIO7);

    match Bme688::new(i2c, Delay::new(), bme688::Config::default()) {
        Ok(sensor) => {
            info!("BME688 ready ({})", sensor.variant());
            spawner.spawn(bme688_task(sensor)).unwrap();
        }
        Err(e) => error!("BME688 init failed: {}", e),
    }

    loop {
        Timer::after(Duration::from_secs(5)).await;
    }
}
