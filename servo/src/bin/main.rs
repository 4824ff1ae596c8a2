// Sweeps a hobby servo 0° -> 90° -> 180°, one step per second, from a 50 Hz
// LEDC channel.
//
// Pin map:
//   GPIO7 -> servo signal

#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]

use defmt::{error, info, warn};
use esp32_peripherals::servo::{self, Servo};
use esp_hal::clock::CpuClock;
use esp_hal::delay::Delay;
use esp_hal::ledc::channel::ChannelIFace;
use esp_hal::ledc::timer::TimerIFace;
use esp_hal::ledc::{channel, timer, LSGlobalClkSource, Ledc, LowSpeed};
use esp_hal::main;
use esp_hal::time::Rate;
use {esp_backtrace as _, esp_println as _};

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

const STEP_MS: u32 = 1000;

#[main]
fn main() -> ! {
    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::_80MHz);
    let peripherals = esp_hal::init(config);

    let delay = Delay::new();
    let servo_config = servo::Config::default();

    let mut ledc = Ledc::new(peripherals.LEDC);
    ledc.set_global_slow_clock(LSGlobalClkSource::APBClk);

    // 14 bits at 50 Hz gives about 1.2 µs per step.
    let mut lstimer0 = ledc.timer::<LowSpeed>(timer::Number::Timer0);
    let timer_ok = lstimer0
        .configure(timer::config::Config {
            duty: timer::config::Duty::Duty14Bit,
            clock_source: timer::LSClockSource::APBClk,
            frequency: Rate::from_hz(servo_config.frequency_hz),
        })
        .is_ok();

    let mut channel0 = ledc.channel(channel::Number::Channel0, peripherals.GPIO7);
    let channel_ok = timer_ok
        && channel0
            .configure(channel::config::Config {
                timer: &lstimer0,
                duty_pct: 0,
                pin_config: channel::config::PinConfig::PushPull,
            })
            .is_ok();

    let servo = if channel_ok {
        Servo::new(channel0, servo_config).ok()
    } else {
        None
    };
    let Some(mut servo) = servo else {
        error!("Servo PWM setup failed");
        loop {
            delay.delay_millis(STEP_MS);
        }
    };
    info!(
        "Servo centered, pulse range {}-{} us",
        servo_config.min_pulse_us, servo_config.max_pulse_us
    );

    loop {
        for step in [Servo::move_to_0, Servo::move_to_90, Servo::move_to_180] {
            match step(&mut servo) {
                Ok(()) => info!("Servo at {} deg", servo.angle()),
                Err(e) => warn!("Servo move failed: {}", e),
            }
            delay.delay_millis(STEP_MS);
        }
    }
}
