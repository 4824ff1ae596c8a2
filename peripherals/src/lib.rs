//! Sensor and peripheral wrappers shared by the ESP32 demo firmwares.
//!
//! Everything here is written against the `embedded-hal` 1.0 traits so the
//! drivers can be exercised on the host with fake buses; the demos plug in
//! the `esp-hal` peripherals.

#![cfg_attr(not(test), no_std)]

pub mod bme688;
pub mod clock;
pub mod gas;
pub mod gpio;
pub mod hc05;
pub mod hcsr04;
pub mod http;
pub mod mlx90614;
pub mod ntp;
pub mod qwiicrf;
pub mod recorder;
pub mod sdcard;
pub mod servo;

#[cfg(test)]
mod testing;
