//! HC-SR04 ultrasonic ranging: echo pulse capture and distance conversion.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

pub const TRIGGER_PULSE_US: u32 = 10;
/// Echoes longer than this mean nothing was in range.
pub const MAX_ECHO_US: u32 = 35_000;
pub const ECHO_TIMEOUT_MS: u64 = 1000;
pub const SETTLE_MS: u64 = 100;
pub const SAMPLE_PERIOD_MS: u64 = 200;

/// Round-trip time of sound per centimetre, in microseconds.
const US_PER_CM: f32 = 58.0;

/// Sends the 10 µs trigger pulse.
pub fn trigger<P: OutputPin, D: DelayNs>(pin: &mut P, delay: &mut D) -> Result<(), P::Error> {
    pin.set_high()?;
    delay.delay_us(TRIGGER_PULSE_US);
    pin.set_low()
}

/// Edge bookkeeping for the echo line, driven from the GPIO interrupt.
#[derive(Debug, Default)]
pub struct EchoCapture {
    rise_us: Option<u64>,
}

impl EchoCapture {
    pub const fn new() -> Self {
        Self { rise_us: None }
    }

    /// Feed every edge with the pin level after the edge and a monotonic
    /// timestamp. Returns the pulse width on a falling edge that follows a
    /// recorded rising edge.
    pub fn on_edge(&mut self, high: bool, now_us: u64) -> Option<u32> {
        if high {
            self.rise_us = Some(now_us);
            return None;
        }
        let start = self.rise_us.take()?;
        let width = now_us.saturating_sub(start);
        Some(u32::try_from(width).unwrap_or(u32::MAX))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Reading {
    Distance { cm: f32 },
    OutOfRange,
}

pub fn reading_from_echo(width_us: u32) -> Reading {
    if width_us > MAX_ECHO_US {
        Reading::OutOfRange
    } else {
        Reading::Distance {
            cm: width_us as f32 / US_PER_CM,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeDelay, FakePin};

    #[test]
    fn trigger_pulses_for_ten_microseconds() {
        let mut pin = FakePin::low();
        let mut delay = FakeDelay::default();
        trigger(&mut pin, &mut delay).unwrap();
        assert_eq!(pin.history, vec![true, false]);
        assert_eq!(delay.total_ns, 10_000);
    }

    #[test]
    fn rising_then_falling_yields_width() {
        let mut capture = EchoCapture::new();
        assert_eq!(capture.on_edge(true, 1_000), None);
        assert_eq!(capture.on_edge(false, 1_580), Some(580));
    }

    #[test]
    fn falling_without_rising_is_ignored() {
        let mut capture = EchoCapture::new();
        assert_eq!(capture.on_edge(false, 500), None);
        capture.on_edge(true, 600);
        capture.on_edge(false, 700);
        assert_eq!(capture.on_edge(false, 800), None);
    }

    #[test]
    fn latest_rising_edge_wins() {
        let mut capture = EchoCapture::new();
        capture.on_edge(true, 100);
        capture.on_edge(true, 300);
        assert_eq!(capture.on_edge(false, 400), Some(100));
    }

    #[test]
    fn converts_width_to_centimetres() {
        assert_eq!(reading_from_echo(580), Reading::Distance { cm: 10.0 });
        assert_eq!(reading_from_echo(0), Reading::Distance { cm: 0.0 });
        match reading_from_echo(MAX_ECHO_US) {
            Reading::Distance { cm } => assert!((cm - 603.45).abs() < 0.01),
            Reading::OutOfRange => panic!("35 ms is still in range"),
        }
    }

    #[test]
    fn long_echo_is_out_of_range() {
        assert_eq!(reading_from_echo(MAX_ECHO_US + 1), Reading::OutOfRange);
    }
}
