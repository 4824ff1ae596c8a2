//! LED and push-button wrappers, plus a software debouncer.

use embedded_hal::digital::{InputPin, OutputPin, StatefulOutputPin};

/// An LED on a push-pull output.
pub struct Led<P> {
    pin: P,
    active_low: bool,
}

impl<P: OutputPin> Led<P> {
    /// LED lit when the pin is driven high.
    pub fn new(pin: P) -> Self {
        Self {
            pin,
            active_low: false,
        }
    }

    /// LED wired to VCC: lit when the pin is driven low.
    pub fn active_low(pin: P) -> Self {
        Self {
            pin,
            active_low: true,
        }
    }

    pub fn set(&mut self, on: bool) -> Result<(), P::Error> {
        if on != self.active_low {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        }
    }

    pub fn on(&mut self) -> Result<(), P::Error> {
        self.set(true)
    }

    pub fn off(&mut self) -> Result<(), P::Error> {
        self.set(false)
    }

    pub fn release(self) -> P {
        self.pin
    }
}

impl<P: StatefulOutputPin> Led<P> {
    pub fn toggle(&mut self) -> Result<(), P::Error> {
        self.pin.toggle()
    }

    pub fn is_on(&mut self) -> Result<bool, P::Error> {
        Ok(self.pin.is_set_high()? != self.active_low)
    }
}

/// A push button to ground on an input with pull-up: pressed reads low.
pub struct Button<P> {
    pin: P,
}

impl<P: InputPin> Button<P> {
    pub fn new(pin: P) -> Self {
        Self { pin }
    }

    pub fn is_pressed(&mut self) -> Result<bool, P::Error> {
        self.pin.is_low()
    }

    /// Access to the pin for HAL-specific calls such as interrupt control.
    pub fn pin_mut(&mut self) -> &mut P {
        &mut self.pin
    }
}

/// Accepts an event only when `window_ms` has passed since the last
/// accepted one. The first event is always accepted.
#[derive(Debug, Clone, Copy)]
pub struct Debouncer {
    window_ms: u64,
    last_accepted: Option<u64>,
}

impl Debouncer {
    pub const fn new(window_ms: u64) -> Self {
        Self {
            window_ms,
            last_accepted: None,
        }
    }

    /// `now_ms` is a monotonic timestamp in milliseconds.
    pub fn accept(&mut self, now_ms: u64) -> bool {
        let ready = match self.last_accepted {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= self.window_ms,
        };
        if ready {
            self.last_accepted = Some(now_ms);
        }
        ready
    }

    pub fn reset(&mut self) {
        self.last_accepted = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakePin;

    #[test]
    fn led_follows_requested_state() {
        let mut led = Led::new(FakePin::low());
        led.on().unwrap();
        led.off().unwrap();
        led.set(true).unwrap();
        assert_eq!(led.release().history, vec![true, false, true]);
    }

    #[test]
    fn active_low_led_inverts_level() {
        let mut led = Led::active_low(FakePin::high());
        led.on().unwrap();
        assert!(led.is_on().unwrap());
        led.off().unwrap();
        assert!(!led.is_on().unwrap());
        assert_eq!(led.release().history, vec![false, true]);
    }

    #[test]
    fn toggle_flips_output() {
        let mut led = Led::new(FakePin::low());
        led.toggle().unwrap();
        assert!(led.is_on().unwrap());
        led.toggle().unwrap();
        assert!(!led.is_on().unwrap());
    }

    #[test]
    fn button_is_active_low() {
        let mut button = Button::new(FakePin::high());
        assert!(!button.is_pressed().unwrap());

        let mut button = Button::new(FakePin::low());
        assert!(button.is_pressed().unwrap());
    }

    #[test]
    fn debouncer_rejects_bounces_inside_window() {
        let mut debounce = Debouncer::new(500);
        assert!(debounce.accept(1_000));
        assert!(!debounce.accept(1_020));
        assert!(!debounce.accept(1_499));
        assert!(debounce.accept(1_500));
        assert!(!debounce.accept(1_600));
    }

    #[test]
    fn debouncer_reset_accepts_next_event() {
        let mut debounce = Debouncer::new(500);
        assert!(debounce.accept(10));
        debounce.reset();
        assert!(debounce.accept(20));
    }
}
