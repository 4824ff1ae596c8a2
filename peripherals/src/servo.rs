//! Hobby servo on a 50 Hz PWM channel.

use embedded_hal::pwm::SetDutyCycle;

pub const MAX_ANGLE: f32 = 180.0;

#[derive(Debug, Clone, Copy)]
pub struct Config {
    pub frequency_hz: u32,
    /// Pulse width at 0°.
    pub min_pulse_us: u32,
    /// Pulse width at 180°.
    pub max_pulse_us: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            frequency_hz: 50,
            min_pulse_us: 500,
            max_pulse_us: 2500,
        }
    }
}

impl Config {
    pub fn period_us(&self) -> u32 {
        1_000_000 / self.frequency_hz
    }

    /// Linear map of `[0, 180]` onto the pulse range. Out-of-range angles
    /// are clamped first.
    pub fn angle_to_pulse_us(&self, degrees: f32) -> u32 {
        let degrees = degrees.clamp(0.0, MAX_ANGLE);
        let span = (self.max_pulse_us - self.min_pulse_us) as f32;
        self.min_pulse_us + (degrees / MAX_ANGLE * span) as u32
    }

    /// Duty value for `pulse_us` on a channel whose full scale is
    /// `max_duty`.
    pub fn pulse_to_duty(&self, pulse_us: u32, max_duty: u16) -> u16 {
        let pulse_us = pulse_us.clamp(self.min_pulse_us, self.max_pulse_us);
        let duty = u64::from(pulse_us) * u64::from(max_duty) / u64::from(self.period_us());
        duty.min(u64::from(max_duty)) as u16
    }
}

pub struct Servo<P> {
    pwm: P,
    config: Config,
    angle: f32,
}

impl<P: SetDutyCycle> Servo<P> {
    /// Takes a channel already running at `config.frequency_hz` and moves
    /// the horn to the center.
    pub fn new(pwm: P, config: Config) -> Result<Self, P::Error> {
        let mut servo = Self {
            pwm,
            config,
            angle: 0.0,
        };
        servo.center()?;
        Ok(servo)
    }

    pub fn set_angle(&mut self, degrees: f32) -> Result<(), P::Error> {
        let degrees = degrees.clamp(0.0, MAX_ANGLE);
        let pulse = self.config.angle_to_pulse_us(degrees);
        self.set_pulse_width_us(pulse)?;
        self.angle = degrees;
        Ok(())
    }

    pub fn set_pulse_width_us(&mut self, pulse_us: u32) -> Result<(), P::Error> {
        let duty = self
            .config
            .pulse_to_duty(pulse_us, self.pwm.max_duty_cycle());
        self.pwm.set_duty_cycle(duty)
    }

    pub fn angle(&self) -> f32 {
        self.angle
    }

    pub fn move_to_0(&mut self) -> Result<(), P::Error> {
        self.set_angle(0.0)
    }

    pub fn move_to_90(&mut self) -> Result<(), P::Error> {
        self.set_angle(90.0)
    }

    pub fn move_to_180(&mut self) -> Result<(), P::Error> {
        self.set_angle(180.0)
    }

    pub fn center(&mut self) -> Result<(), P::Error> {
        self.set_angle(90.0)
    }

    pub fn release(self) -> P {
        self.pwm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakePwm;

    #[test]
    fn angle_maps_linearly_onto_pulse_range() {
        let config = Config::default();
        assert_eq!(config.angle_to_pulse_us(0.0), 500);
        assert_eq!(config.angle_to_pulse_us(90.0), 1500);
        assert_eq!(config.angle_to_pulse_us(180.0), 2500);
        assert_eq!(config.angle_to_pulse_us(45.0), 1000);
    }

    #[test]
    fn angles_are_clamped() {
        let config = Config::default();
        assert_eq!(config.angle_to_pulse_us(-30.0), 500);
        assert_eq!(config.angle_to_pulse_us(270.0), 2500);
    }

    #[test]
    fn duty_is_pulse_over_period() {
        let config = Config::default();
        assert_eq!(config.period_us(), 20_000);
        // 14-bit LEDC channel
        assert_eq!(config.pulse_to_duty(1500, 16_383), 1228);
        assert_eq!(config.pulse_to_duty(500, 16_383), 409);
        assert_eq!(config.pulse_to_duty(2500, 16_383), 2047);
        // Pulses outside 500..=2500 µs are clamped
        assert_eq!(config.pulse_to_duty(100, 16_383), 409);
        assert_eq!(config.pulse_to_duty(30_000, 16_383), 2047);
    }

    #[test]
    fn new_centers_the_servo() {
        let servo = Servo::new(FakePwm::new(16_383), Config::default()).unwrap();
        assert_eq!(servo.angle(), 90.0);
        assert_eq!(servo.release().duty, 1228);
    }

    #[test]
    fn preset_positions() {
        let mut servo = Servo::new(FakePwm::new(10_000), Config::default()).unwrap();
        servo.move_to_0().unwrap();
        assert_eq!(servo.angle(), 0.0);
        servo.move_to_180().unwrap();
        assert_eq!(servo.angle(), 180.0);
        servo.set_angle(200.0).unwrap();
        assert_eq!(servo.angle(), 180.0);
        assert_eq!(servo.release().duty, 1250);

        let mut servo = Servo::new(FakePwm::new(10_000), Config::default()).unwrap();
        servo.move_to_90().unwrap();
        assert_eq!(servo.release().duty, 750);
    }
}
