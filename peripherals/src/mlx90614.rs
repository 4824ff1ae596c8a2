//! Melexis MLX90614 infrared thermometer (SMBus over I2C).

use embedded_hal::i2c::I2c;

pub const DEFAULT_ADDRESS: u8 = 0x5A;

const REG_TA: u8 = 0x06;
const REG_TOBJ1: u8 = 0x07;
const REG_TOBJ2: u8 = 0x08;

/// Set by the sensor when the reading is invalid.
const ERROR_FLAG: u16 = 0x8000;

#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    I2c(E),
    /// Packet error code did not match the received bytes.
    Pec { expected: u8, received: u8 },
    /// The sensor flagged the temperature word as invalid.
    Flagged(u16),
}

impl<E> From<E> for Error<E> {
    fn from(e: E) -> Self {
        Error::I2c(e)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Config {
    pub address: u8,
    /// Added to every converted temperature, in °C.
    pub offset_c: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            offset_c: -1.0,
        }
    }
}

pub struct Mlx90614<I2C> {
    i2c: I2C,
    config: Config,
}

impl<I2C: I2c> Mlx90614<I2C> {
    pub fn new(i2c: I2C, config: Config) -> Self {
        Self { i2c, config }
    }

    pub fn ambient_temperature(&mut self) -> Result<f32, Error<I2C::Error>> {
        self.temperature(REG_TA)
    }

    pub fn object_temperature(&mut self) -> Result<f32, Error<I2C::Error>> {
        self.temperature(REG_TOBJ1)
    }

    /// Second zone, only populated on dual-zone parts.
    pub fn object2_temperature(&mut self) -> Result<f32, Error<I2C::Error>> {
        self.temperature(REG_TOBJ2)
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    fn temperature(&mut self, reg: u8) -> Result<f32, Error<I2C::Error>> {
        let raw = self.read_word(reg)?;
        if raw & ERROR_FLAG != 0 {
            return Err(Error::Flagged(raw));
        }
        Ok(raw_to_celsius(raw) + self.config.offset_c)
    }

    fn read_word(&mut self, reg: u8) -> Result<u16, Error<I2C::Error>> {
        let mut buf = [0u8; 3];
        self.i2c.write_read(self.config.address, &[reg], &mut buf)?;

        let addr = self.config.address << 1;
        let expected = crc8(&[addr, reg, addr | 1, buf[0], buf[1]]);
        if expected != buf[2] {
            return Err(Error::Pec {
                expected,
                received: buf[2],
            });
        }
        Ok(u16::from_le_bytes([buf[0], buf[1]]))
    }
}

/// 0.02 K per LSB.
pub fn raw_to_celsius(raw: u16) -> f32 {
    f32::from(raw) * 0.02 - 273.15
}

/// SMBus PEC: CRC-8, polynomial x^8 + x^2 + x + 1, initial value 0.
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc = 0u8;
    for &byte in data {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ 0x07
            } else {
                crc << 1
            };
        }
    }
    crc
}
