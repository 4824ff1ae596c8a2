//! Bosch BME688 / BME680 environmental sensor in forced mode over I2C.
//!
//! One call to [`Bme688::measure`] triggers a single TPHG conversion with
//! heater profile 0, waits for it and returns compensated values.

mod calib;

pub use calib::{gas_wait, CalibData, CALIB_LEN};

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

pub const DEFAULT_ADDRESS: u8 = 0x77;
pub const SECONDARY_ADDRESS: u8 = 0x76;
pub const CHIP_ID: u8 = 0x61;

const REG_FIELD0: u8 = 0x1D;
const REG_RES_HEAT0: u8 = 0x5A;
const REG_GAS_WAIT0: u8 = 0x64;
const REG_CTRL_GAS_0: u8 = 0x70;
const REG_CTRL_GAS_1: u8 = 0x71;
const REG_CTRL_HUM: u8 = 0x72;
const REG_CTRL_MEAS: u8 = 0x74;
const REG_CONFIG: u8 = 0x75;
const REG_CHIP_ID: u8 = 0xD0;
const REG_SOFT_RESET: u8 = 0xE0;
const REG_VARIANT: u8 = 0xF0;
const REG_COEFF1: u8 = 0x8A;
const REG_COEFF2: u8 = 0xE1;
const REG_COEFF3: u8 = 0x00;

const SOFT_RESET_CMD: u8 = 0xB6;
const MODE_FORCED: u8 = 0x01;
const FIELD_LEN: usize = 17;

const NEW_DATA: u8 = 0x80;
const GAS_VALID: u8 = 0x20;
const HEAT_STABLE: u8 = 0x10;

const RUN_GAS_HIGH: u8 = 0x20;
const RUN_GAS_LOW: u8 = 0x10;

#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    I2c(E),
    /// Chip id register did not read back `0x61`.
    UnexpectedChipId(u8),
    /// Conversion did not complete within the computed wait.
    NoNewData,
}

impl<E> From<E> for Error<E> {
    fn from(e: E) -> Self {
        Error::I2c(e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Oversampling {
    Skipped = 0,
    X1 = 1,
    X2 = 2,
    X4 = 3,
    X8 = 4,
    X16 = 5,
}

impl Oversampling {
    fn cycles(self) -> u32 {
        match self {
            Oversampling::Skipped => 0,
            Oversampling::X1 => 1,
            Oversampling::X2 => 2,
            Oversampling::X4 => 4,
            Oversampling::X8 => 8,
            Oversampling::X16 => 16,
        }
    }
}

/// IIR filter coefficient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Filter {
    Off = 0,
    C1 = 1,
    C3 = 2,
    C7 = 3,
    C15 = 4,
    C31 = 5,
    C63 = 6,
    C127 = 7,
}

/// `Variant` register: BME688 runs the "gas high" ADC path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Variant {
    GasLow,
    GasHigh,
}

#[derive(Debug, Clone, Copy)]
pub struct Config {
    pub address: u8,
    pub humidity: Oversampling,
    pub pressure: Oversampling,
    pub temperature: Oversampling,
    pub filter: Filter,
    pub heater_temp_c: u16,
    pub heater_ms: u16,
    /// Used for the heater resistance calculation.
    pub ambient_c: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            humidity: Oversampling::X2,
            pressure: Oversampling::X4,
            temperature: Oversampling::X8,
            filter: Filter::Off,
            heater_temp_c: 300,
            heater_ms: 100,
            ambient_c: 25.0,
        }
    }
}

impl Config {
    /// TPHG conversion time in microseconds, without the heater phase.
    pub fn measurement_duration_us(&self) -> u32 {
        let cycles =
            self.temperature.cycles() + self.pressure.cycles() + self.humidity.cycles();
        cycles * 1963 + 477 * 4 + 477 * 5 + 1000
    }

    /// Total wait after triggering forced mode, in milliseconds.
    pub fn forced_wait_ms(&self) -> u32 {
        (self.measurement_duration_us() + 500) / 1000 + u32::from(self.heater_ms) + 1
    }

    fn ctrl_meas(&self, mode: u8) -> u8 {
        ((self.temperature as u8) << 5) | ((self.pressure as u8) << 2) | mode
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Measurement {
    /// °C
    pub temperature: f32,
    /// Pa
    pub pressure: f32,
    /// %RH
    pub humidity: f32,
    /// Ω
    pub gas_resistance: f32,
    pub gas_valid: bool,
    pub heater_stable: bool,
}

impl Measurement {
    pub fn pressure_hpa(&self) -> f32 {
        self.pressure / 100.0
    }

    pub fn gas_resistance_kohm(&self) -> f32 {
        self.gas_resistance / 1000.0
    }
}

/// Uncompensated ADC values from the field registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawFields {
    pub status: u8,
    pub temperature: u32,
    pub pressure: u32,
    pub humidity: u16,
    pub gas_adc: u16,
    pub gas_range: u8,
    /// Status bits from the gas LSB register.
    pub gas_flags: u8,
}

impl RawFields {
    pub fn parse(b: &[u8; FIELD_LEN], variant: Variant) -> Self {
        let (gas_msb, gas_lsb) = match variant {
            Variant::GasHigh => (b[15], b[16]),
            Variant::GasLow => (b[13], b[14]),
        };
        Self {
            status: b[0],
            pressure: (u32::from(b[2]) << 12) | (u32::from(b[3]) << 4) | (u32::from(b[4]) >> 4),
            temperature: (u32::from(b[5]) << 12)
                | (u32::from(b[6]) << 4)
                | (u32::from(b[7]) >> 4),
            humidity: u16::from_be_bytes([b[8], b[9]]),
            gas_adc: (u16::from(gas_msb) << 2) | (u16::from(gas_lsb) >> 6),
            gas_range: gas_lsb & 0x0F,
            gas_flags: gas_lsb & (GAS_VALID | HEAT_STABLE),
        }
    }

    pub fn has_new_data(&self) -> bool {
        self.status & NEW_DATA != 0
    }
}

pub struct Bme688<I2C, D> {
    i2c: I2C,
    delay: D,
    config: Config,
    calib: CalibData,
    variant: Variant,
}

impl<I2C: I2c, D: DelayNs> Bme688<I2C, D> {
    /// Resets the chip, checks its id, loads calibration and programs the
    /// oversampling, filter and heater profile 0.
    pub fn new(i2c: I2C, delay: D, config: Config) -> Result<Self, Error<I2C::Error>> {
        let mut dev = Self {
            i2c,
            delay,
            config,
            calib: CalibData::default(),
            variant: Variant::GasLow,
        };
        dev.write_reg(REG_SOFT_RESET, SOFT_RESET_CMD)?;
        dev.delay.delay_ms(10);

        let id = dev.read_reg(REG_CHIP_ID)?;
        if id != CHIP_ID {
            return Err(Error::UnexpectedChipId(id));
        }
        dev.variant = match dev.read_reg(REG_VARIANT)? {
            0x01 => Variant::GasHigh,
            _ => Variant::GasLow,
        };

        let mut block = [0u8; CALIB_LEN];
        dev.i2c
            .write_read(config.address, &[REG_COEFF1], &mut block[0..23])?;
        dev.i2c
            .write_read(config.address, &[REG_COEFF2], &mut block[23..37])?;
        dev.i2c
            .write_read(config.address, &[REG_COEFF3], &mut block[37..42])?;
        dev.calib = CalibData::parse(&block);

        dev.configure()?;
        Ok(dev)
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn calibration(&self) -> &CalibData {
        &self.calib
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn release(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }

    fn configure(&mut self) -> Result<(), Error<I2C::Error>> {
        let c = self.config;
        let res_heat = self.calib.heater_resistance(c.heater_temp_c, c.ambient_c);
        let run_gas = match self.variant {
            Variant::GasHigh => RUN_GAS_HIGH,
            Variant::GasLow => RUN_GAS_LOW,
        };

        self.write_reg(REG_CTRL_HUM, c.humidity as u8)?;
        self.write_reg(REG_CONFIG, (c.filter as u8) << 2)?;
        self.write_reg(REG_CTRL_MEAS, c.ctrl_meas(0))?;
        self.write_reg(REG_RES_HEAT0, res_heat)?;
        self.write_reg(REG_GAS_WAIT0, gas_wait(c.heater_ms))?;
        // Heater on, profile 0.
        self.write_reg(REG_CTRL_GAS_0, 0x00)?;
        self.write_reg(REG_CTRL_GAS_1, run_gas)?;
        Ok(())
    }

    /// Runs one forced-mode conversion and compensates the result.
    /// Blocks on the delay for the whole conversion.
    pub fn measure(&mut self) -> Result<Measurement, Error<I2C::Error>> {
        self.start_forced()?;
        self.delay.delay_ms(self.config.forced_wait_ms());
        self.read_forced()
    }

    /// Kicks off a forced-mode conversion and returns at once. Wait
    /// `forced_wait_ms()` before calling `read_forced`.
    pub fn start_forced(&mut self) -> Result<(), Error<I2C::Error>> {
        self.write_reg(REG_CTRL_MEAS, self.config.ctrl_meas(MODE_FORCED))
    }

    pub fn forced_wait_ms(&self) -> u32 {
        self.config.forced_wait_ms()
    }

    /// Reads the field block of a finished conversion.
    pub fn read_forced(&mut self) -> Result<Measurement, Error<I2C::Error>> {
        let mut buf = [0u8; FIELD_LEN];
        self.i2c
            .write_read(self.config.address, &[REG_FIELD0], &mut buf)?;
        let raw = RawFields::parse(&buf, self.variant);
        if !raw.has_new_data() {
            return Err(Error::NoNewData);
        }
        Ok(self.compensate(&raw))
    }

    pub fn compensate(&self, raw: &RawFields) -> Measurement {
        let (temperature, t_fine) = self.calib.temperature(raw.temperature);
        let gas_resistance = match self.variant {
            Variant::GasHigh => CalibData::gas_resistance_high(raw.gas_adc, raw.gas_range),
            Variant::GasLow => self.calib.gas_resistance_low(raw.gas_adc, raw.gas_range),
        };
        Measurement {
            temperature,
            pressure: self.calib.pressure(raw.pressure, t_fine),
            humidity: self.calib.humidity(raw.humidity, t_fine),
            gas_resistance,
            gas_valid: raw.gas_flags & GAS_VALID != 0,
            heater_stable: raw.gas_flags & HEAT_STABLE != 0,
        }
    }

    pub fn read_temperature(&mut self) -> Result<f32, Error<I2C::Error>> {
        Ok(self.measure()?.temperature)
    }

    pub fn read_pressure(&mut self) -> Result<f32, Error<I2C::Error>> {
        Ok(self.measure()?.pressure)
    }

    pub fn read_humidity(&mut self) -> Result<f32, Error<I2C::Error>> {
        Ok(self.measure()?.humidity)
    }

    pub fn read_gas_resistance(&mut self) -> Result<f32, Error<I2C::Error>> {
        Ok(self.measure()?.gas_resistance)
    }

    fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), Error<I2C::Error>> {
        self.i2c.write(self.config.address, &[reg, value])?;
        Ok(())
    }

    fn read_reg(&mut self, reg: u8) -> Result<u8, Error<I2C::Error>> {
        let mut buf = [0u8; 1];
        self.i2c.write_read(self.config.address, &[reg], &mut buf)?;
        Ok(buf[0])
    }
}
