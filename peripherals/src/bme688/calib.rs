//! Factory calibration block and the floating-point compensation formulas.

/// Bytes read from `0x8A` (23), `0xE1` (14) and `0x00` (5), concatenated.
pub const CALIB_LEN: usize = 42;

const GAS_LOW_K1: [f32; 16] = [
    0.0, 0.0, 0.0, 0.0, 0.0, -1.0, 0.0, -0.8, 0.0, 0.0, -0.2, -0.5, 0.0, -1.0, 0.0, 0.0,
];
const GAS_LOW_K2: [f32; 16] = [
    0.0, 0.0, 0.0, 0.0, 0.1, 0.7, 0.0, -0.8, -0.1, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
];

#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CalibData {
    pub par_t1: u16,
    pub par_t2: i16,
    pub par_t3: i8,
    pub par_p1: u16,
    pub par_p2: i16,
    pub par_p3: i8,
    pub par_p4: i16,
    pub par_p5: i16,
    pub par_p6: i8,
    pub par_p7: i8,
    pub par_p8: i16,
    pub par_p9: i16,
    pub par_p10: u8,
    pub par_h1: u16,
    pub par_h2: u16,
    pub par_h3: i8,
    pub par_h4: i8,
    pub par_h5: i8,
    pub par_h6: u8,
    pub par_h7: i8,
    pub par_gh1: i8,
    pub par_gh2: i16,
    pub par_gh3: i8,
    pub res_heat_val: i8,
    pub res_heat_range: u8,
    pub range_sw_err: i8,
}

fn u16_at(c: &[u8; CALIB_LEN], msb: usize, lsb: usize) -> u16 {
    u16::from_be_bytes([c[msb], c[lsb]])
}

fn i16_at(c: &[u8; CALIB_LEN], msb: usize, lsb: usize) -> i16 {
    i16::from_be_bytes([c[msb], c[lsb]])
}

impl CalibData {
    pub fn parse(c: &[u8; CALIB_LEN]) -> Self {
        Self {
            par_t1: u16_at(c, 32, 31),
            par_t2: i16_at(c, 1, 0),
            par_t3: c[2] as i8,
            par_p1: u16_at(c, 5, 4),
            par_p2: i16_at(c, 7, 6),
            par_p3: c[8] as i8,
            par_p4: i16_at(c, 11, 10),
            par_p5: i16_at(c, 13, 12),
            par_p6: c[15] as i8,
            par_p7: c[14] as i8,
            par_p8: i16_at(c, 19, 18),
            par_p9: i16_at(c, 21, 20),
            par_p10: c[22],
            par_h1: (u16::from(c[25]) << 4) | u16::from(c[24] & 0x0F),
            par_h2: (u16::from(c[23]) << 4) | u16::from(c[24] >> 4),
            par_h3: c[26] as i8,
            par_h4: c[27] as i8,
            par_h5: c[28] as i8,
            par_h6: c[29],
            par_h7: c[30] as i8,
            par_gh1: c[35] as i8,
            par_gh2: i16_at(c, 34, 33),
            par_gh3: c[36] as i8,
            res_heat_val: c[37] as i8,
            res_heat_range: (c[39] & 0x30) >> 4,
            range_sw_err: (c[41] as i8 & (0xF0u8 as i8)) >> 4,
        }
    }

    /// Returns `(temperature °C, t_fine)`.
    pub fn temperature(&self, adc: u32) -> (f32, f32) {
        let adc = adc as f32;
        let t1 = f32::from(self.par_t1);
        let var1 = (adc / 16384.0 - t1 / 1024.0) * f32::from(self.par_t2);
        let x = adc / 131072.0 - t1 / 8192.0;
        let var2 = x * x * (f32::from(self.par_t3) * 16.0);
        let t_fine = var1 + var2;
        (t_fine / 5120.0, t_fine)
    }

    /// Pressure in Pa.
    pub fn pressure(&self, adc: u32, t_fine: f32) -> f32 {
        let mut var1 = t_fine / 2.0 - 64000.0;
        let mut var2 = var1 * var1 * (f32::from(self.par_p6) / 131072.0);
        var2 += var1 * f32::from(self.par_p5) * 2.0;
        var2 = var2 / 4.0 + f32::from(self.par_p4) * 65536.0;
        var1 = (f32::from(self.par_p3) * var1 * var1 / 16384.0 + f32::from(self.par_p2) * var1)
            / 524288.0;
        var1 = (1.0 + var1 / 32768.0) * f32::from(self.par_p1);
        if var1 == 0.0 {
            return 0.0;
        }

        let mut pres = 1048576.0 - adc as f32;
        pres = (pres - var2 / 4096.0) * 6250.0 / var1;
        let var1 = f32::from(self.par_p9) * pres * pres / 2147483648.0;
        let var2 = pres * (f32::from(self.par_p8) / 32768.0);
        let scaled = pres / 256.0;
        let var3 = scaled * scaled * scaled * (f32::from(self.par_p10) / 131072.0);
        pres + (var1 + var2 + var3 + f32::from(self.par_p7) * 128.0) / 16.0
    }

    /// Relative humidity in %, clamped to 0..=100.
    pub fn humidity(&self, adc: u16, t_fine: f32) -> f32 {
        let temp_comp = t_fine / 5120.0;
        let var1 = f32::from(adc)
            - (f32::from(self.par_h1) * 16.0 + f32::from(self.par_h3) / 2.0 * temp_comp);
        let var2 = var1
            * (f32::from(self.par_h2) / 262144.0
                * (1.0
                    + f32::from(self.par_h4) / 16384.0 * temp_comp
                    + f32::from(self.par_h5) / 1048576.0 * temp_comp * temp_comp));
        let var3 = f32::from(self.par_h6) / 16384.0;
        let var4 = f32::from(self.par_h7) / 2097152.0;
        let hum = var2 + (var3 + var4 * temp_comp) * var2 * var2;
        hum.clamp(0.0, 100.0)
    }

    /// Gas resistance in Ω for BME680-style ("gas low") parts.
    pub fn gas_resistance_low(&self, adc: u16, range: u8) -> f32 {
        let range = usize::from(range & 0x0F);
        let var1 = 1340.0 + 5.0 * f32::from(self.range_sw_err);
        let var2 = var1 * (1.0 + GAS_LOW_K1[range] / 100.0);
        let var3 = 1.0 + GAS_LOW_K2[range] / 100.0;
        let range_f = (1u32 << range) as f32;
        1.0 / (var3 * 0.000000125 * range_f * ((f32::from(adc) - 512.0) / var2 + 1.0))
    }

    /// Gas resistance in Ω for BME688 ("gas high") parts.
    pub fn gas_resistance_high(adc: u16, range: u8) -> f32 {
        let var1 = (262144u32 >> (range & 0x0F)) as f32;
        let var2 = 4096.0 + (f32::from(adc) - 512.0) * 3.0;
        1_000_000.0 * var1 / var2
    }

    /// Heater resistance register value for `target_c`, capped at 400 °C.
    pub fn heater_resistance(&self, target_c: u16, ambient_c: f32) -> u8 {
        let temp = f32::from(target_c.min(400));
        let var1 = f32::from(self.par_gh1) / 16.0 + 49.0;
        let var2 = f32::from(self.par_gh2) / 32768.0 * 0.0005 + 0.00235;
        let var3 = f32::from(self.par_gh3) / 1024.0;
        let var4 = var1 * (1.0 + var2 * temp);
        let var5 = var4 + var3 * ambient_c;
        let res = 3.4
            * (var5
                * (4.0 / (4.0 + f32::from(self.res_heat_range)))
                * (1.0 / (1.0 + f32::from(self.res_heat_val) * 0.002))
                - 25.0);
        res.clamp(0.0, 255.0) as u8
    }
}

/// Heater duration register encoding: 6-bit mantissa, 2-bit ×4 multiplier.
pub fn gas_wait(duration_ms: u16) -> u8 {
    if duration_ms >= 0xFC0 {
        return 0xFF;
    }
    let mut dur = duration_ms;
    let mut factor = 0u8;
    while dur > 0x3F {
        dur /= 4;
        factor += 1;
    }
    dur as u8 + factor * 64
}
