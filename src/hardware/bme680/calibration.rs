//! Factory calibration and the Bosch integer compensation formulas.
//!
//! All arithmetic is done in `i64`; the reference implementation is written
//! for `i32` and never overflows it for in-range inputs, so results match.

use super::registers::{calib, COEFF_LEN, RHRANGE_MSK, RSERROR_MSK};

const GAS_LOOKUP_1: [i64; 16] = [
    2147483647, 2147483647, 2147483647, 2147483647, 2147483647, 2126008810, 2147483647,
    2130303777, 2147483647, 2147483647, 2143188679, 2136746228, 2147483647, 2126008810,
    2147483647, 2147483647,
];

const GAS_LOOKUP_2: [i64; 16] = [
    4096000000, 2048000000, 1024000000, 512000000, 255744255, 127110228, 64000000, 32258064,
    16016016, 8000000, 4000000, 2000000, 1000000, 500000, 250000, 125000,
];

/// Per-device trimming coefficients read once at start-up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Calibration {
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

    pub res_heat_range: u8,
    pub res_heat_val: i8,
    pub range_sw_err: i8,
}

fn u16_at(c: &[u8; COEFF_LEN], msb: usize, lsb: usize) -> u16 {
    u16::from_be_bytes([c[msb], c[lsb]])
}

fn i16_at(c: &[u8; COEFF_LEN], msb: usize, lsb: usize) -> i16 {
    i16::from_be_bytes([c[msb], c[lsb]])
}

impl Calibration {
    /// Decodes the 41 coefficient bytes plus the three heater registers.
    pub fn from_registers(
        coeff: &[u8; COEFF_LEN],
        res_heat_range: u8,
        res_heat_val: u8,
        range_sw_err: u8,
    ) -> Self {
        Calibration {
            par_t1: u16_at(coeff, calib::T1_MSB, calib::T1_LSB),
            par_t2: i16_at(coeff, calib::T2_MSB, calib::T2_LSB),
            par_t3: coeff[calib::T3] as i8,

            par_p1: u16_at(coeff, calib::P1_MSB, calib::P1_LSB),
            par_p2: i16_at(coeff, calib::P2_MSB, calib::P2_LSB),
            par_p3: coeff[calib::P3] as i8,
            par_p4: i16_at(coeff, calib::P4_MSB, calib::P4_LSB),
            par_p5: i16_at(coeff, calib::P5_MSB, calib::P5_LSB),
            par_p6: coeff[calib::P6] as i8,
            par_p7: coeff[calib::P7] as i8,
            par_p8: i16_at(coeff, calib::P8_MSB, calib::P8_LSB),
            par_p9: i16_at(coeff, calib::P9_MSB, calib::P9_LSB),
            par_p10: coeff[calib::P10],

            par_h1: ((coeff[calib::H1_MSB] as u16) << 4) | (coeff[calib::H1_LSB] & 0x0F) as u16,
            par_h2: ((coeff[calib::H2_MSB] as u16) << 4) | (coeff[calib::H2_LSB] >> 4) as u16,
            par_h3: coeff[calib::H3] as i8,
            par_h4: coeff[calib::H4] as i8,
            par_h5: coeff[calib::H5] as i8,
            par_h6: coeff[calib::H6],
            par_h7: coeff[calib::H7] as i8,

            par_gh1: coeff[calib::GH1] as i8,
            par_gh2: i16_at(coeff, calib::GH2_MSB, calib::GH2_LSB),
            par_gh3: coeff[calib::GH3] as i8,

            res_heat_range: (res_heat_range & RHRANGE_MSK) / 16,
            res_heat_val: res_heat_val as i8,
            range_sw_err: ((range_sw_err & RSERROR_MSK) as i8) / 16,
        }
    }

    /// Returns `(t_fine, temperature in centi-degrees Celsius)`.
    pub fn compensate_temperature(&self, adc: u32) -> (i64, i64) {
        let adc = adc as i64;
        let var1 = (adc >> 3) - ((self.par_t1 as i64) << 1);
        let var2 = (var1 * self.par_t2 as i64) >> 11;
        let var3 = ((var1 >> 1) * (var1 >> 1)) >> 12;
        let var3 = (var3 * ((self.par_t3 as i64) << 4)) >> 14;
        let t_fine = var2 + var3;
        (t_fine, ((t_fine * 5) + 128) >> 8)
    }

    /// Pressure in Pascal.
    pub fn compensate_pressure(&self, adc: u32, t_fine: i64) -> i64 {
        let mut var1 = (t_fine >> 1) - 64000;
        let mut var2 = ((((var1 >> 2) * (var1 >> 2)) >> 11) * self.par_p6 as i64) >> 2;
        var2 += (var1 * self.par_p5 as i64) << 1;
        var2 = (var2 >> 2) + ((self.par_p4 as i64) << 16);
        var1 = (((((var1 >> 2) * (var1 >> 2)) >> 13) * ((self.par_p3 as i64) << 5)) >> 3)
            + ((self.par_p2 as i64 * var1) >> 1);
        var1 >>= 18;
        var1 = ((32768 + var1) * self.par_p1 as i64) >> 15;
        if var1 == 0 {
            return 0;
        }

        let mut pressure = 1_048_576 - adc as i64;
        pressure = (pressure - (var2 >> 12)) * 3125;
        pressure = if pressure >= (1 << 30) {
            (pressure / var1) << 1
        } else {
            (pressure << 1) / var1
        };

        let var1 = (self.par_p9 as i64 * (((pressure >> 3) * (pressure >> 3)) >> 13)) >> 12;
        let var2 = ((pressure >> 2) * self.par_p8 as i64) >> 13;
        let var3 = ((pressure >> 8) * (pressure >> 8) * (pressure >> 8) * self.par_p10 as i64) >> 17;

        pressure + ((var1 + var2 + var3 + ((self.par_p7 as i64) << 7)) >> 4)
    }

    /// Relative humidity in milli-percent, clamped to 0..=100000.
    pub fn compensate_humidity(&self, adc: u16, t_fine: i64) -> i64 {
        let temp_scaled = ((t_fine * 5) + 128) >> 8;
        let var1 = (adc as i64 - (self.par_h1 as i64 * 16))
            - (((temp_scaled * self.par_h3 as i64) / 100) >> 1);
        let var2 = (self.par_h2 as i64
            * (((temp_scaled * self.par_h4 as i64) / 100)
                + (((temp_scaled * ((temp_scaled * self.par_h5 as i64) / 100)) >> 6) / 100)
                + 16384))
            >> 10;
        let var3 = var1 * var2;
        let var4 = ((self.par_h6 as i64) << 7) + ((temp_scaled * self.par_h7 as i64) / 100);
        let var4 = var4 >> 4;
        let var5 = ((var3 >> 14) * (var3 >> 14)) >> 10;
        let var6 = (var4 * var5) >> 1;
        let humidity = (((var3 + var6) >> 10) * 1000) >> 12;

        humidity.clamp(0, 100_000)
    }

    /// Gas resistance in Ohm.
    pub fn compensate_gas_resistance(&self, adc: u16, range: u8) -> u32 {
        let range = (range & 0x0F) as usize;
        let var1 = ((1340 + 5 * self.range_sw_err as i64) * GAS_LOOKUP_1[range]) >> 16;
        let var2 = ((adc as i64) << 15) - 16_777_216 + var1;
        if var2 == 0 {
            return 0;
        }
        let var3 = (GAS_LOOKUP_2[range] * var1) >> 9;

        ((var3 + (var2 >> 1)) / var2) as u32
    }

    /// Encodes a heater target temperature (°C) into a `res_heat_x` value.
    ///
    /// Targets are clamped to the 200..=400 °C range the heater supports.
    pub fn heater_resistance(&self, target: u16, ambient: i32) -> u8 {
        let target = target.clamp(200, 400) as i64;
        let var1 = ((ambient as i64 * self.par_gh3 as i64) / 1000) * 256;
        let var2 = (self.par_gh1 as i64 + 784)
            * (((((self.par_gh2 as i64 + 154_009) * target * 5) / 100) + 3_276_800) / 10);
        let var3 = var1 + (var2 / 2);
        let var4 = var3 / (self.res_heat_range as i64 + 4);
        let var5 = (131 * self.res_heat_val as i64) + 65536;
        let res_x100 = ((var4 / var5) - 250) * 34;

        ((res_x100 + 50) / 100).clamp(0, u8::MAX as i64) as u8
    }
}

/// Encodes a heater duration in milliseconds into a `gas_wait_x` value.
///
/// The register holds a 6-bit mantissa and a 2-bit multiplier (x1, x4, x16,
/// x64); anything at or above 4032 ms saturates.
pub fn heater_duration(mut duration_ms: u16) -> u8 {
    if duration_ms >= 0xFC0 {
        return 0xFF;
    }

    let mut factor = 0u8;
    while duration_ms > 0x3F {
        duration_ms /= 4;
        factor += 1;
    }
    duration_ms as u8 + factor * 64
}
