//! BME680 register map.

pub const I2C_ADDR_PRIMARY: u8 = 0x76;
pub const I2C_ADDR_SECONDARY: u8 = 0x77;

pub const CHIP_ID_ADDR: u8 = 0xD0;
pub const CHIP_ID: u8 = 0x61;

pub const SOFT_RESET_ADDR: u8 = 0xE0;
pub const SOFT_RESET_CMD: u8 = 0xB6;

pub const COEFF_ADDR1: u8 = 0x89;
pub const COEFF_ADDR1_LEN: usize = 25;
pub const COEFF_ADDR2: u8 = 0xE1;
pub const COEFF_ADDR2_LEN: usize = 16;
pub const COEFF_LEN: usize = COEFF_ADDR1_LEN + COEFF_ADDR2_LEN;

pub const RES_HEAT_VAL_ADDR: u8 = 0x00;
pub const RES_HEAT_RANGE_ADDR: u8 = 0x02;
pub const RANGE_SW_ERR_ADDR: u8 = 0x04;

pub const FIELD0_ADDR: u8 = 0x1D;
pub const FIELD_LENGTH: usize = 15;

pub const RES_HEAT0_ADDR: u8 = 0x5A;
pub const GAS_WAIT0_ADDR: u8 = 0x64;

pub const CONF_ODR_RUN_GAS_NBC_ADDR: u8 = 0x71;
pub const CONF_OS_H_ADDR: u8 = 0x72;
pub const CONF_T_P_MODE_ADDR: u8 = 0x74;
pub const CONF_ODR_FILT_ADDR: u8 = 0x75;

pub const OSH_MSK: u8 = 0x07;
pub const OSH_POS: u8 = 0;
pub const OSP_MSK: u8 = 0x1C;
pub const OSP_POS: u8 = 2;
pub const OST_MSK: u8 = 0xE0;
pub const OST_POS: u8 = 5;
pub const FILTER_MSK: u8 = 0x1C;
pub const FILTER_POS: u8 = 2;
pub const RUN_GAS_MSK: u8 = 0x10;
pub const RUN_GAS_POS: u8 = 4;
pub const NBCONV_MSK: u8 = 0x0F;
pub const NBCONV_POS: u8 = 0;
pub const MODE_MSK: u8 = 0x03;
pub const MODE_POS: u8 = 0;
pub const MODE_SLEEP: u8 = 0;
pub const MODE_FORCED: u8 = 1;

pub const NEW_DATA_MSK: u8 = 0x80;
pub const GAS_RANGE_MSK: u8 = 0x0F;
pub const GASM_VALID_MSK: u8 = 0x20;
pub const HEAT_STAB_MSK: u8 = 0x10;

pub const RHRANGE_MSK: u8 = 0x30;
pub const RSERROR_MSK: u8 = 0xF0;

/// Number of heater set-points the chip stores.
pub const HEATER_PROFILES: u8 = 10;

/// Calibration array offsets (concatenation of both coefficient blocks).
pub mod calib {
    pub const T2_LSB: usize = 1;
    pub const T2_MSB: usize = 2;
    pub const T3: usize = 3;
    pub const P1_LSB: usize = 5;
    pub const P1_MSB: usize = 6;
    pub const P2_LSB: usize = 7;
    pub const P2_MSB: usize = 8;
    pub const P3: usize = 9;
    pub const P4_LSB: usize = 11;
    pub const P4_MSB: usize = 12;
    pub const P5_LSB: usize = 13;
    pub const P5_MSB: usize = 14;
    pub const P7: usize = 15;
    pub const P6: usize = 16;
    pub const P8_LSB: usize = 19;
    pub const P8_MSB: usize = 20;
    pub const P9_LSB: usize = 21;
    pub const P9_MSB: usize = 22;
    pub const P10: usize = 23;
    pub const H2_MSB: usize = 25;
    pub const H2_LSB: usize = 26;
    pub const H1_LSB: usize = 26;
    pub const H1_MSB: usize = 27;
    pub const H3: usize = 28;
    pub const H4: usize = 29;
    pub const H5: usize = 30;
    pub const H6: usize = 31;
    pub const H7: usize = 32;
    pub const T1_LSB: usize = 33;
    pub const T1_MSB: usize = 34;
    pub const GH2_LSB: usize = 35;
    pub const GH2_MSB: usize = 36;
    pub const GH1: usize = 37;
    pub const GH3: usize = 38;
}
