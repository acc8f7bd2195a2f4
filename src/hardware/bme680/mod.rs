//! Register-level BME680 driver.
//!
//! Only forced mode is supported: every [`Bme680::get_sensor_data`] call
//! triggers one measurement cycle (temperature, pressure, humidity and, if
//! enabled, a gas measurement with the selected heater profile) and then
//! polls for the result.

pub mod calibration;
pub mod registers;

use embedded_hal::{
    delay::DelayNs,
    i2c::{ErrorKind, I2c},
};
use thiserror::Error;
use tracing::{debug, trace};

use self::{
    calibration::{heater_duration, Calibration},
    registers::*,
};

pub use self::registers::{I2C_ADDR_PRIMARY, I2C_ADDR_SECONDARY};

/// Ambient temperature assumed when encoding heater set-points.
const AMBIENT_TEMPERATURE: i32 = 25;

const POLL_ATTEMPTS: usize = 10;
const POLL_INTERVAL_MS: u32 = 10;
const MODE_ATTEMPTS: usize = 10;
const RESET_DELAY_MS: u32 = 5;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("I2C transfer failed: {kind}")]
    Bus { kind: ErrorKind },

    #[error("Unexpected chip id 0x{found:02x} (expected 0x61)")]
    UnexpectedChipId { found: u8 },

    #[error("Sensor did not enter sleep mode")]
    ModeTimeout,

    #[error("Heater profile {0} out of range (0-9)")]
    InvalidProfile(u8),
}

impl DriverError {
    fn bus<E: embedded_hal::i2c::Error>(err: E) -> Self {
        DriverError::Bus { kind: err.kind() }
    }

    /// True when the failure means nothing answers at the address.
    ///
    /// `i2c-dev` does not report a missing device consistently, so anything it
    /// cannot classify counts as absent too.
    pub fn is_absent(&self) -> bool {
        matches!(
            self,
            DriverError::Bus {
                kind: ErrorKind::NoAcknowledge(_) | ErrorKind::Other
            }
        )
    }
}

/// Oversampling setting for one measurement channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
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
#[repr(u8)]
pub enum FilterSize {
    Size0 = 0,
    Size1 = 1,
    Size3 = 2,
    Size7 = 3,
    Size15 = 4,
    Size31 = 5,
    Size63 = 6,
    Size127 = 7,
}

/// One compensated measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldData {
    /// Degrees Celsius.
    pub temperature: f64,
    /// Hectopascal.
    pub pressure: f64,
    /// Percent relative humidity.
    pub humidity: f64,
    /// Ohm.
    pub gas_resistance: u32,
    pub heat_stable: bool,
    pub gas_valid: bool,
}

pub struct Bme680<I2C, D> {
    i2c: I2C,
    delay: D,
    address: u8,
    calibration: Calibration,
    temperature_os: Oversampling,
    pressure_os: Oversampling,
    humidity_os: Oversampling,
    gas_enabled: bool,
    heater_durations: [u16; HEATER_PROFILES as usize],
    heater_profile: u8,
}

impl<I2C, D> Bme680<I2C, D>
where
    I2C: I2c,
    D: DelayNs,
{
    /// Probes the chip at `address`, resets it and loads its calibration.
    pub fn new(i2c: I2C, delay: D, address: u8) -> Result<Self, DriverError> {
        let mut dev = Self {
            i2c,
            delay,
            address,
            calibration: Calibration::default(),
            temperature_os: Oversampling::Skipped,
            pressure_os: Oversampling::Skipped,
            humidity_os: Oversampling::Skipped,
            gas_enabled: false,
            heater_durations: [0; HEATER_PROFILES as usize],
            heater_profile: 0,
        };

        let found = dev.read_register(CHIP_ID_ADDR)?;
        if found != CHIP_ID {
            return Err(DriverError::UnexpectedChipId { found });
        }

        dev.soft_reset()?;
        dev.enter_sleep_mode()?;
        dev.calibration = dev.read_calibration()?;

        debug!("BME680 initialized at 0x{:02x}", address);
        Ok(dev)
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn set_humidity_oversample(&mut self, value: Oversampling) -> Result<(), DriverError> {
        self.set_bits(CONF_OS_H_ADDR, OSH_MSK, OSH_POS, value as u8)?;
        self.humidity_os = value;
        Ok(())
    }

    pub fn set_pressure_oversample(&mut self, value: Oversampling) -> Result<(), DriverError> {
        self.set_bits(CONF_T_P_MODE_ADDR, OSP_MSK, OSP_POS, value as u8)?;
        self.pressure_os = value;
        Ok(())
    }

    pub fn set_temperature_oversample(&mut self, value: Oversampling) -> Result<(), DriverError> {
        self.set_bits(CONF_T_P_MODE_ADDR, OST_MSK, OST_POS, value as u8)?;
        self.temperature_os = value;
        Ok(())
    }

    pub fn set_filter(&mut self, value: FilterSize) -> Result<(), DriverError> {
        self.set_bits(CONF_ODR_FILT_ADDR, FILTER_MSK, FILTER_POS, value as u8)
    }

    pub fn set_gas_status(&mut self, enabled: bool) -> Result<(), DriverError> {
        self.set_bits(
            CONF_ODR_RUN_GAS_NBC_ADDR,
            RUN_GAS_MSK,
            RUN_GAS_POS,
            enabled as u8,
        )?;
        self.gas_enabled = enabled;
        Ok(())
    }

    /// Sets the heater target temperature (°C) of `profile`.
    pub fn set_gas_heater_temperature(
        &mut self,
        temperature: u16,
        profile: u8,
    ) -> Result<(), DriverError> {
        check_profile(profile)?;
        let value = self
            .calibration
            .heater_resistance(temperature, AMBIENT_TEMPERATURE);
        self.write_register(RES_HEAT0_ADDR + profile, value)
    }

    /// Sets how long (ms) `profile` heats before the gas measurement.
    pub fn set_gas_heater_duration(
        &mut self,
        duration_ms: u16,
        profile: u8,
    ) -> Result<(), DriverError> {
        check_profile(profile)?;
        self.write_register(GAS_WAIT0_ADDR + profile, heater_duration(duration_ms))?;
        self.heater_durations[profile as usize] = duration_ms;
        Ok(())
    }

    pub fn select_gas_heater_profile(&mut self, profile: u8) -> Result<(), DriverError> {
        check_profile(profile)?;
        self.set_bits(CONF_ODR_RUN_GAS_NBC_ADDR, NBCONV_MSK, NBCONV_POS, profile)?;
        self.heater_profile = profile;
        Ok(())
    }

    /// Runs one forced-mode measurement.
    ///
    /// Returns `Ok(None)` when the chip has not flagged new data after the
    /// expected conversion time plus the polling window.
    pub fn get_sensor_data(&mut self) -> Result<Option<FieldData>, DriverError> {
        self.set_bits(CONF_T_P_MODE_ADDR, MODE_MSK, MODE_POS, MODE_FORCED)?;
        let duration = self.measurement_duration_ms();
        self.delay.delay_ms(duration);

        for attempt in 0..POLL_ATTEMPTS {
            let mut regs = [0u8; FIELD_LENGTH];
            self.read_registers(FIELD0_ADDR, &mut regs)?;

            if regs[0] & NEW_DATA_MSK != 0 {
                return Ok(Some(self.compensate(&regs)));
            }

            trace!("BME680 0x{:02x}: no new data (attempt {})", self.address, attempt + 1);
            self.delay.delay_ms(POLL_INTERVAL_MS);
        }

        Ok(None)
    }

    /// Time one forced-mode cycle takes with the current settings.
    pub fn measurement_duration_ms(&self) -> u32 {
        let cycles = self.temperature_os.cycles()
            + self.pressure_os.cycles()
            + self.humidity_os.cycles();

        // 1963 us per conversion, TPH switching and gas measurement overheads
        let micros = cycles * 1963 + 477 * 4 + 477 * 5;
        let mut millis = (micros + 500) / 1000 + 1;

        if self.gas_enabled {
            millis += self.heater_durations[self.heater_profile as usize] as u32;
        }
        millis
    }

    fn compensate(&self, regs: &[u8; FIELD_LENGTH]) -> FieldData {
        let adc_pres = ((regs[2] as u32) << 12) | ((regs[3] as u32) << 4) | ((regs[4] as u32) >> 4);
        let adc_temp = ((regs[5] as u32) << 12) | ((regs[6] as u32) << 4) | ((regs[7] as u32) >> 4);
        let adc_hum = ((regs[8] as u16) << 8) | regs[9] as u16;
        let adc_gas = ((regs[13] as u16) << 2) | ((regs[14] as u16) >> 6);
        let gas_range = regs[14] & GAS_RANGE_MSK;

        let cal = &self.calibration;
        let (t_fine, temperature) = cal.compensate_temperature(adc_temp);
        let pressure = cal.compensate_pressure(adc_pres, t_fine);
        let humidity = cal.compensate_humidity(adc_hum, t_fine);

        FieldData {
            temperature: temperature as f64 / 100.0,
            pressure: pressure as f64 / 100.0,
            humidity: humidity as f64 / 1000.0,
            gas_resistance: cal.compensate_gas_resistance(adc_gas, gas_range),
            heat_stable: regs[14] & HEAT_STAB_MSK != 0,
            gas_valid: regs[14] & GASM_VALID_MSK != 0,
        }
    }

    fn soft_reset(&mut self) -> Result<(), DriverError> {
        self.write_register(SOFT_RESET_ADDR, SOFT_RESET_CMD)?;
        self.delay.delay_ms(RESET_DELAY_MS);
        Ok(())
    }

    fn enter_sleep_mode(&mut self) -> Result<(), DriverError> {
        for _ in 0..MODE_ATTEMPTS {
            let current = self.read_register(CONF_T_P_MODE_ADDR)?;
            if current & MODE_MSK == MODE_SLEEP {
                return Ok(());
            }
            self.write_register(CONF_T_P_MODE_ADDR, current & !MODE_MSK)?;
            self.delay.delay_ms(POLL_INTERVAL_MS);
        }
        Err(DriverError::ModeTimeout)
    }

    fn read_calibration(&mut self) -> Result<Calibration, DriverError> {
        let mut coeff = [0u8; COEFF_LEN];
        let (first, second) = coeff.split_at_mut(COEFF_ADDR1_LEN);
        self.read_registers(COEFF_ADDR1, first)?;
        self.read_registers(COEFF_ADDR2, second)?;

        let heat_range = self.read_register(RES_HEAT_RANGE_ADDR)?;
        let heat_val = self.read_register(RES_HEAT_VAL_ADDR)?;
        let sw_err = self.read_register(RANGE_SW_ERR_ADDR)?;

        Ok(Calibration::from_registers(&coeff, heat_range, heat_val, sw_err))
    }

    fn set_bits(&mut self, register: u8, mask: u8, position: u8, value: u8) -> Result<(), DriverError> {
        let current = self.read_register(register)?;
        let updated = (current & !mask) | ((value << position) & mask);
        self.write_register(register, updated)
    }

    fn read_register(&mut self, register: u8) -> Result<u8, DriverError> {
        let mut buf = [0u8; 1];
        self.read_registers(register, &mut buf)?;
        Ok(buf[0])
    }

    fn read_registers(&mut self, register: u8, buf: &mut [u8]) -> Result<(), DriverError> {
        self.i2c
            .write_read(self.address, &[register], buf)
            .map_err(DriverError::bus)
    }

    fn write_register(&mut self, register: u8, value: u8) -> Result<(), DriverError> {
        self.i2c
            .write(self.address, &[register, value])
            .map_err(DriverError::bus)
    }
}

fn check_profile(profile: u8) -> Result<(), DriverError> {
    if profile < HEATER_PROFILES {
        Ok(())
    } else {
        Err(DriverError::InvalidProfile(profile))
    }
}


#[cfg(test)]
mod tests {
    use embedded_hal::i2c::NoAcknowledgeSource;

    use super::{
        fake::{FakeBus, NoopDelay},
        *,
    };

    fn driver(bus: &FakeBus) -> Bme680<FakeBus, NoopDelay> {
        Bme680::new(bus.clone(), NoopDelay, I2C_ADDR_PRIMARY).unwrap()
    }

    #[test]
    fn test_init_resets_and_loads_calibration() {
        let bus = FakeBus::with_chip(I2C_ADDR_PRIMARY);
        let dev = driver(&bus);

        assert_eq!(dev.address(), I2C_ADDR_PRIMARY);
        assert_eq!(dev.calibration.par_t1, 26174);
        assert_eq!(dev.calibration.par_gh2, -12117);
        assert!(bus.writes().contains(&(SOFT_RESET_ADDR, SOFT_RESET_CMD)));
    }

    #[test]
    fn test_wrong_chip_id() {
        let bus = FakeBus::with_chip(I2C_ADDR_PRIMARY);
        bus.set_register(CHIP_ID_ADDR, 0x60);

        let err = Bme680::new(bus, NoopDelay, I2C_ADDR_PRIMARY).err().unwrap();
        assert!(matches!(err, DriverError::UnexpectedChipId { found: 0x60 }));
        assert!(!err.is_absent());
    }

    #[test]
    fn test_missing_device_is_absent() {
        let bus = FakeBus::with_chip(I2C_ADDR_SECONDARY);

        let err = Bme680::new(bus, NoopDelay, I2C_ADDR_PRIMARY).err().unwrap();
        assert!(err.is_absent());
    }

    #[test]
    fn test_bus_fault_classification() {
        let absent = DriverError::Bus {
            kind: ErrorKind::NoAcknowledge(NoAcknowledgeSource::Unknown),
        };
        let other = DriverError::Bus { kind: ErrorKind::Other };
        let arbitration = DriverError::Bus {
            kind: ErrorKind::ArbitrationLoss,
        };

        assert!(absent.is_absent());
        assert!(other.is_absent());
        assert!(!arbitration.is_absent());
        assert!(!DriverError::ModeTimeout.is_absent());
    }

    #[test]
    fn test_sleep_mode_forced_on_init() {
        let bus = FakeBus::with_chip(I2C_ADDR_PRIMARY);
        bus.set_register(CONF_T_P_MODE_ADDR, 0x55);

        driver(&bus);
        assert_eq!(bus.register(CONF_T_P_MODE_ADDR), 0x54);
    }

    #[test]
    fn test_configuration_registers() {
        let bus = FakeBus::with_chip(I2C_ADDR_PRIMARY);
        let mut dev = driver(&bus);

        dev.set_humidity_oversample(Oversampling::X8).unwrap();
        dev.set_pressure_oversample(Oversampling::X8).unwrap();
        dev.set_temperature_oversample(Oversampling::X8).unwrap();
        dev.set_filter(FilterSize::Size3).unwrap();
        dev.set_gas_status(true).unwrap();
        dev.set_gas_heater_temperature(320, 0).unwrap();
        dev.set_gas_heater_duration(150, 0).unwrap();
        dev.select_gas_heater_profile(0).unwrap();

        assert_eq!(bus.register(CONF_OS_H_ADDR), 0x04);
        assert_eq!(bus.register(CONF_T_P_MODE_ADDR), (4 << 5) | (4 << 2));
        assert_eq!(bus.register(CONF_ODR_FILT_ADDR), 2 << 2);
        assert_eq!(bus.register(CONF_ODR_RUN_GAS_NBC_ADDR), 0x10);
        assert_eq!(bus.register(RES_HEAT0_ADDR), 114);
        assert_eq!(bus.register(GAS_WAIT0_ADDR), 101);
    }

    #[test]
    fn test_invalid_heater_profile() {
        let bus = FakeBus::with_chip(I2C_ADDR_PRIMARY);
        let mut dev = driver(&bus);

        assert!(matches!(
            dev.select_gas_heater_profile(10),
            Err(DriverError::InvalidProfile(10))
        ));
        assert!(dev.set_gas_heater_duration(150, 12).is_err());
    }

    #[test]
    fn test_measurement_duration() {
        let bus = FakeBus::with_chip(I2C_ADDR_PRIMARY);
        let mut dev = driver(&bus);

        dev.set_humidity_oversample(Oversampling::X8).unwrap();
        dev.set_pressure_oversample(Oversampling::X8).unwrap();
        dev.set_temperature_oversample(Oversampling::X8).unwrap();
        // 24 * 1963 + 4293 us
        assert_eq!(dev.measurement_duration_ms(), 52);

        dev.set_gas_status(true).unwrap();
        dev.set_gas_heater_duration(150, 0).unwrap();
        assert_eq!(dev.measurement_duration_ms(), 202);
    }

    #[test]
    fn test_forced_measurement() {
        let bus = FakeBus::with_chip(I2C_ADDR_PRIMARY);
        let mut dev = driver(&bus);

        let data = dev.get_sensor_data().unwrap().unwrap();

        assert_eq!(data.temperature, 25.5);
        assert_eq!(data.pressure, 927.03);
        assert_eq!(data.humidity, 70.492);
        assert_eq!(data.gas_resistance, 271_062);
        assert!(data.heat_stable);
        assert!(data.gas_valid);
        assert_eq!(bus.register(CONF_T_P_MODE_ADDR) & MODE_MSK, MODE_FORCED);
    }

    #[test]
    fn test_unstable_heater_reported() {
        let bus = FakeBus::with_chip(I2C_ADDR_PRIMARY);
        bus.set_measurement(true, false);
        let mut dev = driver(&bus);

        let data = dev.get_sensor_data().unwrap().unwrap();
        assert!(!data.heat_stable);
    }

    #[test]
    fn test_no_new_data() {
        let bus = FakeBus::with_chip(I2C_ADDR_PRIMARY);
        bus.set_measurement(false, true);
        let mut dev = driver(&bus);

        assert!(dev.get_sensor_data().unwrap().is_none());
    }
}
