//! BME680 environmental sensors.
//!
//! The gas heater needs a few cycles before its resistance settles, so a poll
//! keeps measuring until the chip reports a stable heater (or gives up after
//! [`STABILIZE_ATTEMPTS`]). Each measurement blocks on the bus and on the
//! heater delay, so it runs on tokio's blocking pool.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use embedded_hal::{delay::DelayNs, i2c::I2c};
use indexmap::IndexMap;
use tracing::{debug, info, trace, warn};

use super::{
    error::SensorError,
    traits::Sensor,
    types::{Reading, SensorResult},
};
use crate::{
    core::topic::topic_for,
    hardware::{
        bme680::{Bme680, DriverError, FieldData, FilterSize, Oversampling, I2C_ADDR_PRIMARY},
        i2c::{parse_i2c_address, I2cBusProvider},
    },
};

pub const STABILIZE_ATTEMPTS: usize = 60;
pub const STABILIZE_INTERVAL: Duration = Duration::from_millis(500);

/// Bus indices probed for the sensor, in order.
const BUS_CANDIDATES: [u8; 2] = [0, 1];

const HEATER_TEMPERATURE: u16 = 320;
const HEATER_DURATION_MS: u16 = 150;
const HEATER_PROFILE: u8 = 0;

/// A device that can take one temperature/humidity/pressure/gas measurement.
pub trait EnvironmentalDevice: Send {
    fn address(&self) -> u8;

    fn measure(&mut self) -> Result<Option<FieldData>, DriverError>;
}

impl<I2C, D> EnvironmentalDevice for Bme680<I2C, D>
where
    I2C: I2c + Send,
    D: DelayNs + Send,
{
    fn address(&self) -> u8 {
        Bme680::address(self)
    }

    fn measure(&mut self) -> Result<Option<FieldData>, DriverError> {
        self.get_sensor_data()
    }
}

/// Applies the fixed measurement profile: 8x oversampling on every channel,
/// IIR filter 3, gas enabled with heater profile 0 at 320 °C for 150 ms.
pub fn configure<I2C, D>(device: &mut Bme680<I2C, D>) -> Result<(), DriverError>
where
    I2C: I2c,
    D: DelayNs,
{
    device.set_humidity_oversample(Oversampling::X8)?;
    device.set_pressure_oversample(Oversampling::X8)?;
    device.set_temperature_oversample(Oversampling::X8)?;
    device.set_filter(FilterSize::Size3)?;
    device.set_gas_status(true)?;
    device.set_gas_heater_temperature(HEATER_TEMPERATURE, HEATER_PROFILE)?;
    device.set_gas_heater_duration(HEATER_DURATION_MS, HEATER_PROFILE)?;
    device.select_gas_heater_profile(HEATER_PROFILE)
}

pub struct EnvironmentalSensor<E> {
    mqtt_id: String,
    address: u8,
    device: Arc<Mutex<E>>,
}

impl<E: EnvironmentalDevice + 'static> EnvironmentalSensor<E> {
    pub fn new(mqtt_id: impl Into<String>, device: E) -> Self {
        Self {
            mqtt_id: mqtt_id.into(),
            address: device.address(),
            device: Arc::new(Mutex::new(device)),
        }
    }

    /// One forced-mode measurement, off the runtime thread.
    async fn measure(&self) -> SensorResult<Option<FieldData>> {
        let device = Arc::clone(&self.device);
        let result = tokio::task::spawn_blocking(move || {
            device
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .measure()
        })
        .await?;

        result.map_err(|source| SensorError::Driver {
            address: self.address,
            source,
        })
    }

    /// Measures until the heater is stable.
    async fn stabilized(&mut self) -> SensorResult<Option<FieldData>> {
        for attempt in 1..=STABILIZE_ATTEMPTS {
            let data = self.measure().await?;

            match data {
                Some(data) if data.heat_stable => {
                    debug!("{}: stable after {} attempt(s)", self.mqtt_id, attempt);
                    return Ok(Some(data));
                }
                Some(_) => trace!("{}: heater not stable (attempt {})", self.mqtt_id, attempt),
                None => trace!("{}: no data (attempt {})", self.mqtt_id, attempt),
            }

            if attempt < STABILIZE_ATTEMPTS {
                tokio::time::sleep(STABILIZE_INTERVAL).await;
            }
        }

        Ok(None)
    }
}

#[async_trait::async_trait]
impl<E: EnvironmentalDevice + 'static> Sensor for EnvironmentalSensor<E> {
    fn mqtt_id(&self) -> &str {
        &self.mqtt_id
    }

    fn kind(&self) -> &'static str {
        "bme680"
    }

    async fn readings(&mut self, topic_format: &str) -> SensorResult<Vec<Reading>> {
        let Some(data) = self.stabilized().await? else {
            warn!(
                "{}: no stable reading after {} attempts",
                self.mqtt_id, STABILIZE_ATTEMPTS
            );
            return Ok(Vec::new());
        };

        let id = &self.mqtt_id;
        Ok(vec![
            Reading::new(topic_for("temperature", id, topic_format)?, data.temperature),
            Reading::new(topic_for("humidity", id, topic_format)?, data.humidity),
            Reading::new(topic_for("pressure", id, topic_format)?, data.pressure),
            Reading::new(
                topic_for("gas_resistance", id, topic_format)?,
                data.gas_resistance,
            ),
        ])
    }
}

/// Finds the I2C bus and builds the BME680 sensors.
///
/// Both candidate buses are tried and the last one that opens wins. With
/// explicit `configured` addresses every entry must initialize, in the order
/// given. Without, a single sensor at the default address named `hostname`
/// is attempted and a missing bus or device just yields no sensors.
pub fn discover_environmental_sensors<P, D>(
    provider: &P,
    configured: &IndexMap<String, String>,
    hostname: &str,
    mut make_delay: impl FnMut() -> D,
) -> SensorResult<Vec<Box<dyn Sensor>>>
where
    P: I2cBusProvider,
    D: DelayNs + Send + 'static,
{
    let mut selected = None;
    for index in BUS_CANDIDATES {
        match provider.open(index) {
            Ok(bus) => {
                debug!("Opened I2C bus {}", index);
                selected = Some((index, bus));
            }
            Err(e) if e.is_not_found() => trace!("{}", e),
            Err(e) => return Err(e.into()),
        }
    }

    let mut sensors: Vec<Box<dyn Sensor>> = Vec::new();

    if configured.is_empty() {
        let Some((index, bus)) = selected else {
            debug!("No I2C bus found, skipping BME680 discovery");
            return Ok(sensors);
        };

        let device = Bme680::new(bus, make_delay(), I2C_ADDR_PRIMARY)
            .and_then(|mut device| configure(&mut device).map(|_| device));
        let device = match device {
            Ok(device) => device,
            Err(e) if e.is_absent() => {
                debug!(
                    "No BME680 at 0x{:02x} on bus {}: {}",
                    I2C_ADDR_PRIMARY, index, e
                );
                return Ok(sensors);
            }
            Err(source) => {
                return Err(SensorError::Driver {
                    address: I2C_ADDR_PRIMARY,
                    source,
                })
            }
        };

        info!(
            "BME680 0x{:02x} on bus {} published as '{}'",
            I2C_ADDR_PRIMARY, index, hostname
        );
        sensors.push(Box::new(EnvironmentalSensor::new(hostname, device)));
        return Ok(sensors);
    }

    let Some((index, bus)) = selected else {
        return Err(SensorError::NoBus);
    };

    let mut scanned = Some(bus);
    for (raw, mqtt_id) in configured {
        let address =
            parse_i2c_address(raw).ok_or_else(|| SensorError::InvalidAddress(raw.clone()))?;
        let bus = match scanned.take() {
            Some(bus) => bus,
            None => provider.open(index)?,
        };

        let device = Bme680::new(bus, make_delay(), address)
            .and_then(|mut device| configure(&mut device).map(|_| device))
            .map_err(|source| SensorError::Driver { address, source })?;

        info!(
            "BME680 0x{:02x} on bus {} published as '{}'",
            device.address(),
            index,
            mqtt_id
        );
        sensors.push(Box::new(EnvironmentalSensor::new(mqtt_id.as_str(), device)));
    }

    Ok(sensors)
}

#[cfg(test)]
mod tests {
    use std::{
        collections::BTreeMap,
        sync::{mpsc, Mutex},
    };

    use embedded_hal::i2c::ErrorKind;
    use tokio::time::Instant;

    use super::*;
    use embedded_hal::i2c::NoAcknowledgeSource;

    use crate::hardware::{
        bme680::{
            fake::{FakeBus, NoopDelay},
            registers::CONF_OS_H_ADDR,
            I2C_ADDR_SECONDARY,
        },
        i2c::BusError,
    };

    /// Reports a stable heater on the given attempt (1-based), never if `None`.
    struct ScriptedDevice {
        stable_on: Option<usize>,
        calls: usize,
    }

    impl ScriptedDevice {
        fn new(stable_on: Option<usize>) -> Self {
            Self { stable_on, calls: 0 }
        }
    }

    impl EnvironmentalDevice for ScriptedDevice {
        fn address(&self) -> u8 {
            0x76
        }

        fn measure(&mut self) -> Result<Option<FieldData>, DriverError> {
            self.calls += 1;
            Ok(Some(FieldData {
                temperature: 21.0,
                pressure: 1013.25,
                humidity: 45.5,
                gas_resistance: 118_000,
                heat_stable: self.stable_on == Some(self.calls),
                gas_valid: true,
            }))
        }
    }

    struct FailingDevice;

    impl EnvironmentalDevice for FailingDevice {
        fn address(&self) -> u8 {
            0x77
        }

        fn measure(&mut self) -> Result<Option<FieldData>, DriverError> {
            Err(DriverError::Bus {
                kind: ErrorKind::ArbitrationLoss,
            })
        }
    }

    /// Holds its measurement until the test signals from the async side.
    struct GatedDevice {
        gate: mpsc::Receiver<()>,
        released: bool,
    }

    impl EnvironmentalDevice for GatedDevice {
        fn address(&self) -> u8 {
            0x76
        }

        fn measure(&mut self) -> Result<Option<FieldData>, DriverError> {
            self.released = self.gate.recv_timeout(Duration::from_secs(5)).is_ok();
            ScriptedDevice::new(Some(1)).measure()
        }
    }

    struct FakeProvider {
        buses: BTreeMap<u8, FakeBus>,
        broken: Option<u8>,
        opened: Mutex<Vec<u8>>,
    }

    impl FakeProvider {
        fn new(buses: impl IntoIterator<Item = (u8, FakeBus)>) -> Self {
            Self {
                buses: buses.into_iter().collect(),
                broken: None,
                opened: Mutex::new(Vec::new()),
            }
        }

        fn opened(&self) -> Vec<u8> {
            self.opened.lock().unwrap().clone()
        }
    }

    impl I2cBusProvider for FakeProvider {
        type Bus = FakeBus;

        fn open(&self, index: u8) -> Result<FakeBus, BusError> {
            self.opened.lock().unwrap().push(index);
            if self.broken == Some(index) {
                return Err(BusError::Open {
                    index,
                    reason: "Permission denied".into(),
                });
            }
            self.buses
                .get(&index)
                .cloned()
                .ok_or(BusError::NotFound { index })
        }
    }

    fn configured(entries: &[(&str, &str)]) -> IndexMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn discover(
        provider: &FakeProvider,
        entries: &[(&str, &str)],
    ) -> SensorResult<Vec<Box<dyn Sensor>>> {
        discover_environmental_sensors(provider, &configured(entries), "pi1", || NoopDelay)
    }

    #[tokio::test(start_paused = true)]
    async fn test_stable_on_last_attempt() {
        let mut sensor =
            EnvironmentalSensor::new("lounge", ScriptedDevice::new(Some(STABILIZE_ATTEMPTS)));

        let start = Instant::now();
        let readings = sensor.readings("home/{attribute}/{id}").await.unwrap();

        assert_eq!(sensor.device.lock().unwrap().calls, STABILIZE_ATTEMPTS);
        assert_eq!(start.elapsed(), STABILIZE_INTERVAL * (STABILIZE_ATTEMPTS as u32 - 1));

        let pairs: Vec<_> = readings
            .iter()
            .map(|r| (r.topic.as_str(), r.payload()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("home/temperature/lounge", "21.0".to_string()),
                ("home/humidity/lounge", "45.5".to_string()),
                ("home/pressure/lounge", "1013.25".to_string()),
                ("home/gas_resistance/lounge", "118000".to_string()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_stable_yields_nothing() {
        let mut sensor = EnvironmentalSensor::new("lounge", ScriptedDevice::new(None));

        let readings = sensor.readings("{id}/{attribute}").await.unwrap();

        assert!(readings.is_empty());
        assert_eq!(sensor.device.lock().unwrap().calls, STABILIZE_ATTEMPTS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stable_immediately_does_not_wait() {
        let mut sensor = EnvironmentalSensor::new("lounge", ScriptedDevice::new(Some(1)));

        let start = Instant::now();
        let readings = sensor.readings("{id}/{attribute}").await.unwrap();

        assert_eq!(readings.len(), 4);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_measurement_leaves_runtime_responsive() {
        let (tx, gate) = mpsc::channel();
        let mut sensor = EnvironmentalSensor::new(
            "lounge",
            GatedDevice {
                gate,
                released: false,
            },
        );

        let (readings, _) = tokio::join!(sensor.readings("{id}/{attribute}"), async move {
            tx.send(()).unwrap();
        });

        assert_eq!(readings.unwrap().len(), 4);
        assert!(sensor.device.lock().unwrap().released);
    }

    #[tokio::test]
    async fn test_measurement_error_propagates() {
        let mut sensor = EnvironmentalSensor::new("lounge", FailingDevice);

        let err = sensor.readings("{id}/{attribute}").await.unwrap_err();
        assert!(matches!(err, SensorError::Driver { address: 0x77, .. }));
    }

    #[test]
    fn test_configure_applies_profile() {
        let bus = FakeBus::with_chip(I2C_ADDR_PRIMARY);
        let mut device = Bme680::new(bus.clone(), NoopDelay, I2C_ADDR_PRIMARY).unwrap();

        configure(&mut device).unwrap();

        assert_eq!(device.measurement_duration_ms(), 202);
        assert_eq!(bus.register(0x72), 0x04);
        assert_eq!(bus.register(0x71), 0x10);
    }

    #[tokio::test]
    async fn test_default_sensor_on_last_bus() {
        let provider = FakeProvider::new([
            (0, FakeBus::empty()),
            (1, FakeBus::with_chip(I2C_ADDR_PRIMARY)),
        ]);

        let mut sensors = discover(&provider, &[]).unwrap();

        assert_eq!(provider.opened(), vec![0, 1]);
        assert_eq!(sensors.len(), 1);
        assert_eq!(sensors[0].mqtt_id(), "pi1");
        assert_eq!(sensors[0].kind(), "bme680");

        let payloads: Vec<_> = sensors[0]
            .readings("{id}/{attribute}")
            .await
            .unwrap()
            .iter()
            .map(|r| r.payload())
            .collect();
        assert_eq!(payloads, vec!["25.5", "70.492", "927.03", "271062"]);
    }

    #[test]
    fn test_absent_default_device_during_configure_yields_nothing() {
        let bus = FakeBus::with_chip(I2C_ADDR_PRIMARY).rejecting_writes_to(
            CONF_OS_H_ADDR,
            ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data),
        );
        let provider = FakeProvider::new([(1, bus)]);

        assert!(discover(&provider, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_default_device_configure_fault_propagates() {
        let bus = FakeBus::with_chip(I2C_ADDR_PRIMARY)
            .rejecting_writes_to(CONF_OS_H_ADDR, ErrorKind::ArbitrationLoss);
        let provider = FakeProvider::new([(1, bus)]);

        let err = discover(&provider, &[]).err().unwrap();
        assert!(matches!(
            err,
            SensorError::Driver {
                source: DriverError::Bus {
                    kind: ErrorKind::ArbitrationLoss
                },
                ..
            }
        ));
    }

    #[test]
    fn test_earlier_bus_kept_when_later_missing() {
        let bus0 = FakeBus::with_chip(I2C_ADDR_PRIMARY);
        let provider = FakeProvider::new([(0, bus0.clone())]);

        let sensors = discover(&provider, &[]).unwrap();

        assert_eq!(sensors.len(), 1);
        assert!(bus0.has_written(I2C_ADDR_PRIMARY));
    }

    #[test]
    fn test_no_bus_no_config_yields_nothing() {
        let provider = FakeProvider::new([]);
        assert!(discover(&provider, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_absent_default_device_yields_nothing() {
        let provider = FakeProvider::new([(1, FakeBus::empty())]);
        assert!(discover(&provider, &[]).unwrap().is_empty());

        let provider = FakeProvider::new([(1, FakeBus::failing(ErrorKind::Other))]);
        assert!(discover(&provider, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_default_device_with_wrong_chip_id_propagates() {
        let bus = FakeBus::with_chip(I2C_ADDR_PRIMARY);
        bus.set_register(0xD0, 0x55);
        let provider = FakeProvider::new([(1, bus)]);

        let err = discover(&provider, &[]).err().unwrap();
        assert!(matches!(
            err,
            SensorError::Driver {
                source: DriverError::UnexpectedChipId { found: 0x55 },
                ..
            }
        ));
    }

    #[test]
    fn test_default_device_bus_fault_propagates() {
        let provider = FakeProvider::new([(0, FakeBus::failing(ErrorKind::ArbitrationLoss))]);
        assert!(discover(&provider, &[]).is_err());
    }

    #[test]
    fn test_bus_open_failure_propagates() {
        let mut provider = FakeProvider::new([(0, FakeBus::with_chip(I2C_ADDR_PRIMARY))]);
        provider.broken = Some(1);

        let err = discover(&provider, &[]).err().unwrap();
        assert!(matches!(err, SensorError::Bus(BusError::Open { index: 1, .. })));
    }

    #[test]
    fn test_configured_sensors_each_get_a_bus_handle() {
        let bus = FakeBus::with_chip(I2C_ADDR_PRIMARY);
        bus.add_chip(I2C_ADDR_SECONDARY);
        let provider = FakeProvider::new([(1, bus.clone())]);

        let sensors = discover(&provider, &[("0x76", "lounge"), ("77", "bedroom")]).unwrap();

        let ids: Vec<_> = sensors.iter().map(|s| s.mqtt_id()).collect();
        assert_eq!(ids, vec!["lounge", "bedroom"]);
        // scan opens 0 and 1, the second sensor reopens 1
        assert_eq!(provider.opened(), vec![0, 1, 1]);
        assert!(bus.has_written(I2C_ADDR_PRIMARY));
        assert!(bus.has_written(I2C_ADDR_SECONDARY));
    }

    #[test]
    fn test_configured_sensors_follow_file_order() {
        let bus = FakeBus::with_chip(I2C_ADDR_PRIMARY);
        bus.add_chip(I2C_ADDR_SECONDARY);
        let provider = FakeProvider::new([(1, bus)]);
        let config = crate::config::Config::parse(
            "[bme680sensors]\n\"77\" = \"lounge\"\n\"0x76\" = \"bedroom\"\n",
        )
        .unwrap();

        let sensors =
            discover_environmental_sensors(&provider, &config.bme680sensors, "pi1", || NoopDelay)
                .unwrap();

        let ids: Vec<_> = sensors.iter().map(|s| s.mqtt_id()).collect();
        assert_eq!(ids, vec!["lounge", "bedroom"]);
    }

    #[test]
    fn test_configured_without_bus_is_fatal() {
        let provider = FakeProvider::new([]);

        let err = discover(&provider, &[("0x77", "lounge")]).err().unwrap();
        assert!(matches!(err, SensorError::NoBus));
    }

    #[test]
    fn test_configured_missing_device_is_fatal() {
        let provider = FakeProvider::new([(1, FakeBus::with_chip(I2C_ADDR_PRIMARY))]);

        let err = discover(&provider, &[("0x77", "lounge")]).err().unwrap();
        assert!(matches!(err, SensorError::Driver { address: 0x77, .. }));
    }

    #[test]
    fn test_configured_invalid_address() {
        let provider = FakeProvider::new([(1, FakeBus::with_chip(I2C_ADDR_PRIMARY))]);

        let err = discover(&provider, &[("lounge", "0x77")]).err().unwrap();
        assert!(matches!(err, SensorError::InvalidAddress(ref raw) if raw == "lounge"));
    }
}
