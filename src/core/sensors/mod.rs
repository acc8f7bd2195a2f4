//! Sensor abstraction and discovery.
//!
//! Two families are supported: 1-Wire temperature probes ([`w1`]) and BME680
//! environmental sensors ([`environmental`]). Both are discovered once at
//! start-up and polled through the [`Sensor`] trait afterwards.

pub mod environmental;
pub mod error;
pub mod identity;
pub mod traits;
pub mod types;
pub mod w1;

use std::collections::BTreeMap;

use embedded_hal::delay::DelayNs;
use indexmap::IndexMap;
use tracing::info;

pub use error::SensorError;
pub use traits::Sensor;
pub use types::{Reading, ReadingValue, SensorResult};

use crate::hardware::{i2c::I2cBusProvider, w1::W1Bus};

/// Where discovery looks and how it names what it finds.
pub struct Discovery<'a, P> {
    pub i2c: &'a P,
    pub w1: Option<&'a W1Bus>,
    pub hostname: &'a str,
    pub w1_overrides: &'a BTreeMap<String, String>,
    pub bme680_addresses: &'a IndexMap<String, String>,
}

impl<P: I2cBusProvider> Discovery<'_, P> {
    /// Finds BME680 sensors first, then 1-Wire probes.
    pub async fn run<D>(&self, make_delay: impl FnMut() -> D) -> SensorResult<Vec<Box<dyn Sensor>>>
    where
        D: DelayNs + Send + 'static,
    {
        let mut sensors = environmental::discover_environmental_sensors(
            self.i2c,
            self.bme680_addresses,
            self.hostname,
            make_delay,
        )?;

        let probes = w1::discover_w1_sensors(self.w1, self.hostname, self.w1_overrides).await?;
        sensors.extend(probes.into_iter().map(|s| Box::new(s) as Box<dyn Sensor>));

        info!("Discovered {} sensor(s)", sensors.len());
        Ok(sensors)
    }
}
