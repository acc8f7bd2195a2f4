//! 1-Wire temperature probes.

use std::collections::BTreeMap;

use tracing::{debug, info};

use super::{
    traits::Sensor,
    types::{Reading, SensorResult},
};
use crate::{
    core::topic::topic_for,
    hardware::w1::{Probe, W1Bus},
};

pub struct W1Sensor {
    mqtt_id: String,
    probe: Probe,
}

impl W1Sensor {
    pub fn new(mqtt_id: impl Into<String>, probe: Probe) -> Self {
        Self {
            mqtt_id: mqtt_id.into(),
            probe,
        }
    }
}

#[async_trait::async_trait]
impl Sensor for W1Sensor {
    fn mqtt_id(&self) -> &str {
        &self.mqtt_id
    }

    fn kind(&self) -> &'static str {
        "w1"
    }

    async fn readings(&mut self, topic_format: &str) -> SensorResult<Vec<Reading>> {
        let celsius = self.probe.read_celsius().await?;
        let topic = topic_for("temperature", &self.mqtt_id, topic_format)?;
        Ok(vec![Reading::new(topic, celsius)])
    }
}

/// Builds one sensor per thermometer on `bus`.
///
/// `overrides` maps probe ids to topic ids. Without an override a lone probe
/// is named after the host and each of several probes gets
/// `<hostname>_<probe id>`.
pub async fn discover_w1_sensors(
    bus: Option<&W1Bus>,
    hostname: &str,
    overrides: &BTreeMap<String, String>,
) -> SensorResult<Vec<W1Sensor>> {
    let Some(bus) = bus else {
        debug!("1-Wire not available, skipping probe discovery");
        return Ok(Vec::new());
    };

    let probes = bus.probes().await?;
    let single = probes.len() == 1;

    let sensors: Vec<_> = probes
        .into_iter()
        .map(|probe| {
            let mqtt_id = match overrides.get(probe.id()) {
                Some(id) => id.clone(),
                None if single => hostname.to_string(),
                None => format!("{}_{}", hostname, probe.id()),
            };
            info!("1-Wire probe {} published as '{}'", probe.id(), mqtt_id);
            W1Sensor::new(mqtt_id, probe)
        })
        .collect();

    Ok(sensors)
}
