//! Acquisition loop.
//!
//! The `Executor` owns every discovered sensor, polls them one after another,
//! hands the combined batch to the publisher and sleeps for the configured
//! delay. It never stops on its own: the first sensor or publisher error ends
//! the loop and is returned to the caller.

use std::{convert::Infallible, sync::Arc, time::Duration};

use homesense_mqtt::Message;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, trace};

use super::sensors::{Sensor, SensorError};

/// Trait for publishers that deliver a batch of messages to the broker.
#[async_trait::async_trait]
pub trait Publisher: Send + Sync {
    /// Delivers a non-empty batch, preserving order.
    async fn publish(
        &self,
        messages: &[Message],
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("No sensors found")]
    NoSensors,

    #[error("Sensor '{id}' failed")]
    Sensor {
        id: String,
        #[source]
        source: SensorError,
    },

    #[error("Failed to publish readings")]
    Publish(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Executor that periodically polls sensors and publishes their readings.
pub struct Executor {
    sensors: Vec<Box<dyn Sensor>>,
    publisher: Arc<dyn Publisher>,
    interval: Duration,
    topic_format: String,
}

impl Executor {
    /// Creates a new executor.
    ///
    /// # Errors
    /// `ExecutorError::NoSensors` when discovery came back empty; there is
    /// nothing to poll.
    pub fn new(
        sensors: Vec<Box<dyn Sensor>>,
        publisher: Arc<dyn Publisher>,
        interval: Duration,
        topic_format: impl Into<String>,
    ) -> Result<Self, ExecutorError> {
        if sensors.is_empty() {
            return Err(ExecutorError::NoSensors);
        }

        Ok(Self {
            sensors,
            publisher,
            interval,
            topic_format: topic_format.into(),
        })
    }

    pub fn sensor_ids(&self) -> Vec<&str> {
        self.sensors.iter().map(|s| s.mqtt_id()).collect()
    }

    /// Reads every sensor once and returns the combined batch.
    pub async fn poll_once(&mut self) -> Result<Vec<Message>, ExecutorError> {
        let mut batch = Vec::new();

        for sensor in self.sensors.iter_mut() {
            let readings = sensor
                .readings(&self.topic_format)
                .await
                .map_err(|source| ExecutorError::Sensor {
                    id: sensor.mqtt_id().to_string(),
                    source,
                })?;

            trace!(
                "{} sensor '{}' returned {} reading(s)",
                sensor.kind(),
                sensor.mqtt_id(),
                readings.len()
            );
            batch.extend(
                readings
                    .into_iter()
                    .map(|r| Message::new(r.topic.clone(), r.payload())),
            );
        }

        Ok(batch)
    }

    /// Runs the poll/publish loop until an error occurs.
    pub async fn run(mut self) -> Result<Infallible, ExecutorError> {
        info!(
            "Polling {} sensor(s) every {}s",
            self.sensors.len(),
            self.interval.as_secs()
        );

        loop {
            let start = Instant::now();
            let batch = self.poll_once().await?;

            if batch.is_empty() {
                debug!("No readings to publish this cycle");
            } else {
                self.publisher
                    .publish(&batch)
                    .await
                    .map_err(ExecutorError::Publish)?;
                debug!(
                    "Published {} reading(s) in {:?}",
                    batch.len(),
                    start.elapsed()
                );
            }

            sleep(self.interval).await;
        }
    }
}

/// MQTT-specific publisher implementation.
#[async_trait::async_trait]
impl Publisher for homesense_mqtt::Publisher {
    async fn publish(
        &self,
        messages: &[Message],
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.publish_multiple(messages)
            .await
            .map_err(|e| Box::new(e) as _)
    }
}
