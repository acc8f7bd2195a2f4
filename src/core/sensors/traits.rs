use super::types::{Reading, SensorResult};

/// A sensor the acquisition loop can poll.
///
/// Every call to [`Sensor::readings`] performs a fresh hardware acquisition;
/// an empty vector means the hardware produced nothing trustworthy this
/// cycle.
#[async_trait::async_trait]
pub trait Sensor: Send {
    /// Identity used in outgoing topics. Fixed at discovery.
    fn mqtt_id(&self) -> &str;

    /// Short family label for logs.
    fn kind(&self) -> &'static str;

    async fn readings(&mut self, topic_format: &str) -> SensorResult<Vec<Reading>>;
}
