//! Configuration structures for the broker connection.
//!
//! The `[mqtt]` table of the homesense configuration file deserializes into
//! [`Config`]. Validation happens once at load time through the `validator`
//! crate, so a bad broker address or port is reported before any sensor is
//! touched.
//!
//! # Examples
//!
//! ```toml
//! [mqtt]
//! broker = "mqtt.home.local"
//! port = 1883
//! topic_format = "home/{attribute}/{id}"
//! ```

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Broker connection and topic layout settings.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Config {
    /// Broker hostname or IP address.
    ///
    /// DNS resolution happens when a batch is published, not during validation.
    #[validate(length(
        min = 1,
        max = 255,
        message = "Broker must be between 1 and 255 characters"
    ))]
    pub broker: String,

    /// Broker port number, 1883 for plain MQTT.
    #[validate(range(min = 1, max = 65535, message = "Port must be between 1 and 65535"))]
    pub port: u16,

    /// Template for outgoing topics.
    ///
    /// `{id}` is replaced with the sensor's MQTT id and `{attribute}` with the
    /// measured quantity (`temperature`, `humidity`, ...). The template is only
    /// interpreted when a topic is built.
    #[validate(length(min = 1, message = "Topic format must not be empty"))]
    pub topic_format: String,

    /// Client identifier presented to the broker.
    ///
    /// Empty means a fresh `homesense-<uuid>` id is generated for every batch.
    #[validate(length(max = 36, message = "Client ID must not exceed 36 characters"))]
    pub client_id: String,

    /// Keep-alive interval in seconds for the batch connection.
    #[validate(range(
        min = 5,
        max = 3600,
        message = "Keep alive must be between 5 and 3600 seconds"
    ))]
    pub keep_alive: u64,

    /// Optional broker credentials.
    #[validate(nested)]
    pub credentials: Option<Credentials>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            broker: "localhost".to_string(),
            port: 1883,
            topic_format: "homesense/{id}/{attribute}".to_string(),
            client_id: String::new(),
            keep_alive: 30,
            credentials: None,
        }
    }
}

impl Config {
    /// Returns the configured client id, or a generated one when empty.
    pub fn effective_client_id(&self) -> String {
        if self.client_id.is_empty() {
            let uuid = uuid::Uuid::new_v4().simple().to_string();
            // 10 + 26 chars keeps us under the 36 char limit of older brokers
            format!("homesense-{}", &uuid[..26])
        } else {
            self.client_id.clone()
        }
    }
}

/// Username/password pair sent in the CONNECT packet.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Credentials {
    #[validate(length(min = 1, message = "Username must not be empty"))]
    pub username: String,

    #[validate(custom(function = "validate_password"))]
    pub password: String,
}

fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.len() > u16::MAX as usize {
        return Err(ValidationError::new("password_too_long")
            .with_message("Password must fit in an MQTT string".into()));
    }
    Ok(())
}
