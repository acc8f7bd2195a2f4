//! # homesense-mqtt: batch delivery of sensor readings
//!
//! A small layer over `rumqttc` for a bridge that wakes up, publishes a
//! handful of readings and goes back to sleep. There is no long-lived session:
//! every batch gets its own connection, which matches how the bridge treats
//! broker failures (fatal, restarted by the supervisor).
//!
//! ```ignore
//! use homesense_mqtt::{Config, Message, Publisher};
//!
//! let publisher = Publisher::new(Config {
//!     broker: "mqtt.home.local".into(),
//!     ..Default::default()
//! });
//!
//! publisher
//!     .publish_multiple(&[Message::new("home/temperature/attic", "21.5")])
//!     .await?;
//! ```
//!
//! # Architecture
//!
//! ```text
//! Publisher::publish_multiple
//!        │
//!        ▼
//! ClientBuilder (Config → MqttOptions)
//!        │
//!        ▼
//! rumqttc AsyncClient + EventLoop
//!        │
//!        ▼
//! TCP connection to the broker
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod publisher;

pub use client::ClientBuilder;
pub use config::{Config, Credentials};
pub use error::TransferError;
pub use publisher::{Message, Publisher};

/// Result type for MQTT operations.
pub type Result<T> = std::result::Result<T, TransferError>;
