//! homesense: 1-Wire and BME680 sensor bridge publishing to MQTT
//!
//! The bridge discovers the sensors attached to a small Linux host once at
//! start-up, then polls them at a fixed interval and publishes every reading
//! as a single MQTT batch.
//!
//! ## Modules
//!
//! * `config`: TOML configuration, validated with the `validator` crate.
//!
//! * `core`: Runtime components:
//!   - Topic naming
//!   - Sensor abstraction, identity and discovery
//!   - The acquisition loop and its publisher seam
//!
//! * `hardware`: sysfs 1-Wire access, I2C bus access and the BME680 driver.
//!
//! * `logger`: `tracing` subscriber setup with console and journald outputs.

pub mod config;
pub mod core;
pub mod hardware;
pub mod logger;
