use thiserror::Error;

use crate::{
    core::topic::TopicError,
    hardware::{bme680::DriverError, i2c::BusError, w1::W1Error},
};

/// Errors raised while discovering or polling sensors.
#[derive(Error, Debug)]
pub enum SensorError {
    #[error(transparent)]
    W1(#[from] W1Error),

    #[error(transparent)]
    Bus(#[from] BusError),

    /// The BME680 at `address` failed to initialize or measure.
    #[error("BME680 at 0x{address:02x}: {source}")]
    Driver {
        address: u8,
        #[source]
        source: DriverError,
    },

    #[error(transparent)]
    Topic(#[from] TopicError),

    /// A `bme680sensors` key is not a hexadecimal I2C address.
    #[error("Invalid I2C address '{0}' in bme680sensors")]
    InvalidAddress(String),

    /// A blocking measurement task panicked or was cancelled.
    #[error("Measurement task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// BME680 sensors are configured but no I2C bus exists.
    #[error("No I2C bus available for configured BME680 sensors")]
    NoBus,
}
