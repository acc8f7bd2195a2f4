//! Error type for MQTT batch delivery.
//!
//! `TransferError` aggregates configuration, client and connection failures
//! into one type. The bridge treats every variant as fatal: a batch that could
//! not be delivered ends the process and supervision restarts it.

use thiserror::Error;

/// The unified error type for MQTT transfer operations.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Client options could not be assembled from the configuration.
    #[error("Client setup error: {0}")]
    ClientSetup(String),

    /// Configuration validation failed.
    #[error("Configuration error: {0}")]
    ConfigError(#[from] validator::ValidationErrors),

    /// The local client could not queue a request for the event loop.
    #[error("Client transfer error: {0}")]
    ClientTransfer(#[from] rumqttc::ClientError),

    /// Connecting to the broker failed or the connection dropped mid-batch.
    ///
    /// Boxed because `rumqttc::ConnectionError` is large.
    #[error("Client connection error: {0}")]
    ClientConnection(#[from] Box<rumqttc::ConnectionError>),
}

impl From<rumqttc::ConnectionError> for TransferError {
    fn from(err: rumqttc::ConnectionError) -> Self {
        TransferError::ClientConnection(Box::new(err))
    }
}
