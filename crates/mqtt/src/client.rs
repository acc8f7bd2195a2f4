//! MQTT client builder.
//!
//! `ClientBuilder` turns a validated [`Config`] into rumqttc's
//! `AsyncClient`/`EventLoop` pair. The bridge opens a fresh connection for
//! every batch, so the builder also lets the caller size the request channel
//! to the batch being sent.
//!
//! # Examples
//!
//! ```ignore
//! let (client, event_loop) = ClientBuilder::from_config(&config)?
//!     .capacity(batch.len() + 1)
//!     .build()?;
//! ```

use std::time::Duration;

use rumqttc::{AsyncClient, EventLoop, MqttOptions};
use validator::Validate;

use super::{config::Config, error::TransferError};

/// Builder for constructing MQTT clients with a fluent API.
///
/// The builder is consumed by `build()`, which returns both the client and
/// its event loop. The client queues requests; nothing reaches the network
/// until the event loop is polled.
pub struct ClientBuilder {
    /// MQTT protocol options (host, port, keep-alive, credentials)
    opts: MqttOptions,

    /// Capacity of the request channel between client and event loop
    cap: usize,
}

impl ClientBuilder {
    /// Creates a builder with plain TCP transport and default options.
    ///
    /// # Errors
    /// Returns `TransferError::ClientSetup` if `client_id` is empty.
    pub fn new(
        client_id: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        cap: usize,
    ) -> Result<Self, TransferError> {
        let client_id = client_id.into();
        if client_id.is_empty() {
            return Err(TransferError::ClientSetup("client id must not be empty".into()));
        }

        Ok(Self {
            opts: MqttOptions::new(client_id, host, port),
            cap: cap.max(1),
        })
    }

    /// Creates a builder from the `[mqtt]` configuration table.
    ///
    /// The configuration is validated again here so a builder can never be
    /// created from out-of-range values.
    pub fn from_config(config: &Config) -> Result<Self, TransferError> {
        config.validate()?;

        let mut builder = Self::new(
            config.effective_client_id(),
            config.broker.clone(),
            config.port,
            10,
        )?
        .keep_alive(config.keep_alive)
        .clean_session(true);

        if let Some(credentials) = &config.credentials {
            builder = builder.credentials(&credentials.username, &credentials.password);
        }

        Ok(builder)
    }

    /// Sets the keep-alive interval (in seconds).
    pub fn keep_alive(mut self, secs: u64) -> Self {
        self.opts.set_keep_alive(Duration::from_secs(secs));
        self
    }

    /// Configures whether to request a clean session from the broker.
    pub fn clean_session(mut self, clean: bool) -> Self {
        self.opts.set_clean_session(clean);
        self
    }

    /// Sets broker authentication credentials.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.opts.set_credentials(username, password);
        self
    }

    /// Overrides the request channel capacity.
    ///
    /// A batch publisher queues every publish plus the final disconnect before
    /// polling the event loop, so the capacity must cover all of them.
    pub fn capacity(mut self, cap: usize) -> Self {
        self.cap = cap.max(1);
        self
    }

    /// Constructs the MQTT client and event loop.
    pub fn build(self) -> Result<(AsyncClient, EventLoop), TransferError> {
        let (client, event_loop) = AsyncClient::new(self.opts, self.cap);
        Ok((client, event_loop))
    }
}
