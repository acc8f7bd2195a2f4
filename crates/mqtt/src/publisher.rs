//! One-shot batch publishing.
//!
//! `Publisher::publish_multiple` opens a connection, sends every message of
//! the batch at QoS 0 without retain, disconnects, and only returns once the
//! DISCONNECT has been written. One call is one logical delivery: either the
//! whole batch was handed to the broker or an error is returned.

use rumqttc::{Event, Outgoing, Packet, QoS};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::{client::ClientBuilder, config::Config, TransferError};

/// A single topic/payload pair ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub topic: String,
    pub payload: String,
}

impl Message {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Publishes batches of messages to the configured broker.
#[derive(Debug, Clone)]
pub struct Publisher {
    config: Config,
}

impl Publisher {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Broker address as `host:port`, for log lines.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.config.broker, self.config.port)
    }

    /// Delivers `messages` over a fresh connection.
    ///
    /// An empty slice is a no-op and never touches the network.
    ///
    /// # Errors
    /// Any connection failure (refused, unreachable, CONNACK rejection) or a
    /// dropped connection before the disconnect is flushed.
    pub async fn publish_multiple(&self, messages: &[Message]) -> Result<(), TransferError> {
        if messages.is_empty() {
            return Ok(());
        }

        let (client, mut event_loop) = ClientBuilder::from_config(&self.config)?
            .capacity(messages.len() + 1)
            .build()?;

        for message in messages {
            client
                .publish(
                    message.topic.as_str(),
                    QoS::AtMostOnce,
                    false,
                    message.payload.clone().into_bytes(),
                )
                .await?;
        }
        client.disconnect().await?;

        let mut sent = 0usize;
        loop {
            match event_loop.poll().await? {
                Event::Incoming(Packet::ConnAck(ack)) => {
                    debug!("Connected to {} ({:?})", self.endpoint(), ack.code);
                }
                Event::Outgoing(Outgoing::Publish(_)) => {
                    sent += 1;
                }
                Event::Outgoing(Outgoing::Disconnect) => {
                    trace!("Flushed {} of {} messages, disconnecting", sent, messages.len());
                    break;
                }
                _ => {}
            }
        }

        debug!("Published {} messages to {}", messages.len(), self.endpoint());
        Ok(())
    }
}
