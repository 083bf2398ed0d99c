use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use super::events::Channel;
use crate::metrics;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Malformed payload on {channel}: {reason}")]
    MalformedPayload { channel: String, reason: String },

    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    #[error("Subscription closed")]
    Closed,
}

/// One message taken off a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub channel: Channel,
    pub payload: String,
}

/// Publish/subscribe transport for pipeline events.
///
/// Delivery is at-most-once and nothing is persisted.
#[async_trait]
pub trait EventBus: Send + Sync {
    fn name(&self) -> &str;

    async fn publish(&self, channel: Channel, payload: &str) -> Result<(), BusError>;

    async fn subscribe(&self, channels: &[Channel]) -> Result<Box<dyn Subscription>, BusError>;
}

#[async_trait]
pub trait Subscription: Send {
    /// Next message, or `None` when nothing arrived within `timeout`.
    async fn next_message(&mut self, timeout: Duration) -> Result<Option<BusMessage>, BusError>;
}

/// Serialize `event` as JSON and publish it on `channel`.
pub async fn publish_event<T: Serialize + Sync>(
    bus: &dyn EventBus,
    channel: Channel,
    event: &T,
) -> Result<(), BusError> {
    let payload = serde_json::to_string(event)?;
    bus.publish(channel, &payload).await?;
    metrics::BUS_EVENTS
        .with_label_values(&[channel.name(), "published"])
        .inc();
    Ok(())
}
