//! Redis pub/sub event bus.

use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Msg};
use tracing::{debug, info, warn};

use super::config::BusConfig;
use super::events::Channel;
use super::traits::{BusError, BusMessage, EventBus, Subscription};

pub struct RedisEventBus {
    client: redis::Client,
    publisher: ConnectionManager,
    prefix: String,
}

impl fmt::Debug for RedisEventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisEventBus")
            .field("connection", &"ConnectionManager")
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl RedisEventBus {
    pub async fn connect(config: &BusConfig) -> Result<Self, BusError> {
        info!("Connecting to Redis at {}", config.redis_url);
        let client = redis::Client::open(config.redis_url.as_str())?;
        let publisher = ConnectionManager::new(client.clone()).await?;
        info!("Successfully connected to Redis");

        Ok(Self {
            client,
            publisher,
            prefix: config.channel_prefix.clone(),
        })
    }
}

#[async_trait]
impl EventBus for RedisEventBus {
    fn name(&self) -> &str {
        "redis"
    }

    async fn publish(&self, channel: Channel, payload: &str) -> Result<(), BusError> {
        let name = channel.qualified(&self.prefix);
        debug!("PUBLISH {}: {}", name, payload);
        let mut conn = self.publisher.clone();
        let receivers: i64 = conn.publish(&name, payload).await?;
        if receivers == 0 {
            debug!("No subscribers on {}", name);
        }
        Ok(())
    }

    async fn subscribe(&self, channels: &[Channel]) -> Result<Box<dyn Subscription>, BusError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        for channel in channels {
            let name = channel.qualified(&self.prefix);
            pubsub.subscribe(&name).await?;
            info!("Subscribed to {}", name);
        }

        Ok(Box::new(RedisSubscription {
            stream: Box::pin(pubsub.into_on_message()),
            prefix: self.prefix.clone(),
        }))
    }
}

struct RedisSubscription {
    stream: Pin<Box<dyn Stream<Item = Msg> + Send>>,
    prefix: String,
}

#[async_trait]
impl Subscription for RedisSubscription {
    async fn next_message(&mut self, timeout: Duration) -> Result<Option<BusMessage>, BusError> {
        let msg = match tokio::time::timeout(timeout, self.stream.next()).await {
            Err(_) => return Ok(None),
            Ok(None) => return Err(BusError::Closed),
            Ok(Some(msg)) => msg,
        };

        let name = msg.get_channel_name();
        let Some(channel) = Channel::from_qualified(&self.prefix, name) else {
            warn!("Message on unexpected channel {}", name);
            return Ok(None);
        };
        let payload: String = msg.get_payload()?;
        Ok(Some(BusMessage { channel, payload }))
    }
}
