//! In-process event bus.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::events::Channel;
use super::traits::{BusError, BusMessage, EventBus, Subscription};

/// Broadcast-channel bus for single-process setups and tests.
///
/// Keeps a copy of everything published for inspection.
pub struct InMemoryEventBus {
    tx: broadcast::Sender<BusMessage>,
    published: Mutex<Vec<BusMessage>>,
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl InMemoryEventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            published: Mutex::new(Vec::new()),
        }
    }

    /// Every message published so far, oldest first.
    pub fn published(&self) -> Vec<BusMessage> {
        self.published
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    /// Published payloads on one channel, decoded.
    pub fn published_on<T: serde::de::DeserializeOwned>(&self, channel: Channel) -> Vec<T> {
        self.published()
            .into_iter()
            .filter(|m| m.channel == channel)
            .filter_map(|m| serde_json::from_str(&m.payload).ok())
            .collect()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    fn name(&self) -> &str {
        "memory"
    }

    async fn publish(&self, channel: Channel, payload: &str) -> Result<(), BusError> {
        let message = BusMessage {
            channel,
            payload: payload.to_string(),
        };
        if let Ok(mut published) = self.published.lock() {
            published.push(message.clone());
        }
        // No subscribers is not an error on a pub/sub bus.
        let _ = self.tx.send(message);
        Ok(())
    }

    async fn subscribe(&self, channels: &[Channel]) -> Result<Box<dyn Subscription>, BusError> {
        Ok(Box::new(InMemorySubscription {
            rx: self.tx.subscribe(),
            channels: channels.to_vec(),
        }))
    }
}

struct InMemorySubscription {
    rx: broadcast::Receiver<BusMessage>,
    channels: Vec<Channel>,
}

#[async_trait]
impl Subscription for InMemorySubscription {
    async fn next_message(&mut self, timeout: Duration) -> Result<Option<BusMessage>, BusError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match tokio::time::timeout_at(deadline, self.rx.recv()).await {
                Err(_) => return Ok(None),
                Ok(Ok(message)) if self.channels.contains(&message.channel) => {
                    return Ok(Some(message))
                }
                Ok(Ok(_)) => continue,
                Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                    tracing::warn!("Subscriber lagged, {} messages dropped", skipped);
                    continue;
                }
                Ok(Err(broadcast::error::RecvError::Closed)) => return Err(BusError::Closed),
            }
        }
    }
}
