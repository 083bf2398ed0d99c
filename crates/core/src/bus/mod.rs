//! Pipeline events and the bus that carries them between services.

mod config;
mod events;
mod memory;
mod redis_bus;
mod traits;

pub use config::BusConfig;
pub use events::{
    unix_timestamp, Channel, ConversionComplete, ConversionFailed, DownloadComplete,
    InboundEvent, RetryConversion,
};
pub use memory::InMemoryEventBus;
pub use redis_bus::RedisEventBus;
pub use traits::{publish_event, BusError, BusMessage, EventBus, Subscription};
