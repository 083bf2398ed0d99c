use serde::{Deserialize, Serialize};

/// Redis pub/sub connection and channel naming.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Channels are named `{channel_prefix}:{event}`.
    #[serde(default = "default_channel_prefix")]
    pub channel_prefix: String,

    /// How long a subscriber waits for a message before checking for shutdown.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_ms: u64,
}

fn default_redis_url() -> String {
    "redis://redis:6379/0".to_string()
}

fn default_channel_prefix() -> String {
    "audiobook".to_string()
}

fn default_poll_timeout() -> u64 {
    1000
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            channel_prefix: default_channel_prefix(),
            poll_timeout_ms: default_poll_timeout(),
        }
    }
}
