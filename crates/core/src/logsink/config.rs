use serde::{Deserialize, Serialize};

/// External log sink (`POST {api_url}/logs/external`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSinkConfig {
    /// Base URL of the log API. Shipping is disabled when unset.
    #[serde(default)]
    pub api_url: Option<String>,

    /// Records queued before new ones are dropped.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Delivery attempts per record.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the second attempt; doubles each retry (milliseconds).
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_buffer_size() -> usize {
    256
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff() -> u64 {
    2000
}

fn default_request_timeout() -> u64 {
    5
}

impl Default for LogSinkConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            buffer_size: default_buffer_size(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl LogSinkConfig {
    pub fn enabled(&self) -> bool {
        self.api_url.as_deref().is_some_and(|url| !url.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_by_default() {
        let config = LogSinkConfig::default();
        assert!(!config.enabled());
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.initial_backoff_ms, 2000);
    }

    #[test]
    fn test_blank_url_is_disabled() {
        let config: LogSinkConfig = toml::from_str(r#"api_url = "  ""#).unwrap();
        assert!(!config.enabled());

        let config: LogSinkConfig = toml::from_str(r#"api_url = "http://api:8000""#).unwrap();
        assert!(config.enabled());
    }
}
