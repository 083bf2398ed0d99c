//! Pipeline event payloads.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use super::traits::BusError;

/// Event channels, without the deployment prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    DownloadComplete,
    RetryConversion,
    ConversionComplete,
    ConversionFailed,
}

impl Channel {
    pub const ALL: [Channel; 4] = [
        Self::DownloadComplete,
        Self::RetryConversion,
        Self::ConversionComplete,
        Self::ConversionFailed,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::DownloadComplete => "download_complete",
            Self::RetryConversion => "retry_conversion",
            Self::ConversionComplete => "conversion_complete",
            Self::ConversionFailed => "conversion_failed",
        }
    }

    /// `{prefix}:{name}`
    pub fn qualified(&self, prefix: &str) -> String {
        format!("{}:{}", prefix, self.name())
    }

    /// Inverse of [`Channel::qualified`].
    pub fn from_qualified(prefix: &str, qualified: &str) -> Option<Self> {
        qualified
            .strip_prefix(prefix)?
            .strip_prefix(':')?
            .parse()
            .ok()
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Channel {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| BusError::UnknownChannel(s.to_string()))
    }
}

/// UNIX seconds as a float.
pub fn unix_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Source files landed and are ready to convert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadComplete {
    pub book_name: String,
    pub path: String,
    #[serde(default, alias = "rss_item_id")]
    pub catalog_item_id: Option<i64>,
}

/// Operator asked to convert a book again from its backup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConversion {
    pub book_name: String,
    #[serde(default, alias = "rss_item_id")]
    pub catalog_item_id: Option<i64>,
    #[serde(default)]
    pub conversion_tracking_id: Option<i64>,
    /// Bypass the attempt budget.
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionComplete {
    pub book_name: String,
    #[serde(default, alias = "rss_item_id")]
    pub catalog_item_id: Option<i64>,
    pub status: String,
    pub timestamp: f64,
}

impl ConversionComplete {
    pub fn new(book_name: impl Into<String>, catalog_item_id: Option<i64>) -> Self {
        Self {
            book_name: book_name.into(),
            catalog_item_id,
            status: "completed".to_string(),
            timestamp: unix_timestamp(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionFailed {
    pub book_name: String,
    #[serde(default, alias = "rss_item_id")]
    pub catalog_item_id: Option<i64>,
    pub status: String,
    pub error_message: String,
    pub timestamp: f64,
}

impl ConversionFailed {
    pub fn new(
        book_name: impl Into<String>,
        catalog_item_id: Option<i64>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            book_name: book_name.into(),
            catalog_item_id,
            status: "failed".to_string(),
            error_message: error_message.into(),
            timestamp: unix_timestamp(),
        }
    }
}

/// Events the orchestrator consumes.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    DownloadComplete(DownloadComplete),
    RetryConversion(RetryConversion),
}

impl InboundEvent {
    pub fn channels() -> [Channel; 2] {
        [Channel::DownloadComplete, Channel::RetryConversion]
    }

    /// Decode a payload received on `channel`.
    pub fn parse(channel: Channel, payload: &str) -> Result<Self, BusError> {
        let malformed = |e: serde_json::Error| BusError::MalformedPayload {
            channel: channel.name().to_string(),
            reason: e.to_string(),
        };
        match channel {
            Channel::DownloadComplete => serde_json::from_str(payload)
                .map(Self::DownloadComplete)
                .map_err(malformed),
            Channel::RetryConversion => serde_json::from_str(payload)
                .map(Self::RetryConversion)
                .map_err(malformed),
            other => Err(BusError::UnknownChannel(other.name().to_string())),
        }
    }

    pub fn book_name(&self) -> &str {
        match self {
            Self::DownloadComplete(e) => &e.book_name,
            Self::RetryConversion(e) => &e.book_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_names() {
        assert_eq!(
            Channel::DownloadComplete.qualified("audiobook"),
            "audiobook:download_complete"
        );
        assert_eq!(
            Channel::from_qualified("audiobook", "audiobook:conversion_failed"),
            Some(Channel::ConversionFailed)
        );
        assert_eq!(Channel::from_qualified("audiobook", "other:conversion_failed"), None);
        assert!("bogus".parse::<Channel>().is_err());
    }

    #[test]
    fn test_download_complete_accepts_alias() {
        let event = InboundEvent::parse(
            Channel::DownloadComplete,
            r#"{"book_name": "Dune", "path": "/input/Dune", "rss_item_id": 7}"#,
        )
        .unwrap();
        match event {
            InboundEvent::DownloadComplete(e) => {
                assert_eq!(e.catalog_item_id, Some(7));
                assert_eq!(e.path, "/input/Dune");
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let event = InboundEvent::parse(
            Channel::DownloadComplete,
            r#"{"book_name": "Dune", "path": "/input/Dune"}"#,
        )
        .unwrap();
        assert_eq!(event.book_name(), "Dune");
    }

    #[test]
    fn test_retry_force_defaults_false() {
        let event = InboundEvent::parse(
            Channel::RetryConversion,
            r#"{"book_name": "Dune", "catalog_item_id": 3, "conversion_tracking_id": 9}"#,
        )
        .unwrap();
        match event {
            InboundEvent::RetryConversion(e) => {
                assert!(!e.force);
                assert_eq!(e.conversion_tracking_id, Some(9));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_malformed_payload() {
        let err = InboundEvent::parse(Channel::DownloadComplete, r#"{"path": 1}"#).unwrap_err();
        assert!(matches!(err, BusError::MalformedPayload { .. }));

        let err = InboundEvent::parse(Channel::ConversionComplete, "{}").unwrap_err();
        assert!(matches!(err, BusError::UnknownChannel(_)));
    }

    #[test]
    fn test_outbound_payload_shape() {
        let json = serde_json::to_value(ConversionFailed::new("Dune", Some(4), "boom")).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error_message"], "boom");
        assert_eq!(json["catalog_item_id"], 4);
        assert!(json["timestamp"].as_f64().unwrap() > 0.0);

        let json = serde_json::to_value(ConversionComplete::new("Dune", None)).unwrap();
        assert_eq!(json["status"], "completed");
        assert!(json["catalog_item_id"].is_null());
    }
}
