use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Severity as the log API spells it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Request body of `POST /logs/external`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
    pub service: String,
}

/// Handle for shipping messages to the external log API.
///
/// Cheap to clone. Never blocks: records are dropped when the buffer is full
/// or the shipper is gone. A disabled handle drops everything.
#[derive(Clone)]
pub struct LogSinkHandle {
    tx: Option<mpsc::Sender<LogRecord>>,
    service: Arc<str>,
}

impl LogSinkHandle {
    pub fn new(tx: mpsc::Sender<LogRecord>, service: &str) -> Self {
        Self {
            tx: Some(tx),
            service: Arc::from(service),
        }
    }

    pub fn disabled(service: &str) -> Self {
        Self {
            tx: None,
            service: Arc::from(service),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Queue a record. Returns whether it was accepted.
    pub fn send(&self, level: LogLevel, message: impl Into<String>) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };
        let record = LogRecord {
            level,
            message: message.into(),
            service: self.service.to_string(),
        };
        match tx.try_send(record) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!("Log sink buffer full, dropping record");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    pub fn info(&self, message: impl Into<String>) -> bool {
        self.send(LogLevel::Info, message)
    }

    pub fn warning(&self, message: impl Into<String>) -> bool {
        self.send(LogLevel::Warning, message)
    }

    pub fn error(&self, message: impl Into<String>) -> bool {
        self.send(LogLevel::Error, message)
    }
}

impl fmt::Debug for LogSinkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSinkHandle")
            .field("service", &self.service)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
