use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::config::LogSinkConfig;
use super::handle::{LogRecord, LogSinkHandle};

#[derive(Debug, Error)]
pub enum LogSinkError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Log API returned {status}")]
    Status { status: u16 },
}

/// Delivers one record to the log API.
#[async_trait]
pub trait LogTransport: Send + Sync {
    async fn deliver(&self, record: &LogRecord) -> Result<(), LogSinkError>;
}

/// `POST {api_url}/logs/external` over reqwest.
pub struct HttpLogTransport {
    client: Client,
    endpoint: String,
}

impl HttpLogTransport {
    pub fn new(api_url: &str, request_timeout: Duration) -> Result<Self, LogSinkError> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/logs/external", api_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl LogTransport for HttpLogTransport {
    async fn deliver(&self, record: &LogRecord) -> Result<(), LogSinkError> {
        let response = self.client.post(&self.endpoint).json(record).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LogSinkError::Status {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

/// Background task draining the handle's queue into a transport.
pub struct LogShipper {
    rx: mpsc::Receiver<LogRecord>,
    transport: Arc<dyn LogTransport>,
    max_retries: u32,
    initial_backoff: Duration,
}

impl LogShipper {
    pub fn new(
        rx: mpsc::Receiver<LogRecord>,
        transport: Arc<dyn LogTransport>,
        max_retries: u32,
        initial_backoff: Duration,
    ) -> Self {
        Self {
            rx,
            transport,
            max_retries: max_retries.max(1),
            initial_backoff,
        }
    }

    /// Ship records until every handle is dropped.
    pub async fn run(mut self) {
        debug!("Log shipper started");
        while let Some(record) = self.rx.recv().await {
            self.ship(&record).await;
        }
        debug!("Log shipper shutting down");
    }

    /// Deliver with bounded retries. Failures are traced, never returned.
    pub async fn ship(&self, record: &LogRecord) -> bool {
        let mut backoff = self.initial_backoff;
        for attempt in 1..=self.max_retries {
            match self.transport.deliver(record).await {
                Ok(()) => return true,
                Err(e) if attempt < self.max_retries => {
                    warn!(
                        "Log API not ready, retrying in {:?} (attempt {}/{}): {}",
                        backoff, attempt, self.max_retries, e
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                }
                Err(e) => {
                    warn!(
                        "Log API not available after {} attempts: {}",
                        self.max_retries, e
                    );
                }
            }
        }
        false
    }
}

/// Build the log sink for `service`.
///
/// Returns a disabled handle and no shipper when `api_url` is unset.
/// Spawn the shipper with `tokio::spawn(shipper.run())`.
pub fn create_log_sink(
    config: &LogSinkConfig,
    service: &str,
) -> Result<(LogSinkHandle, Option<LogShipper>), LogSinkError> {
    let Some(api_url) = config.api_url.as_deref().filter(|_| config.enabled()) else {
        return Ok((LogSinkHandle::disabled(service), None));
    };

    let transport = HttpLogTransport::new(
        api_url,
        Duration::from_secs(config.request_timeout_secs),
    )?;
    Ok(create_log_sink_with_transport(
        Arc::new(transport),
        service,
        config.buffer_size,
        config.max_retries,
        Duration::from_millis(config.initial_backoff_ms),
    ))
}

pub fn create_log_sink_with_transport(
    transport: Arc<dyn LogTransport>,
    service: &str,
    buffer_size: usize,
    max_retries: u32,
    initial_backoff: Duration,
) -> (LogSinkHandle, Option<LogShipper>) {
    let (tx, rx) = mpsc::channel(buffer_size.max(1));
    let handle = LogSinkHandle::new(tx, service);
    let shipper = LogShipper::new(rx, transport, max_retries, initial_backoff);
    (handle, Some(shipper))
}
