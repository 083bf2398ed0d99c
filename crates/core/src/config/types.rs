use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::backup::BackupConfig;
use crate::bus::BusConfig;
use crate::converter::ConverterConfig;
use crate::logsink::LogSinkConfig;
use crate::orchestrator::OrchestratorConfig;
use crate::progress::ProgressConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub converter: ConverterConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub progress: ProgressConfig,
    #[serde(default)]
    pub log_sink: LogSinkConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

/// Local log output configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_filter() -> String {
    "info,tower_http=debug".to_string()
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Admin HTTP server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdminConfig {
    #[serde(default = "default_admin_enabled")]
    pub enabled: bool,
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: default_admin_enabled(),
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_admin_enabled() -> bool {
    true
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8090
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
    #[serde(default)]
    pub lock_retry: LockRetryConfig,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout(),
            lock_retry: LockRetryConfig::default(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("bookbinder.sqlite")
}

fn default_busy_timeout() -> u64 {
    30_000
}

/// Application-level retry on "database is locked" errors.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LockRetryConfig {
    #[serde(default = "default_lock_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_lock_delay")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for LockRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_lock_attempts(),
            initial_delay_ms: default_lock_delay(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

fn default_lock_attempts() -> u32 {
    3
}

fn default_lock_delay() -> u64 {
    100
}

fn default_backoff_multiplier() -> f64 {
    2.0
}
