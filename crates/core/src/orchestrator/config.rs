//! Orchestrator configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for the conversion orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Where downloads land. Retries restore into `{input_dir}/{book_name}`.
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,

    /// Where the conversion tool writes `{book_name}.m4b`.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Attempts allowed per book before a retry needs `force`.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// How long to wait once for a source path that is not there yet.
    #[serde(default = "default_source_wait")]
    pub source_wait_secs: u64,

    /// Pause before resubscribing after the bus connection drops.
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
}

fn default_input_dir() -> PathBuf {
    PathBuf::from("/input")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("/output")
}

fn default_max_attempts() -> u32 {
    3
}

fn default_source_wait() -> u64 {
    10
}

fn default_reconnect_delay() -> u64 {
    5
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            input_dir: default_input_dir(),
            output_dir: default_output_dir(),
            max_attempts: default_max_attempts(),
            source_wait_secs: default_source_wait(),
            reconnect_delay_secs: default_reconnect_delay(),
        }
    }
}

impl OrchestratorConfig {
    /// Config rooted under `root` with no waiting, for tests and local runs.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            input_dir: root.join("input"),
            output_dir: root.join("output"),
            source_wait_secs: 0,
            reconnect_delay_secs: 0,
            ..Self::default()
        }
    }
}
