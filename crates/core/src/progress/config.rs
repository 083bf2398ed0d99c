//! Configuration for the progress inferencer.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Staging directories and scan cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// Where the tool stages its inputs. Yields `total_files`.
    #[serde(default = "default_merge_dir")]
    pub merge_dir: PathBuf,

    /// Where the tool writes in-flight outputs.
    #[serde(default = "default_untagged_dir")]
    pub untagged_dir: PathBuf,

    /// Quiet period after a filesystem event before rescanning (milliseconds).
    #[serde(default = "default_debounce")]
    pub debounce_ms: u64,

    /// Periodic full rescan interval (seconds).
    #[serde(default = "default_rescan_interval")]
    pub rescan_interval_secs: u64,

    /// Mark a tracked book completed when it leaves staging without a
    /// terminal job row.
    #[serde(default = "default_assume_completed")]
    pub assume_completed_on_disappearance: bool,
}

fn default_merge_dir() -> PathBuf {
    PathBuf::from("/app/auto-m4b/temp/merge")
}

fn default_untagged_dir() -> PathBuf {
    PathBuf::from("/app/auto-m4b/temp/untagged")
}

fn default_debounce() -> u64 {
    5000
}

fn default_rescan_interval() -> u64 {
    30
}

fn default_assume_completed() -> bool {
    true
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            merge_dir: default_merge_dir(),
            untagged_dir: default_untagged_dir(),
            debounce_ms: default_debounce(),
            rescan_interval_secs: default_rescan_interval(),
            assume_completed_on_disappearance: default_assume_completed(),
        }
    }
}

impl ProgressConfig {
    /// Config rooted at a single temp directory with `merge/` and `untagged/` below it.
    pub fn with_temp_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            merge_dir: root.join("merge"),
            untagged_dir: root.join("untagged"),
            ..Default::default()
        }
    }
}
