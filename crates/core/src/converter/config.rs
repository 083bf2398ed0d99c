//! Configuration for the converter module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the conversion tool wrapper and duration validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Path to the conversion script, invoked as `tool input_dir output_dir book_name`.
    #[serde(default = "default_tool_path")]
    pub tool_path: PathBuf,

    /// Path to ffprobe binary.
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: PathBuf,

    /// Hard timeout for a single conversion in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Timeout for a single ffprobe call in seconds.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Whether to compare source and converted durations.
    #[serde(default = "default_validate_duration")]
    pub validate_duration: bool,

    /// Allowed duration difference as a percentage of the source duration.
    #[serde(default = "default_tolerance")]
    pub duration_tolerance_percent: f64,

    /// How much of the tool's stderr to keep in failure messages.
    #[serde(default = "default_stderr_tail")]
    pub stderr_tail_bytes: usize,
}

fn default_tool_path() -> PathBuf {
    PathBuf::from("/app/folder_m4b_builder.sh")
}

fn default_ffprobe_path() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_timeout() -> u64 {
    7200 // 2 hours
}

fn default_probe_timeout() -> u64 {
    30
}

fn default_validate_duration() -> bool {
    true
}

fn default_tolerance() -> f64 {
    5.0
}

fn default_stderr_tail() -> usize {
    4096
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            tool_path: default_tool_path(),
            ffprobe_path: default_ffprobe_path(),
            timeout_secs: default_timeout(),
            probe_timeout_secs: default_probe_timeout(),
            validate_duration: default_validate_duration(),
            duration_tolerance_percent: default_tolerance(),
            stderr_tail_bytes: default_stderr_tail(),
        }
    }
}

impl ConverterConfig {
    /// Creates a config pointing at a specific tool.
    pub fn with_tool(tool_path: impl Into<PathBuf>) -> Self {
        Self {
            tool_path: tool_path.into(),
            ..Default::default()
        }
    }

    /// Sets the timeout in seconds.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConverterConfig::default();
        assert_eq!(config.ffprobe_path, PathBuf::from("ffprobe"));
        assert_eq!(config.timeout_secs, 7200);
        assert_eq!(config.probe_timeout_secs, 30);
        assert!(config.validate_duration);
        assert_eq!(config.duration_tolerance_percent, 5.0);
    }

    #[test]
    fn test_builder() {
        let config = ConverterConfig::with_tool("/opt/convert.sh").with_timeout(60);
        assert_eq!(config.tool_path, PathBuf::from("/opt/convert.sh"));
        assert_eq!(config.timeout_secs, 60);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: ConverterConfig = toml::from_str(
            r#"
tool_path = "/scripts/build.sh"
duration_tolerance_percent = 2.5
"#,
        )
        .unwrap();
        assert_eq!(config.tool_path, PathBuf::from("/scripts/build.sh"));
        assert_eq!(config.duration_tolerance_percent, 2.5);
        assert_eq!(config.timeout_secs, 7200);
    }
}
