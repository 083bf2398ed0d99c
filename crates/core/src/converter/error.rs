//! Error types for the converter module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while running the conversion tool or probing files.
#[derive(Debug, Error)]
pub enum ConverterError {
    /// Conversion tool not found.
    #[error("Conversion tool not found at path: {path}")]
    ToolNotFound { path: PathBuf },

    /// FFprobe binary not found.
    #[error("FFprobe not found at path: {path}")]
    FfprobeNotFound { path: PathBuf },

    /// Input directory not found.
    #[error("Input path not found: {path}")]
    InputNotFound { path: PathBuf },

    /// No source audio files under the input directory.
    #[error("No source audio files found in {path}")]
    NoSourceFiles { path: PathBuf },

    /// Output directory does not exist and could not be created.
    #[error("Failed to create output directory: {path}")]
    OutputDirectoryFailed { path: PathBuf },

    /// The tool exited with a nonzero status.
    #[error("Conversion tool exited with code {}: {stderr}", display_code(.exit_code))]
    ToolFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    /// The tool exited cleanly but the expected output is missing.
    #[error("Conversion completed but output file not found: {path}")]
    OutputMissing { path: PathBuf },

    /// Conversion timed out and the tool was killed.
    #[error("Conversion timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// Failed to probe media file.
    #[error("Failed to probe media file: {reason}")]
    ProbeFailed { reason: String },

    /// I/O error during conversion.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn display_code(code: &Option<i32>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "none".to_string())
}

impl ConverterError {
    /// Creates a tool failure error.
    pub fn tool_failed(exit_code: Option<i32>, stderr: impl Into<String>) -> Self {
        Self::ToolFailed {
            exit_code,
            stderr: stderr.into(),
        }
    }

    /// Creates a new probe failed error.
    pub fn probe_failed(reason: impl Into<String>) -> Self {
        Self::ProbeFailed {
            reason: reason.into(),
        }
    }

    /// Whether the failure came from the tool run itself (as opposed to setup).
    pub fn is_tool_failure(&self) -> bool {
        matches!(
            self,
            Self::ToolFailed { .. } | Self::Timeout { .. } | Self::OutputMissing { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_failed_message_includes_code_and_stderr() {
        let err = ConverterError::tool_failed(Some(2), "m4b-tool: no chapters");
        assert_eq!(
            err.to_string(),
            "Conversion tool exited with code 2: m4b-tool: no chapters"
        );
        assert!(err.is_tool_failure());
    }

    #[test]
    fn test_tool_failed_without_code() {
        let err = ConverterError::tool_failed(None, "killed");
        assert!(err.to_string().contains("code none"));
    }

    #[test]
    fn test_setup_errors_are_not_tool_failures() {
        let err = ConverterError::InputNotFound {
            path: PathBuf::from("/input/x"),
        };
        assert!(!err.is_tool_failure());
    }
}
