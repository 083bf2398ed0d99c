//! Types for the converter module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::progress::MarkerProtocol;

/// One run of the conversion tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationRequest {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub book_name: String,
}

impl InvocationRequest {
    pub fn new(
        input_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        book_name: impl Into<String>,
    ) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            book_name: book_name.into(),
        }
    }

    /// The file whose presence (with exit code 0) means success.
    pub fn expected_output(&self) -> PathBuf {
        self.output_dir
            .join(MarkerProtocol::V1.output_file_name(&self.book_name))
    }
}

/// Outcome of a successful tool run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationResult {
    pub output_path: PathBuf,
    pub output_size_bytes: u64,
    /// Wall-clock time of the run in milliseconds.
    pub elapsed_ms: u64,
}

/// Comparison of the converted file's duration against its sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurationValidation {
    pub source_secs: f64,
    pub converted_secs: f64,
    pub difference_secs: f64,
    pub tolerance_secs: f64,
    pub passed: bool,
    pub message: String,
}
