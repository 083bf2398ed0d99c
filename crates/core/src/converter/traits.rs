//! Trait definitions for the converter module.

use async_trait::async_trait;
use std::path::Path;

use super::error::ConverterError;
use super::types::{InvocationRequest, InvocationResult};

/// An external, non-instrumentable conversion tool.
///
/// Implementations only observe the process exit and the expected output file.
/// Progress is inferred elsewhere from filesystem side effects.
#[async_trait]
pub trait ConversionTool: Send + Sync {
    /// Returns the name of this implementation.
    fn name(&self) -> &str;

    /// Runs the tool to completion or failure.
    async fn invoke(&self, request: &InvocationRequest)
        -> Result<InvocationResult, ConverterError>;

    /// Validates that the tool is present and runnable.
    async fn validate(&self) -> Result<(), ConverterError>;
}

/// Reads the playback duration of a media file.
#[async_trait]
pub trait DurationProbe: Send + Sync {
    /// Duration in seconds.
    async fn duration(&self, path: &Path) -> Result<f64, ConverterError>;
}
