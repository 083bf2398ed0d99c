//! Mock conversion tool and duration probe for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::converter::{
    ConversionTool, ConverterError, DurationProbe, InvocationRequest, InvocationResult,
};

/// Mock implementation of the ConversionTool trait.
///
/// Provides controllable behavior for testing:
/// - Records every invocation for assertions
/// - Writes the expected output file on success
/// - Fails the next invocation with a chosen error
/// - Simulates a slow tool
///
/// # Example
///
/// ```rust,ignore
/// use bookbinder_core::testing::MockConversionTool;
///
/// let tool = MockConversionTool::new();
/// tool.set_next_error(ConverterError::tool_failed(Some(1), "bad frame")).await;
///
/// assert!(tool.invoke(&request).await.is_err());
/// assert!(tool.invoke(&request).await.is_ok());
/// assert_eq!(tool.invocation_count().await, 2);
/// ```
#[derive(Debug)]
pub struct MockConversionTool {
    invocations: Arc<RwLock<Vec<InvocationRequest>>>,
    /// If set, the next invocation will fail with this error.
    next_error: Arc<RwLock<Option<ConverterError>>>,
    /// Simulated run time in milliseconds.
    run_duration_ms: Arc<RwLock<u64>>,
    /// Bytes written to the output file.
    output_contents: Arc<RwLock<Vec<u8>>>,
}

impl Default for MockConversionTool {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConversionTool {
    pub fn new() -> Self {
        Self {
            invocations: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
            run_duration_ms: Arc::new(RwLock::new(0)),
            output_contents: Arc::new(RwLock::new(b"m4b".to_vec())),
        }
    }

    /// Get all recorded invocations.
    pub async fn invocations(&self) -> Vec<InvocationRequest> {
        self.invocations.read().await.clone()
    }

    pub async fn invocation_count(&self) -> usize {
        self.invocations.read().await.len()
    }

    /// Configure the next invocation to fail with the given error.
    pub async fn set_next_error(&self, error: ConverterError) {
        *self.next_error.write().await = Some(error);
    }

    pub async fn set_run_duration(&self, duration: Duration) {
        *self.run_duration_ms.write().await = duration.as_millis() as u64;
    }

    pub async fn set_output_contents(&self, contents: impl Into<Vec<u8>>) {
        *self.output_contents.write().await = contents.into();
    }
}

#[async_trait]
impl ConversionTool for MockConversionTool {
    fn name(&self) -> &str {
        "mock"
    }

    async fn invoke(
        &self,
        request: &InvocationRequest,
    ) -> Result<InvocationResult, ConverterError> {
        self.invocations.write().await.push(request.clone());

        if let Some(err) = self.next_error.write().await.take() {
            return Err(err);
        }

        let duration_ms = *self.run_duration_ms.read().await;
        if duration_ms > 0 {
            tokio::time::sleep(Duration::from_millis(duration_ms)).await;
        }

        tokio::fs::create_dir_all(&request.output_dir)
            .await
            .map_err(|_| ConverterError::OutputDirectoryFailed {
                path: request.output_dir.clone(),
            })?;

        let output_path = request.expected_output();
        let contents = self.output_contents.read().await.clone();
        tokio::fs::write(&output_path, &contents).await?;

        Ok(InvocationResult {
            output_path,
            output_size_bytes: contents.len() as u64,
            elapsed_ms: duration_ms,
        })
    }

    async fn validate(&self) -> Result<(), ConverterError> {
        Ok(())
    }
}

/// Mock implementation of the DurationProbe trait.
///
/// Answers from a per-path table, then from a default. Unknown paths with
/// no default fail like an unreadable file.
#[derive(Debug, Default)]
pub struct MockDurationProbe {
    durations: Arc<RwLock<HashMap<PathBuf, f64>>>,
    default_duration: Arc<RwLock<Option<f64>>>,
}

impl MockDurationProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_duration(&self, path: impl AsRef<Path>, seconds: f64) {
        self.durations
            .write()
            .await
            .insert(path.as_ref().to_path_buf(), seconds);
    }

    /// Duration reported for any path without its own entry.
    pub async fn set_default_duration(&self, seconds: f64) {
        *self.default_duration.write().await = Some(seconds);
    }
}

#[async_trait]
impl DurationProbe for MockDurationProbe {
    async fn duration(&self, path: &Path) -> Result<f64, ConverterError> {
        if let Some(seconds) = self.durations.read().await.get(path) {
            return Ok(*seconds);
        }
        match *self.default_duration.read().await {
            Some(seconds) => Ok(seconds),
            None => Err(ConverterError::probe_failed(format!(
                "no duration for {}",
                path.display()
            ))),
        }
    }
}
