//! Conversion script invoker.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

use super::config::ConverterConfig;
use super::error::ConverterError;
use super::traits::ConversionTool;
use super::types::{InvocationRequest, InvocationResult};

/// Runs the merge-and-encode script as a child process.
pub struct M4bToolInvoker {
    config: ConverterConfig,
}

impl M4bToolInvoker {
    pub fn new(config: ConverterConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(ConverterConfig::default())
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    /// Last `max_bytes` of `text`, trimmed, cut on a char boundary.
    fn tail(text: &str, max_bytes: usize) -> String {
        let trimmed = text.trim();
        if trimmed.len() <= max_bytes {
            return trimmed.to_string();
        }
        let mut start = trimmed.len() - max_bytes;
        while !trimmed.is_char_boundary(start) {
            start += 1;
        }
        trimmed[start..].trim_start().to_string()
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> String {
    let Some(mut pipe) = pipe else {
        return String::new();
    };
    let mut buf = Vec::new();
    if let Err(e) = pipe.read_to_end(&mut buf).await {
        debug!("Failed to read tool output: {}", e);
    }
    String::from_utf8_lossy(&buf).into_owned()
}

#[async_trait]
impl ConversionTool for M4bToolInvoker {
    fn name(&self) -> &str {
        "m4b-tool"
    }

    async fn invoke(
        &self,
        request: &InvocationRequest,
    ) -> Result<InvocationResult, ConverterError> {
        if !request.input_dir.exists() {
            return Err(ConverterError::InputNotFound {
                path: request.input_dir.clone(),
            });
        }

        tokio::fs::create_dir_all(&request.output_dir)
            .await
            .map_err(|_| ConverterError::OutputDirectoryFailed {
                path: request.output_dir.clone(),
            })?;

        info!(
            "Running conversion tool: {} {} {} {}",
            self.config.tool_path.display(),
            request.input_dir.display(),
            request.output_dir.display(),
            request.book_name
        );

        let start = Instant::now();
        let mut child = Command::new(&self.config.tool_path)
            .arg(&request.input_dir)
            .arg(&request.output_dir)
            .arg(&request.book_name)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ConverterError::ToolNotFound {
                        path: self.config.tool_path.clone(),
                    }
                } else {
                    ConverterError::Io(e)
                }
            })?;

        let stdout_task = tokio::spawn(read_pipe(child.stdout.take()));
        let stderr_task = tokio::spawn(read_pipe(child.stderr.take()));

        let timeout_duration = Duration::from_secs(self.config.timeout_secs);
        let status = match timeout(timeout_duration, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => return Err(ConverterError::Io(e)),
            Err(_) => {
                warn!(
                    "Conversion of {} timed out after {}s, killing tool",
                    request.book_name, self.config.timeout_secs
                );
                let _ = child.kill().await;
                return Err(ConverterError::Timeout {
                    timeout_secs: self.config.timeout_secs,
                });
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        info!("Conversion tool return code: {:?}", status.code());
        debug!("Conversion tool stdout:\n{}", stdout);
        debug!("Conversion tool stderr:\n{}", stderr);

        if !status.success() {
            return Err(ConverterError::tool_failed(
                status.code(),
                Self::tail(&stderr, self.config.stderr_tail_bytes),
            ));
        }

        let output_path = request.expected_output();
        let metadata = tokio::fs::metadata(&output_path)
            .await
            .map_err(|_| ConverterError::OutputMissing {
                path: output_path.clone(),
            })?;

        info!("Conversion completed successfully: {}", output_path.display());
        Ok(InvocationResult {
            output_path,
            output_size_bytes: metadata.len(),
            elapsed_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn validate(&self) -> Result<(), ConverterError> {
        let metadata = tokio::fs::metadata(&self.config.tool_path)
            .await
            .map_err(|_| ConverterError::ToolNotFound {
                path: self.config.tool_path.clone(),
            })?;

        if !metadata.is_file() {
            return Err(ConverterError::ToolNotFound {
                path: self.config.tool_path.clone(),
            });
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if metadata.permissions().mode() & 0o111 == 0 {
                warn!(
                    "Conversion tool {} is not executable",
                    self.config.tool_path.display()
                );
            }
        }

        Ok(())
    }
}
