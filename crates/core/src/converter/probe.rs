//! Duration probing and validation.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

use super::config::ConverterConfig;
use super::error::ConverterError;
use super::traits::DurationProbe;
use super::types::DurationValidation;

/// ffprobe-backed [`DurationProbe`].
pub struct FfprobeDurationProbe {
    ffprobe_path: PathBuf,
    timeout_secs: u64,
}

impl FfprobeDurationProbe {
    pub fn new(config: &ConverterConfig) -> Self {
        Self {
            ffprobe_path: config.ffprobe_path.clone(),
            timeout_secs: config.probe_timeout_secs,
        }
    }

    fn parse_output(path: &Path, stdout: &str) -> Result<f64, ConverterError> {
        let trimmed = stdout.trim();
        let duration: f64 = trimmed.parse().map_err(|_| {
            ConverterError::probe_failed(format!(
                "unparseable duration '{}' for {}",
                trimmed,
                path.display()
            ))
        })?;
        if !duration.is_finite() || duration < 0.0 {
            return Err(ConverterError::probe_failed(format!(
                "invalid duration {} for {}",
                duration,
                path.display()
            )));
        }
        Ok(duration)
    }
}

#[async_trait]
impl DurationProbe for FfprobeDurationProbe {
    async fn duration(&self, path: &Path) -> Result<f64, ConverterError> {
        if !path.exists() {
            return Err(ConverterError::InputNotFound {
                path: path.to_path_buf(),
            });
        }

        let mut command = Command::new(&self.ffprobe_path);
        command
            .args([
                "-v",
                "quiet",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match timeout(Duration::from_secs(self.timeout_secs), command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConverterError::FfprobeNotFound {
                    path: self.ffprobe_path.clone(),
                })
            }
            Ok(Err(e)) => return Err(ConverterError::Io(e)),
            Err(_) => {
                return Err(ConverterError::probe_failed(format!(
                    "ffprobe timed out after {}s on {}",
                    self.timeout_secs,
                    path.display()
                )))
            }
        };

        if !output.status.success() {
            return Err(ConverterError::probe_failed(format!(
                "ffprobe failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let duration = Self::parse_output(path, &String::from_utf8_lossy(&output.stdout))?;
        debug!("Duration of {}: {:.2} seconds", path.display(), duration);
        Ok(duration)
    }
}

/// Sum of the durations of `files`.
///
/// Files that cannot be probed are skipped with a warning. `None` when no
/// file could be probed at all.
pub async fn total_duration(probe: &dyn DurationProbe, files: &[PathBuf]) -> Option<f64> {
    let mut total = 0.0;
    let mut probed = 0usize;

    for file in files {
        match probe.duration(file).await {
            Ok(duration) => {
                total += duration;
                probed += 1;
            }
            Err(e) => warn!("Could not get duration for {}: {}", file.display(), e),
        }
    }

    if probed == 0 {
        warn!("Could not get duration for any source file");
        return None;
    }
    if probed < files.len() {
        warn!(
            "Could only get duration for {}/{} files",
            probed,
            files.len()
        );
    }

    info!(
        "Total source duration: {} ({} files)",
        format_duration(total),
        probed
    );
    Some(total)
}

/// Check `|source - converted| <= source * tolerance_percent / 100`.
pub fn validate_duration(
    source_secs: f64,
    converted_secs: f64,
    tolerance_percent: f64,
) -> DurationValidation {
    let tolerance_secs = source_secs * (tolerance_percent / 100.0);
    let difference_secs = (source_secs - converted_secs).abs();

    let (passed, message) = if source_secs <= 0.0 {
        (false, "Invalid source duration".to_string())
    } else if converted_secs <= 0.0 {
        (false, "Invalid converted duration".to_string())
    } else if difference_secs <= tolerance_secs {
        (
            true,
            format!(
                "Duration validation passed (diff: {:.2}s, tolerance: {:.2}s)",
                difference_secs, tolerance_secs
            ),
        )
    } else {
        (
            false,
            format!(
                "Duration validation failed (diff: {:.2}s, tolerance: {:.2}s)",
                difference_secs, tolerance_secs
            ),
        )
    };

    DurationValidation {
        source_secs,
        converted_secs,
        difference_secs,
        tolerance_secs,
        passed,
        message,
    }
}

/// Human readable duration such as `1h 2m 3s`.
pub fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct TableProbe(HashMap<PathBuf, f64>);

    #[async_trait]
    impl DurationProbe for TableProbe {
        async fn duration(&self, path: &Path) -> Result<f64, ConverterError> {
            self.0
                .get(path)
                .copied()
                .ok_or_else(|| ConverterError::probe_failed("unknown file"))
        }
    }

    #[test]
    fn test_parse_output() {
        let path = Path::new("/a.mp3");
        assert_eq!(
            FfprobeDurationProbe::parse_output(path, "123.456000\n").unwrap(),
            123.456
        );
        assert!(FfprobeDurationProbe::parse_output(path, "N/A").is_err());
        assert!(FfprobeDurationProbe::parse_output(path, "").is_err());
    }

    #[test]
    fn test_validate_duration_within_tolerance() {
        let v = validate_duration(3600.0, 3500.0, 5.0);
        assert!(v.passed);
        assert_eq!(v.tolerance_secs, 180.0);
        assert_eq!(v.difference_secs, 100.0);
    }

    #[test]
    fn test_validate_duration_outside_tolerance() {
        let v = validate_duration(3600.0, 3000.0, 5.0);
        assert!(!v.passed);
        assert!(v.message.contains("failed"));
    }

    #[test]
    fn test_validate_duration_invalid_inputs() {
        assert!(!validate_duration(0.0, 10.0, 5.0).passed);
        assert!(!validate_duration(10.0, 0.0, 5.0).passed);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(42.9), "42s");
        assert_eq!(format_duration(125.0), "2m 5s");
        assert_eq!(format_duration(3723.0), "1h 2m 3s");
    }

    #[tokio::test]
    async fn test_total_duration_skips_unprobeable_files() {
        let mut table = HashMap::new();
        table.insert(PathBuf::from("/a.mp3"), 100.0);
        table.insert(PathBuf::from("/b.mp3"), 50.5);
        let probe = TableProbe(table);

        let files = vec![
            PathBuf::from("/a.mp3"),
            PathBuf::from("/b.mp3"),
            PathBuf::from("/c.mp3"),
        ];
        assert_eq!(total_duration(&probe, &files).await, Some(150.5));
        assert_eq!(
            total_duration(&probe, &[PathBuf::from("/c.mp3")]).await,
            None
        );
        assert_eq!(total_duration(&probe, &[]).await, None);
    }

    #[tokio::test]
    async fn test_ffprobe_missing_file() {
        let probe = FfprobeDurationProbe::new(&ConverterConfig::default());
        let result = probe.duration(Path::new("/nonexistent/file.mp3")).await;
        assert!(matches!(result, Err(ConverterError::InputNotFound { .. })));
    }
}
