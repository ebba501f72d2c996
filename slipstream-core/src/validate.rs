//! Post-run validation of captured subscriber outputs.
//!
//! After shutdown, each subscriber's output file is probed for its container
//! duration. Probing goes through the [`DurationProber`] trait so tests can
//! substitute a canned implementation for the external `ffprobe` binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use thiserror::Error;
use tracing::{info, warn};

use crate::pipeline::SubscriberSet;

/// A single output file could not be probed.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Output file missing: {path}")]
    MissingOutput { path: PathBuf },

    #[error("Failed to run prober on {path}: {source}")]
    ProberLaunch { path: PathBuf, source: std::io::Error },

    #[error("Probe of {path} failed: {stderr}")]
    ProbeFailed { path: PathBuf, stderr: String },

    #[error("Unparsable duration `{value}` for {path}")]
    UnparsableDuration { path: PathBuf, value: String },
}

/// Extracts container-level duration metadata from a media file.
#[async_trait]
pub trait DurationProber: Send + Sync {
    /// Probes `path` and returns its media duration.
    ///
    /// # Errors
    /// - `ValidationError` - The file is missing, unreadable, or reports no
    ///   parsable duration
    async fn probe_duration(&self, path: &Path) -> Result<Duration, ValidationError>;
}

/// Production prober backed by the external `ffprobe` binary.
pub struct FfprobeProber {
    program: PathBuf,
}

impl FfprobeProber {
    /// Creates a prober invoking the given `ffprobe` executable.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl DurationProber for FfprobeProber {
    async fn probe_duration(&self, path: &Path) -> Result<Duration, ValidationError> {
        if !path.exists() {
            return Err(ValidationError::MissingOutput {
                path: path.to_path_buf(),
            });
        }

        let output = tokio::process::Command::new(&self.program)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .output()
            .await
            .map_err(|source| ValidationError::ProberLaunch {
                path: path.to_path_buf(),
                source,
            })?;

        if !output.status.success() {
            return Err(ValidationError::ProbeFailed {
                path: path.to_path_buf(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let seconds: f64 = value.parse().map_err(|_| ValidationError::UnparsableDuration {
            path: path.to_path_buf(),
            value: value.clone(),
        })?;
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(ValidationError::UnparsableDuration {
                path: path.to_path_buf(),
                value,
            });
        }

        Ok(Duration::from_secs_f64(seconds))
    }
}

/// Outcome of probing one subscriber's output.
#[derive(Debug)]
pub struct SubscriberReport {
    pub index: usize,
    pub output: PathBuf,
    pub duration: Result<Duration, ValidationError>,
}

/// Probes each subscriber's output, lazily and in index order.
///
/// The returned stream is finite and non-restartable; each file is probed
/// only as the stream is polled. One unreadable file yields an error entry
/// without affecting the rest.
pub fn validate<'a, P>(
    prober: &'a P,
    outputs: &'a SubscriberSet,
) -> impl Stream<Item = SubscriberReport> + 'a
where
    P: DurationProber + ?Sized,
{
    futures::stream::iter(outputs.iter()).then(move |entry| async move {
        let duration = prober.probe_duration(&entry.output).await;
        match &duration {
            Ok(d) => info!(
                "Output file {} duration: {:.3}s",
                entry.output.display(),
                d.as_secs_f64()
            ),
            Err(e) => warn!("Validation of {} failed: {e}", entry.output.display()),
        }
        SubscriberReport {
            index: entry.index,
            output: entry.output.clone(),
            duration,
        }
    })
}

/// Collects the full validation pass into a vector of per-subscriber reports.
pub async fn validate_all<P>(prober: &P, outputs: &SubscriberSet) -> Vec<SubscriberReport>
where
    P: DurationProber + ?Sized,
{
    validate(prober, outputs).collect().await
}

/// Canned prober for tests: a fixed duration for files that exist, the
/// missing-file error otherwise.
#[cfg(any(test, feature = "test-utils"))]
pub struct StubProber {
    duration: Duration,
}

#[cfg(any(test, feature = "test-utils"))]
impl StubProber {
    pub fn constant(duration: Duration) -> Self {
        Self { duration }
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl DurationProber for StubProber {
    async fn probe_duration(&self, path: &Path) -> Result<Duration, ValidationError> {
        if !path.exists() {
            return Err(ValidationError::MissingOutput {
                path: path.to_path_buf(),
            });
        }
        Ok(self.duration)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tempfile::tempdir;

    use super::*;

    struct CountingProber {
        probes: AtomicUsize,
    }

    #[async_trait]
    impl DurationProber for CountingProber {
        async fn probe_duration(&self, _path: &Path) -> Result<Duration, ValidationError> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            Ok(Duration::from_secs(300))
        }
    }

    fn populated_set(dir: &Path, count: usize) -> SubscriberSet {
        let set = SubscriberSet::plan(dir, dir, count);
        for entry in &set {
            fs::write(&entry.output, b"flv bytes").unwrap();
        }
        set
    }

    #[tokio::test]
    async fn test_reports_come_back_in_index_order() {
        let dir = tempdir().unwrap();
        let set = populated_set(dir.path(), 5);
        let prober = StubProber::constant(Duration::from_secs(300));

        let reports = validate_all(&prober, &set).await;

        let indices: Vec<usize> = reports.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_one_missing_file_does_not_hide_the_rest() {
        let dir = tempdir().unwrap();
        let set = populated_set(dir.path(), 10);
        fs::remove_file(&set.entries()[4].output).unwrap();
        let prober = StubProber::constant(Duration::from_secs(300));

        let reports = validate_all(&prober, &set).await;

        assert_eq!(reports.len(), 10);
        let failures: Vec<&SubscriberReport> =
            reports.iter().filter(|r| r.duration.is_err()).collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].index, 4);
        assert!(matches!(
            failures[0].duration,
            Err(ValidationError::MissingOutput { .. })
        ));
    }

    #[tokio::test]
    async fn test_validation_is_lazy() {
        let dir = tempdir().unwrap();
        let set = populated_set(dir.path(), 10);
        let prober = CountingProber {
            probes: AtomicUsize::new(0),
        };

        let first_three: Vec<SubscriberReport> =
            validate(&prober, &set).take(3).collect().await;

        assert_eq!(first_three.len(), 3);
        assert_eq!(prober.probes.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_ffprobe_prober_missing_file() {
        let dir = tempdir().unwrap();
        let prober = FfprobeProber::new("ffprobe");

        let result = prober.probe_duration(&dir.path().join("absent.flv")).await;

        assert!(matches!(result, Err(ValidationError::MissingOutput { .. })));
    }

    #[tokio::test]
    async fn test_ffprobe_prober_launch_failure() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("present.flv");
        fs::write(&target, b"flv bytes").unwrap();
        let prober = FfprobeProber::new("/nonexistent/ffprobe");

        let result = prober.probe_duration(&target).await;

        assert!(matches!(result, Err(ValidationError::ProberLaunch { .. })));
    }
}
