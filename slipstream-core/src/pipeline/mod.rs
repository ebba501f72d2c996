//! Stage sequencing for the streaming pipeline.
//!
//! Startup order is fixed: relay (if this harness launches it), media
//! source, publisher, then the subscriber fan-out. Between the stages that
//! feed each other the sequencer sleeps for a configured delay instead of
//! polling for readiness; the spawned binaries expose no readiness signal,
//! and the delays are configuration so tests can shrink them to nothing.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::conduit::{PipeConduit, expand_home};
use crate::config::HarnessConfig;
use crate::supervisor::{self, ManagedProcess, SpawnError};

pub mod commands;

pub use commands::{
    media_source_command, publisher_command, relay_command, subscriber_command,
};

/// One stage of the pipeline, in startup order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Relay,
    MediaSource,
    Publisher,
    Subscriber(usize),
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Relay => write!(f, "relay"),
            Stage::MediaSource => write!(f, "media-source"),
            Stage::Publisher => write!(f, "publisher"),
            Stage::Subscriber(index) => write!(f, "subscriber-{index}"),
        }
    }
}

/// Output and stats-log paths for one subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberPaths {
    pub index: usize,
    pub output: PathBuf,
    pub stats_log: PathBuf,
}

/// The ordered fan-out plan: one output file and one stats log per
/// subscriber, index-embedded so paths never collide.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriberSet {
    entries: Vec<SubscriberPaths>,
}

impl SubscriberSet {
    /// Plans paths for `count` subscribers under the given directories.
    pub fn plan(output_dir: &Path, log_dir: &Path, count: usize) -> Self {
        let entries = (0..count)
            .map(|index| SubscriberPaths {
                index,
                output: output_dir.join(format!("moq-out-{index}.flv")),
                stats_log: log_dir.join(format!("client-{index}.log")),
            })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SubscriberPaths> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[SubscriberPaths] {
        &self.entries
    }

    /// Deletes output and stats-log files left behind by a previous run.
    ///
    /// A stale capture would otherwise be picked up by the validator and
    /// reported as this run's output. Failures are logged, not fatal.
    pub fn remove_stale_files(&self) {
        for entry in &self.entries {
            for path in [&entry.output, &entry.stats_log] {
                match fs::remove_file(path) {
                    Ok(()) => debug!("Removed stale file {}", path.display()),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => warn!("Could not remove stale file {}: {e}", path.display()),
                }
            }
        }
    }
}

impl<'a> IntoIterator for &'a SubscriberSet {
    type Item = &'a SubscriberPaths;
    type IntoIter = std::slice::Iter<'a, SubscriberPaths>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Everything a run spawned or provisioned, aggregated for uniform shutdown.
#[derive(Debug)]
pub struct RunHandle {
    pub relay: Option<ManagedProcess>,
    pub source: Option<ManagedProcess>,
    pub publisher: Option<ManagedProcess>,
    pub subscribers: Vec<ManagedProcess>,
    pub conduit: PipeConduit,
    pub subscriber_set: SubscriberSet,
}

impl RunHandle {
    fn new(conduit: PipeConduit, subscriber_set: SubscriberSet) -> Self {
        Self {
            relay: None,
            source: None,
            publisher: None,
            subscribers: Vec::new(),
            conduit,
            subscriber_set,
        }
    }

    /// Number of processes this handle tracks.
    pub fn process_count(&self) -> usize {
        usize::from(self.relay.is_some())
            + usize::from(self.source.is_some())
            + usize::from(self.publisher.is_some())
            + self.subscribers.len()
    }
}

/// A stage failed to start and the remaining stages were aborted.
///
/// Already-spawned stages are left running; the error carries the partial
/// [`RunHandle`] so the caller can (and must) still run shutdown over them.
#[derive(Debug, Error)]
#[error("{stage} stage failed to start: {source}")]
pub struct SequencingError {
    pub stage: Stage,
    pub source: SpawnError,
    pub partial: Box<RunHandle>,
}

impl SequencingError {
    /// Consumes the error, yielding the partially-started run for cleanup.
    pub fn into_partial(self) -> RunHandle {
        *self.partial
    }
}

/// Launches the pipeline stages in order against the provisioned conduit.
///
/// Blocks only for the configured inter-stage delays; the returned handle
/// owns every spawned process plus the conduit.
///
/// # Errors
/// - `SequencingError` - A stage's executable could not be launched. The
///   error names the stage, carries the attempted command, and holds the
///   partial handle for cleanup.
pub async fn launch(
    config: &HarnessConfig,
    conduit: PipeConduit,
) -> Result<RunHandle, SequencingError> {
    let output_dir = expanded_or_unchanged(&config.pipeline.output_dir);
    let log_dir = expanded_or_unchanged(&config.pipeline.log_dir);
    let subscriber_set = SubscriberSet::plan(
        &output_dir,
        &log_dir,
        config.pipeline.subscriber_count,
    );
    subscriber_set.remove_stale_files();

    let mut handle = RunHandle::new(conduit, subscriber_set);

    if let Some(relay_launch) = &config.relay.launch {
        let spec = relay_command(config, relay_launch);
        info!("Starting relay via {}", relay_launch.ssh_target);
        match supervisor::spawn(&spec) {
            Ok(process) => handle.relay = Some(process),
            Err(source) => {
                return Err(SequencingError {
                    stage: Stage::Relay,
                    source,
                    partial: Box::new(handle),
                });
            }
        }
        tokio::time::sleep(config.pipeline.relay_startup_delay).await;
    }

    let spec = media_source_command(config, handle.conduit.path());
    info!("Starting media source into {}", handle.conduit.path().display());
    match supervisor::spawn(&spec) {
        Ok(process) => handle.source = Some(process),
        Err(source) => {
            return Err(SequencingError {
                stage: Stage::MediaSource,
                source,
                partial: Box::new(handle),
            });
        }
    }

    // Give the source time to open the pipe and settle before the publisher
    // starts pulling from it.
    tokio::time::sleep(config.pipeline.source_startup_delay).await;

    let spec = publisher_command(config, handle.conduit.path());
    info!("Starting publisher against {}", config.relay.connect_url());
    match supervisor::spawn(&spec) {
        Ok(process) => handle.publisher = Some(process),
        Err(source) => {
            return Err(SequencingError {
                stage: Stage::Publisher,
                source,
                partial: Box::new(handle),
            });
        }
    }

    // Subscribers are independent consumers of the same relay endpoint; no
    // inter-subscriber delay is needed.
    let entries = handle.subscriber_set.entries().to_vec();
    info!("Fanning out {} subscribers", entries.len());
    for entry in &entries {
        let spec = subscriber_command(config, entry);
        match supervisor::spawn(&spec) {
            Ok(process) => handle.subscribers.push(process),
            Err(source) => {
                return Err(SequencingError {
                    stage: Stage::Subscriber(entry.index),
                    source,
                    partial: Box::new(handle),
                });
            }
        }
    }

    info!(
        "Pipeline up: {} processes tracked",
        handle.process_count()
    );
    Ok(handle)
}

fn expanded_or_unchanged(path: &Path) -> PathBuf {
    expand_home(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::Relay.to_string(), "relay");
        assert_eq!(Stage::MediaSource.to_string(), "media-source");
        assert_eq!(Stage::Publisher.to_string(), "publisher");
        assert_eq!(Stage::Subscriber(3).to_string(), "subscriber-3");
    }

    #[test]
    fn test_subscriber_paths_never_collide() {
        let set = SubscriberSet::plan(Path::new("/tmp/out"), Path::new("/tmp/logs"), 10);

        let mut paths = HashSet::new();
        for entry in &set {
            assert!(paths.insert(entry.output.clone()));
            assert!(paths.insert(entry.stats_log.clone()));
        }
        assert_eq!(paths.len(), 20);
    }

    #[test]
    fn test_subscriber_set_is_ordered_by_index() {
        let set = SubscriberSet::plan(Path::new("/out"), Path::new("/logs"), 4);

        let indices: Vec<usize> = set.iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert_eq!(set.entries()[2].output, PathBuf::from("/out/moq-out-2.flv"));
        assert_eq!(set.entries()[2].stats_log, PathBuf::from("/logs/client-2.log"));
    }

    #[test]
    fn test_remove_stale_files_clears_previous_run() {
        let dir = tempdir().unwrap();
        let set = SubscriberSet::plan(dir.path(), dir.path(), 2);
        fs::write(&set.entries()[0].output, b"stale capture").unwrap();
        fs::write(&set.entries()[1].stats_log, b"stale stats").unwrap();

        set.remove_stale_files();

        assert!(!set.entries()[0].output.exists());
        assert!(!set.entries()[1].stats_log.exists());
    }

    #[test]
    fn test_remove_stale_files_tolerates_missing_files() {
        let dir = tempdir().unwrap();
        let set = SubscriberSet::plan(dir.path(), dir.path(), 3);

        // Nothing exists yet; must not error or panic
        set.remove_stale_files();
    }
}
