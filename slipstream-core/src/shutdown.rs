//! Coordinated teardown of a pipeline run.
//!
//! The only cancellation trigger is an external interruption signal; there
//! is no timeout-based auto-shutdown, so a hung run needs an operator.
//! Teardown order is producers before consumers: the media source and
//! publisher stop first so subscribers observe a clean end of stream, then
//! the fan-out, then the relay if this harness launched it, and finally the
//! pipe conduit is deleted.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::pipeline::RunHandle;
use crate::supervisor::ManagedProcess;

/// Suspends until the process receives an interruption signal.
///
/// Listens for SIGINT (Ctrl-C) and SIGTERM. Each call installs fresh
/// listeners.
///
/// # Errors
/// - `io::Error` - Signal listener registration failed
#[cfg(unix)]
pub async fn wait_for_interrupt() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
    }
    Ok(())
}

/// Suspends until the process receives an interruption signal.
///
/// # Errors
/// - `io::Error` - Signal listener registration failed
#[cfg(not(unix))]
pub async fn wait_for_interrupt() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

/// Terminates every process in the run and removes the pipe conduit.
///
/// Best-effort throughout: a process that outlives its grace period is
/// force-killed and logged; a conduit that cannot be deleted is logged. No
/// failure here aborts the rest of the teardown. Idempotent: a second call
/// issues no further terminations and no second conduit deletion.
pub async fn shutdown(handle: &mut RunHandle, grace: Duration) {
    info!("Shutting down {} pipeline processes", handle.process_count());

    // Producer side first
    if let Some(source) = handle.source.as_mut() {
        terminate_logged(source, grace).await;
    }
    if let Some(publisher) = handle.publisher.as_mut() {
        terminate_logged(publisher, grace).await;
    }

    // Consumer fan-out; subscribers are independent, order among them is
    // irrelevant
    for subscriber in &mut handle.subscribers {
        terminate_logged(subscriber, grace).await;
    }

    // The relay goes last: both sides have disconnected by now
    if let Some(relay) = handle.relay.as_mut() {
        terminate_logged(relay, grace).await;
    }

    match handle.conduit.remove() {
        Ok(()) => debug!("Pipe conduit removed"),
        Err(e) => warn!(
            "Could not remove pipe conduit {}: {e}",
            handle.conduit.path().display()
        ),
    }

    info!("Shutdown complete");
}

async fn terminate_logged(process: &mut ManagedProcess, grace: Duration) {
    match process.terminate(grace).await {
        Ok(()) => debug!("{} stopped after {:?}", process.label(), process.uptime()),
        Err(e) => warn!("{e}"),
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use crate::conduit::ensure_conduit;
    use crate::config::HarnessConfig;
    use crate::pipeline::{self, SubscriberSet};
    use crate::supervisor::ProcessState;

    use super::*;

    fn stub_config(dir: &std::path::Path) -> HarnessConfig {
        let mut config = HarnessConfig::for_testing();
        config.pipeline.pipe_path = dir.join("fifo.flv");
        config.pipeline.output_dir = dir.to_path_buf();
        config.pipeline.log_dir = dir.to_path_buf();
        // `sleep` accepts none of the real flags, but it spawns fine and
        // exits on its own, which is all these tests need.
        config.programs.ffmpeg = "sleep".into();
        config.programs.publisher = "sleep".into();
        config.programs.subscriber = "sleep".into();
        config
    }

    #[tokio::test]
    async fn test_shutdown_terminates_everything_and_removes_conduit() {
        let dir = tempdir().unwrap();
        let config = stub_config(dir.path());
        let conduit = ensure_conduit(&config.pipeline.pipe_path).unwrap();

        let mut handle = pipeline::launch(&config, conduit).await.unwrap();
        assert_eq!(handle.process_count(), 2 + config.pipeline.subscriber_count);

        shutdown(&mut handle, config.pipeline.termination_grace).await;

        for process in handle
            .source
            .iter()
            .chain(handle.publisher.iter())
            .chain(handle.subscribers.iter())
        {
            assert_ne!(process.state(), ProcessState::Running);
        }
        assert!(!config.pipeline.pipe_path.exists());
        assert!(handle.conduit.is_removed());
    }

    #[tokio::test]
    async fn test_shutdown_twice_has_no_further_side_effects() {
        let dir = tempdir().unwrap();
        let config = stub_config(dir.path());
        let conduit = ensure_conduit(&config.pipeline.pipe_path).unwrap();

        let mut handle = pipeline::launch(&config, conduit).await.unwrap();

        shutdown(&mut handle, config.pipeline.termination_grace).await;
        shutdown(&mut handle, config.pipeline.termination_grace).await;

        assert!(handle.conduit.is_removed());
    }

    #[tokio::test]
    async fn test_shutdown_on_empty_handle() {
        let dir = tempdir().unwrap();
        let pipe = dir.path().join("fifo.flv");
        let conduit = ensure_conduit(&pipe).unwrap();
        let mut handle = pipeline_handle_without_processes(conduit);

        shutdown(&mut handle, Duration::from_millis(100)).await;

        assert_eq!(handle.process_count(), 0);
        assert!(!pipe.exists());
    }

    fn pipeline_handle_without_processes(
        conduit: crate::conduit::PipeConduit,
    ) -> RunHandle {
        RunHandle {
            relay: None,
            source: None,
            publisher: None,
            subscribers: Vec::new(),
            conduit,
            subscriber_set: SubscriberSet::default(),
        }
    }
}
