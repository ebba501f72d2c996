//! Full pipeline lifecycle: launch ordering, partial-failure semantics,
//! and coordinated shutdown, driven against stub executables.

use std::fs;
use std::time::Duration;

use slipstream_core::conduit::ensure_conduit;
use slipstream_core::config::RelayLaunch;
use slipstream_core::pipeline::{self, Stage};
use slipstream_core::shutdown;
use slipstream_core::supervisor::ProcessState;
use tempfile::tempdir;

use crate::support::{long_running_stub, recording_stub, stub_pipeline_config, write_stub};

#[tokio::test]
async fn test_launches_full_pipeline_and_shuts_it_down() {
    let dir = tempdir().unwrap();
    let ffmpeg = long_running_stub(dir.path(), "ffmpeg");
    let publisher = long_running_stub(dir.path(), "publisher");
    let subscriber = long_running_stub(dir.path(), "subscriber");
    let config = stub_pipeline_config(dir.path(), &ffmpeg, &publisher, &subscriber);

    let conduit = ensure_conduit(&config.pipeline.pipe_path).unwrap();
    let mut handle = pipeline::launch(&config, conduit).await.unwrap();

    assert_eq!(
        handle.process_count(),
        2 + config.pipeline.subscriber_count
    );
    assert_eq!(handle.source.as_ref().unwrap().state(), ProcessState::Running);
    assert_eq!(
        handle.publisher.as_ref().unwrap().state(),
        ProcessState::Running
    );
    assert_eq!(handle.subscribers.len(), config.pipeline.subscriber_count);

    shutdown::shutdown(&mut handle, config.pipeline.termination_grace).await;

    for subscriber in &handle.subscribers {
        assert_ne!(subscriber.state(), ProcessState::Running);
    }
    assert!(!config.pipeline.pipe_path.exists());
    assert!(handle.conduit.is_removed());
}

#[tokio::test]
async fn test_media_source_spawn_failure_aborts_remaining_stages() {
    let dir = tempdir().unwrap();
    let publisher = long_running_stub(dir.path(), "publisher");
    let subscriber = long_running_stub(dir.path(), "subscriber");
    let missing = dir.path().join("no-such-ffmpeg");
    let config = stub_pipeline_config(dir.path(), &missing, &publisher, &subscriber);

    let conduit = ensure_conduit(&config.pipeline.pipe_path).unwrap();
    let error = pipeline::launch(&config, conduit).await.unwrap_err();

    assert_eq!(error.stage, Stage::MediaSource);
    assert_eq!(error.stage.to_string(), "media-source");
    assert!(error.source.command.contains("no-such-ffmpeg"));

    // No later stage was spawned
    let mut partial = error.into_partial();
    assert!(partial.source.is_none());
    assert!(partial.publisher.is_none());
    assert!(partial.subscribers.is_empty());

    // Cleanup over the partial handle still works
    shutdown::shutdown(&mut partial, Duration::from_millis(500)).await;
    assert!(!config.pipeline.pipe_path.exists());
}

#[tokio::test]
async fn test_publisher_spawn_failure_leaves_source_for_cleanup() {
    let dir = tempdir().unwrap();
    let ffmpeg = long_running_stub(dir.path(), "ffmpeg");
    let subscriber = long_running_stub(dir.path(), "subscriber");
    let missing = dir.path().join("no-such-publisher");
    let config = stub_pipeline_config(dir.path(), &ffmpeg, &missing, &subscriber);

    let conduit = ensure_conduit(&config.pipeline.pipe_path).unwrap();
    let error = pipeline::launch(&config, conduit).await.unwrap_err();

    assert_eq!(error.stage, Stage::Publisher);

    let mut partial = error.into_partial();
    let source = partial.source.as_ref().unwrap();
    assert_eq!(source.state(), ProcessState::Running);
    assert!(partial.subscribers.is_empty());

    shutdown::shutdown(&mut partial, Duration::from_millis(500)).await;
    assert_ne!(
        partial.source.as_ref().unwrap().state(),
        ProcessState::Running
    );
}

#[tokio::test]
async fn test_shutdown_terminates_producers_before_subscribers() {
    let dir = tempdir().unwrap();
    let order_log = dir.path().join("order.log");
    let ffmpeg = recording_stub(dir.path(), "ffmpeg", "media-source", &order_log);
    let publisher = recording_stub(dir.path(), "publisher", "publisher", &order_log);
    let subscriber = recording_stub(dir.path(), "subscriber", "subscriber", &order_log);
    let config = stub_pipeline_config(dir.path(), &ffmpeg, &publisher, &subscriber);

    let conduit = ensure_conduit(&config.pipeline.pipe_path).unwrap();
    let mut handle = pipeline::launch(&config, conduit).await.unwrap();

    // Give the slowest stub time to install its trap before signaling.
    tokio::time::sleep(Duration::from_millis(500)).await;

    shutdown::shutdown(&mut handle, Duration::from_secs(5)).await;

    let recorded = fs::read_to_string(&order_log).unwrap();
    let lines: Vec<&str> = recorded.lines().collect();
    assert_eq!(lines.len(), 2 + config.pipeline.subscriber_count);
    assert_eq!(lines[0], "media-source");
    assert_eq!(lines[1], "publisher");
    assert!(lines[2..].iter().all(|line| *line == "subscriber"));

    // The conduit goes away only after every termination was issued
    assert!(!config.pipeline.pipe_path.exists());
}

#[tokio::test]
async fn test_relay_launch_is_caller_decided() {
    let dir = tempdir().unwrap();
    let ffmpeg = long_running_stub(dir.path(), "ffmpeg");
    let publisher = long_running_stub(dir.path(), "publisher");
    let subscriber = long_running_stub(dir.path(), "subscriber");
    let ssh = long_running_stub(dir.path(), "ssh");

    let mut config = stub_pipeline_config(dir.path(), &ffmpeg, &publisher, &subscriber);
    config.programs.ssh = ssh;
    config.relay.launch = Some(RelayLaunch::new("user@relay-host"));

    let conduit = ensure_conduit(&config.pipeline.pipe_path).unwrap();
    let mut handle = pipeline::launch(&config, conduit).await.unwrap();

    assert!(handle.relay.is_some());
    assert_eq!(
        handle.process_count(),
        3 + config.pipeline.subscriber_count
    );

    shutdown::shutdown(&mut handle, config.pipeline.termination_grace).await;
    assert_ne!(
        handle.relay.as_ref().unwrap().state(),
        ProcessState::Running
    );
}

#[tokio::test]
async fn test_second_shutdown_call_is_a_noop() {
    let dir = tempdir().unwrap();
    let ffmpeg = long_running_stub(dir.path(), "ffmpeg");
    let publisher = long_running_stub(dir.path(), "publisher");
    let subscriber = long_running_stub(dir.path(), "subscriber");
    let config = stub_pipeline_config(dir.path(), &ffmpeg, &publisher, &subscriber);

    let conduit = ensure_conduit(&config.pipeline.pipe_path).unwrap();
    let mut handle = pipeline::launch(&config, conduit).await.unwrap();

    shutdown::shutdown(&mut handle, config.pipeline.termination_grace).await;
    let states_after_first: Vec<ProcessState> =
        handle.subscribers.iter().map(|p| p.state()).collect();

    shutdown::shutdown(&mut handle, config.pipeline.termination_grace).await;
    let states_after_second: Vec<ProcessState> =
        handle.subscribers.iter().map(|p| p.state()).collect();

    assert_eq!(states_after_first, states_after_second);
    assert!(handle.conduit.is_removed());
}
