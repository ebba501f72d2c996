//! Shared helpers: stub executables and harness configs for tests.

use std::fs;
use std::path::{Path, PathBuf};

use slipstream_core::config::HarnessConfig;

/// Writes an executable shell stub and returns its path.
pub fn write_stub(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// A stub that stays alive until terminated.
pub fn long_running_stub(dir: &Path, name: &str) -> PathBuf {
    write_stub(dir, name, "exec sleep 30")
}

/// A stub that appends `label` to `order_log` when terminated, so tests can
/// observe the relative teardown order across processes.
pub fn recording_stub(dir: &Path, name: &str, label: &str, order_log: &Path) -> PathBuf {
    let body = format!(
        "trap 'echo {label} >> \"{}\"; exit 0' TERM\nsleep 30 &\nwait $!",
        order_log.display()
    );
    write_stub(dir, name, &body)
}

/// Testing config with pipe/output/log paths under `dir` and every program
/// replaced by the given stub paths.
pub fn stub_pipeline_config(
    dir: &Path,
    ffmpeg: &Path,
    publisher: &Path,
    subscriber: &Path,
) -> HarnessConfig {
    let mut config = HarnessConfig::for_testing();
    config.pipeline.pipe_path = dir.join("fifo.flv");
    config.pipeline.output_dir = dir.join("out");
    config.pipeline.log_dir = dir.join("logs");
    fs::create_dir_all(&config.pipeline.output_dir).unwrap();
    fs::create_dir_all(&config.pipeline.log_dir).unwrap();
    config.programs.ffmpeg = ffmpeg.to_path_buf();
    config.programs.publisher = publisher.to_path_buf();
    config.programs.subscriber = subscriber.to_path_buf();
    config
}
