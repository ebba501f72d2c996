//! CLI command implementations

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Subcommand;
use slipstream_core::config::{HarnessConfig, RelayLaunch};
use slipstream_core::pipeline::{self, SubscriberSet};
use slipstream_core::validate::{self, FfprobeProber, SubscriberReport};
use slipstream_core::{conduit, shutdown};

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Drive the full pipeline: provision, launch, wait, shut down, validate
    Run {
        /// Number of subscriber processes to fan out
        #[arg(short = 'n', long)]
        subscribers: Option<usize>,
        /// Relay host or IP
        #[arg(long)]
        host: Option<String>,
        /// Relay port
        #[arg(long)]
        port: Option<u16>,
        /// Named pipe path for the media source → publisher hand-off
        #[arg(long)]
        pipe: Option<PathBuf>,
        /// Directory for captured subscriber outputs
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Length of the generated stream in seconds
        #[arg(long)]
        duration: Option<u64>,
        /// Launch the relay over SSH instead of assuming one is running
        #[arg(long, requires = "ssh_target")]
        launch_relay: bool,
        /// SSH target for --launch-relay, e.g. user@relay-host
        #[arg(long)]
        ssh_target: Option<String>,
    },
    /// Probe previously captured subscriber outputs and report durations
    Validate {
        /// Directory containing captured outputs
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Directory containing per-subscriber stats logs
        #[arg(long)]
        log_dir: Option<PathBuf>,
        /// Number of subscriber outputs to probe
        #[arg(short = 'n', long)]
        subscribers: Option<usize>,
    },
}

/// Handle the CLI command
///
/// # Errors
/// Returns appropriate error based on the command that fails
pub async fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Run {
            subscribers,
            host,
            port,
            pipe,
            output_dir,
            duration,
            launch_relay,
            ssh_target,
        } => {
            let config = build_run_config(
                subscribers,
                host,
                port,
                pipe,
                output_dir,
                duration,
                launch_relay,
                ssh_target,
            );
            run_pipeline(config).await
        }
        Commands::Validate {
            output_dir,
            log_dir,
            subscribers,
        } => validate_outputs(output_dir, log_dir, subscribers).await,
    }
}

/// Builds the run configuration: env overrides first, CLI flags on top.
#[allow(clippy::too_many_arguments)]
fn build_run_config(
    subscribers: Option<usize>,
    host: Option<String>,
    port: Option<u16>,
    pipe: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    duration: Option<u64>,
    launch_relay: bool,
    ssh_target: Option<String>,
) -> HarnessConfig {
    let mut config = HarnessConfig::from_env();

    if let Some(count) = subscribers {
        config.pipeline.subscriber_count = count;
    }
    if let Some(host) = host {
        config.relay.host = host;
    }
    if let Some(port) = port {
        config.relay.port = port;
    }
    if let Some(pipe) = pipe {
        config.pipeline.pipe_path = pipe;
    }
    if let Some(dir) = output_dir {
        config.pipeline.output_dir = dir;
    }
    if let Some(seconds) = duration {
        config.media.duration = Duration::from_secs(seconds);
    }
    if launch_relay {
        if let Some(target) = ssh_target {
            config.relay.launch = Some(RelayLaunch::new(target));
        }
    }

    config
}

/// Drive one full pipeline run.
///
/// # Errors
/// - `ConduitError` - The pipe conduit could not be provisioned
/// - `SequencingError` - A stage failed to start (cleanup still runs over
///   the stages that did start)
async fn run_pipeline(config: HarnessConfig) -> anyhow::Result<()> {
    println!("Starting Slipstream pipeline");
    println!("Relay URL: {}", config.relay.connect_url());
    println!("Subscribers: {}", config.pipeline.subscriber_count);
    println!("Pipe: {}", config.pipeline.pipe_path.display());
    println!(
        "Relay launch: {}",
        match &config.relay.launch {
            Some(launch) => format!("via {}", launch.ssh_target),
            None => "external (pre-provisioned)".to_string(),
        }
    );
    println!("{:-<50}", "");

    let conduit = conduit::ensure_conduit(&config.pipeline.pipe_path)
        .context("failed to provision the pipe conduit")?;

    let mut handle = match pipeline::launch(&config, conduit).await {
        Ok(handle) => handle,
        Err(error) => {
            let stage = error.stage;
            let command = error.source.command.clone();
            tracing::error!("{error}");
            // The stages that did start are still running; clean them up
            // before reporting the failure.
            let mut partial = error.into_partial();
            shutdown::shutdown(&mut partial, config.pipeline.termination_grace).await;
            anyhow::bail!("{stage} stage failed to start (command: {command})");
        }
    };

    println!(
        "Pipeline running with {} processes. Press Ctrl+C to stop.",
        handle.process_count()
    );

    shutdown::wait_for_interrupt()
        .await
        .context("failed to listen for an interruption signal")?;
    println!("Interruption received, terminating processes...");

    shutdown::shutdown(&mut handle, config.pipeline.termination_grace).await;

    let prober = FfprobeProber::new(&config.programs.ffprobe);
    let reports = validate::validate_all(&prober, &handle.subscriber_set).await;
    print_validation_summary(&reports);

    Ok(())
}

/// Probe a previous run's outputs without driving the pipeline.
///
/// # Errors
/// - `ConduitError` - A `~`-prefixed directory could not be expanded
async fn validate_outputs(
    output_dir: Option<PathBuf>,
    log_dir: Option<PathBuf>,
    subscribers: Option<usize>,
) -> anyhow::Result<()> {
    let config = HarnessConfig::from_env();
    let output_dir = output_dir.unwrap_or_else(|| config.pipeline.output_dir.clone());
    let log_dir = log_dir.unwrap_or_else(|| config.pipeline.log_dir.clone());
    let count = subscribers.unwrap_or(config.pipeline.subscriber_count);

    let output_dir =
        conduit::expand_home(&output_dir).context("failed to expand the output directory")?;
    let log_dir = conduit::expand_home(&log_dir).context("failed to expand the log directory")?;

    let set = SubscriberSet::plan(&output_dir, &log_dir, count);
    let prober = FfprobeProber::new(&config.programs.ffprobe);
    let reports = validate::validate_all(&prober, &set).await;
    print_validation_summary(&reports);

    Ok(())
}

/// Render the per-subscriber outcomes, success or error, individually.
fn print_validation_summary(reports: &[SubscriberReport]) {
    println!();
    println!("Validation summary");
    println!("{:-<60}", "");

    for report in reports {
        println!("{}", format_report_line(report));
    }

    let succeeded = reports.iter().filter(|r| r.duration.is_ok()).count();
    println!("{succeeded}/{} outputs validated", reports.len());
}

fn format_report_line(report: &SubscriberReport) -> String {
    match &report.duration {
        Ok(duration) => format!(
            "subscriber {:>2}: {:.3}s ({})",
            report.index,
            duration.as_secs_f64(),
            report.output.display()
        ),
        Err(error) => format!("subscriber {:>2}: ERROR {error}", report.index),
    }
}

#[cfg(test)]
mod tests {
    use slipstream_core::validate::ValidationError;

    use super::*;

    #[test]
    fn test_build_run_config_applies_overrides() {
        let config = build_run_config(
            Some(4),
            Some("relay.test".to_string()),
            Some(9443),
            Some(PathBuf::from("/tmp/pipe.flv")),
            Some(PathBuf::from("/tmp/outputs")),
            Some(60),
            false,
            None,
        );

        assert_eq!(config.pipeline.subscriber_count, 4);
        assert_eq!(config.relay.host, "relay.test");
        assert_eq!(config.relay.port, 9443);
        assert_eq!(config.relay.connect_url(), "https://relay.test:9443/moq");
        assert_eq!(config.pipeline.pipe_path, PathBuf::from("/tmp/pipe.flv"));
        assert_eq!(config.media.duration, Duration::from_secs(60));
        assert!(config.relay.launch.is_none());
    }

    #[test]
    fn test_build_run_config_keeps_defaults_without_overrides() {
        let config = build_run_config(None, None, None, None, None, None, false, None);

        assert_eq!(config.pipeline.subscriber_count, 10);
        assert_eq!(config.relay.port, 4433);
    }

    #[test]
    fn test_build_run_config_wires_relay_launch() {
        let config = build_run_config(
            None,
            None,
            None,
            None,
            None,
            None,
            true,
            Some("user@relay-host".to_string()),
        );

        let launch = config.relay.launch.expect("relay launch should be set");
        assert_eq!(launch.ssh_target, "user@relay-host");
    }

    #[test]
    fn test_format_report_line_success() {
        let report = SubscriberReport {
            index: 3,
            output: PathBuf::from("/tmp/moq-out-3.flv"),
            duration: Ok(Duration::from_secs_f64(300.043)),
        };

        let line = format_report_line(&report);

        assert!(line.contains("subscriber  3"));
        assert!(line.contains("300.043s"));
        assert!(line.contains("/tmp/moq-out-3.flv"));
    }

    #[test]
    fn test_format_report_line_error() {
        let report = SubscriberReport {
            index: 7,
            output: PathBuf::from("/tmp/moq-out-7.flv"),
            duration: Err(ValidationError::MissingOutput {
                path: PathBuf::from("/tmp/moq-out-7.flv"),
            }),
        };

        let line = format_report_line(&report);

        assert!(line.contains("subscriber  7"));
        assert!(line.contains("ERROR"));
        assert!(line.contains("Output file missing"));
    }
}
