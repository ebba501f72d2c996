//! Tracing setup for the Slipstream harness
//!
//! Provides dual output: console logs at a user-controlled level and full
//! debug logs on disk. A pipeline run involves a dozen external processes,
//! so the on-disk log is the primary forensic record when a run stalls.

use std::fs::{File, create_dir_all};
use std::io;
use std::path::Path;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// Initialize tracing with dual output: console (user level) + file (full debug).
///
/// Writes complete debug logs to `logs/slipstream-last-run.log`, overwriting
/// the previous run.
///
/// # Errors
/// - `io::Error` - If the logs directory cannot be created or the log file
///   cannot be opened for writing
pub fn init_tracing(console_level: Level, logs_dir: Option<&Path>) -> io::Result<()> {
    let logs_path = logs_dir.unwrap_or_else(|| Path::new("logs"));
    create_dir_all(logs_path)?;

    let log_file_path = logs_path.join("slipstream-last-run.log");
    let log_file = File::create(&log_file_path)?;

    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(console_level.to_string()));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_filter(console_filter);

    // File layer always captures everything for post-run debugging
    let file_layer = fmt::layer()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(log_file)
        .with_filter(EnvFilter::new("trace"));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();

    tracing::info!(
        "Tracing initialized: console={}, debug_file={}",
        console_level,
        log_file_path.display()
    );

    Ok(())
}

/// Log verbosity selectable from the CLI.
///
/// One knob drives two outputs: the harness's own console level, and the
/// `--logging` flag handed to the external relay/publisher/subscriber
/// binaries, which use a different level vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogVerbosity {
    /// Only error messages
    Error,
    /// Warning and error messages
    Warn,
    /// Informational, warning, and error messages
    Info,
    /// Debug, informational, warning, and error messages
    Debug,
    /// All messages including detailed tracing
    Trace,
}

impl LogVerbosity {
    /// Converts the verbosity to a tracing Level for the harness's own logs.
    pub fn as_tracing_level(self) -> Level {
        match self {
            LogVerbosity::Error => Level::ERROR,
            LogVerbosity::Warn => Level::WARN,
            LogVerbosity::Info => Level::INFO,
            LogVerbosity::Debug => Level::DEBUG,
            LogVerbosity::Trace => Level::TRACE,
        }
    }

    /// Converts the verbosity to the `--logging` flag value understood by
    /// the external client binaries.
    pub fn client_flag(self) -> &'static str {
        match self {
            LogVerbosity::Error => "ERR",
            LogVerbosity::Warn => "WARNING",
            LogVerbosity::Info => "INFO",
            LogVerbosity::Debug => "DBG1",
            LogVerbosity::Trace => "DBG4",
        }
    }
}

impl std::fmt::Display for LogVerbosity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogVerbosity::Error => write!(f, "error"),
            LogVerbosity::Warn => write!(f, "warn"),
            LogVerbosity::Info => write!(f, "info"),
            LogVerbosity::Debug => write!(f, "debug"),
            LogVerbosity::Trace => write!(f, "trace"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_maps_to_tracing_level() {
        assert_eq!(LogVerbosity::Error.as_tracing_level(), Level::ERROR);
        assert_eq!(LogVerbosity::Info.as_tracing_level(), Level::INFO);
        assert_eq!(LogVerbosity::Trace.as_tracing_level(), Level::TRACE);
    }

    #[test]
    fn test_verbosity_maps_to_client_flag() {
        assert_eq!(LogVerbosity::Error.client_flag(), "ERR");
        assert_eq!(LogVerbosity::Info.client_flag(), "INFO");
        assert_eq!(LogVerbosity::Debug.client_flag(), "DBG1");
        assert_eq!(LogVerbosity::Trace.client_flag(), "DBG4");
    }

    #[test]
    fn test_verbosity_display() {
        assert_eq!(LogVerbosity::Warn.to_string(), "warn");
        assert_eq!(LogVerbosity::Debug.to_string(), "debug");
    }
}
