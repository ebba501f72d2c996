//! Slipstream CLI - Command-line interface
//!
//! Drives the end-to-end streaming pipeline harness: provision, launch,
//! wait for interruption, tear down, validate.

mod commands;

use clap::Parser;
use slipstream_core::tracing_setup::{self, LogVerbosity};

#[derive(Parser)]
#[command(name = "slipstream")]
#[command(about = "An end-to-end streaming pipeline test harness")]
struct Cli {
    /// Console log level (full debug always goes to logs/)
    #[arg(long, value_enum, default_value_t = LogVerbosity::Info)]
    log_level: LogVerbosity,

    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_setup::init_tracing(cli.log_level.as_tracing_level(), None)?;

    commands::handle_command(cli.command).await?;

    Ok(())
}
