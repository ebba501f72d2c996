//! Slipstream Core - End-to-end streaming pipeline test orchestration
//!
//! This crate provides the building blocks for driving a full streaming
//! pipeline as external processes: named-pipe provisioning, process
//! supervision, stage sequencing, coordinated shutdown, and post-run
//! validation of captured subscriber outputs.

pub mod conduit;
pub mod config;
pub mod pipeline;
pub mod shutdown;
pub mod supervisor;
pub mod tracing_setup;
pub mod validate;

// Re-export main types for convenient access
pub use conduit::{ConduitError, PipeConduit, ensure_conduit};
pub use config::HarnessConfig;
pub use pipeline::{RunHandle, SequencingError, SubscriberSet};
pub use supervisor::{
    CommandSpec, ManagedProcess, ProcessState, SpawnError, TerminationTimeoutError,
};
pub use validate::{DurationProber, FfprobeProber, ValidationError};

/// Core errors that can bubble up from any Slipstream subsystem.
#[derive(Debug, thiserror::Error)]
pub enum SlipstreamError {
    #[error("Conduit error: {0}")]
    Conduit(#[from] ConduitError),

    #[error("Spawn error: {0}")]
    Spawn(#[from] SpawnError),

    #[error("Sequencing error: {0}")]
    Sequencing(#[from] SequencingError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SlipstreamError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            SlipstreamError::Conduit(e) => format!("Could not provision the named pipe: {e}"),
            SlipstreamError::Spawn(e) => format!("Could not start a pipeline process: {e}"),
            SlipstreamError::Sequencing(e) => {
                format!("Pipeline startup failed at the {} stage", e.stage)
            }
            SlipstreamError::Validation(e) => format!("Output validation failed: {e}"),
            SlipstreamError::Io(_) => "File system error occurred".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SlipstreamError>;
