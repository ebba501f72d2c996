//! Integration tests for Slipstream
//!
//! These tests drive the real orchestration code against stub executables
//! written into temporary directories, so they exercise genuine process
//! spawning, signaling, and filesystem effects without requiring ffmpeg or
//! the relay clients on the machine running them.

#[path = "integration/support.rs"]
mod support;

#[path = "integration/conduit_lifecycle.rs"]
mod conduit_lifecycle;

#[path = "integration/pipeline_lifecycle.rs"]
mod pipeline_lifecycle;

#[path = "integration/validation.rs"]
mod validation;
