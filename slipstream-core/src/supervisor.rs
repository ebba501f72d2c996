//! Spawning and lifecycle tracking for the external pipeline processes.
//!
//! The harness never links the relay, the clients, or ffmpeg; it only owns
//! OS-level handles to them. Spawning never waits for a child to become
//! ready (the sequencer's fixed delays cover that), and termination is
//! graceful-with-escalation so an unresponsive child can never hang the
//! teardown path.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// A stage's executable could not be launched.
#[derive(Debug, Error)]
#[error("Failed to spawn `{command}`: {source}")]
pub struct SpawnError {
    /// The attempted command line
    pub command: String,
    pub source: std::io::Error,
}

/// A process outlived its graceful-termination budget and was killed.
///
/// Recovered locally by the forced kill; reported so callers can log it,
/// never fatal to the run.
#[derive(Debug, Error)]
#[error("{label} did not exit within {grace:?} after SIGTERM; killed")]
pub struct TerminationTimeoutError {
    pub label: String,
    pub grace: Duration,
}

/// Command line for one pipeline stage.
///
/// Arguments are passed to the OS directly, with no shell interpretation.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub label: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    /// Creates a spec for `program` labeled `label` for logs and errors.
    pub fn new(label: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            label: label.into(),
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
        }
    }

    /// Appends a single argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends a sequence of arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets an environment variable for the child.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Sets the child's working directory.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Renders the full command line for diagnostics.
    pub fn rendered(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Liveness of a managed process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Spawned and not yet observed to have stopped
    Running,
    /// Exited on its own
    Exited,
    /// Stopped by [`ManagedProcess::terminate`]
    Terminated,
}

/// Handle to one externally-owned OS process.
///
/// The handle tracks liveness and reaps the child explicitly; it owns
/// nothing of the child beyond what the host process model provides.
#[derive(Debug)]
pub struct ManagedProcess {
    label: String,
    command_line: String,
    child: Child,
    state: ProcessState,
    started_at: Instant,
}

impl ManagedProcess {
    /// Stage label this process was spawned under.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The command line the process was started with.
    pub fn command_line(&self) -> &str {
        &self.command_line
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Time since the process was spawned.
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// OS process id, if the child has not been reaped yet.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Waits for the process to exit on its own and reaps it.
    ///
    /// # Errors
    /// - `io::Error` - The wait syscall failed
    pub async fn wait_for_exit(&mut self) -> std::io::Result<ExitStatus> {
        let status = self.child.wait().await?;
        if self.state == ProcessState::Running {
            self.state = ProcessState::Exited;
        }
        debug!("{} exited with {status}", self.label);
        Ok(status)
    }

    /// Requests graceful termination, escalating to a forced kill.
    ///
    /// Sends SIGTERM and waits up to `grace` for the child to exit. A child
    /// that ignores the signal is killed and reaped, so this never hangs.
    /// Calling it on a process that already stopped is a no-op.
    ///
    /// # Errors
    /// - `TerminationTimeoutError` - The grace period elapsed and the child
    ///   had to be killed. Already recovered; callers log and move on.
    pub async fn terminate(
        &mut self,
        grace: Duration,
    ) -> Result<(), TerminationTimeoutError> {
        if self.state != ProcessState::Running {
            return Ok(());
        }

        // The child may have exited on its own since the last check.
        if let Ok(Some(status)) = self.child.try_wait() {
            debug!("{} already exited with {status}", self.label);
            self.state = ProcessState::Exited;
            return Ok(());
        }

        if let Some(id) = self.child.id() {
            use nix::sys::signal::{Signal, kill};
            use nix::unistd::Pid;

            let _ = kill(Pid::from_raw(id as i32), Signal::SIGTERM);
            debug!("Sent SIGTERM to {} (pid {id})", self.label);
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!("{} terminated with {status}", self.label);
                self.state = ProcessState::Terminated;
                Ok(())
            }
            Ok(Err(e)) => {
                // The wait itself failed; nothing further to reap.
                warn!("Wait for {} failed during termination: {e}", self.label);
                self.state = ProcessState::Terminated;
                Ok(())
            }
            Err(_elapsed) => {
                if let Err(e) = self.child.kill().await {
                    warn!("Forced kill of {} failed: {e}", self.label);
                }
                self.state = ProcessState::Terminated;
                Err(TerminationTimeoutError {
                    label: self.label.clone(),
                    grace,
                })
            }
        }
    }
}

/// Spawns the process described by `spec`.
///
/// Returns as soon as the OS has started the child; readiness of the
/// spawned program is not awaited.
///
/// # Errors
/// - `SpawnError` - The executable could not be launched (not found,
///   not executable, remote channel unreachable). Carries the attempted
///   command line.
pub fn spawn(spec: &CommandSpec) -> Result<ManagedProcess, SpawnError> {
    let mut command = Command::new(&spec.program);
    command.args(&spec.args);
    for (key, value) in &spec.env {
        command.env(key, value);
    }
    if let Some(cwd) = &spec.cwd {
        command.current_dir(cwd);
    }
    // The children share the harness terminal for their output but must not
    // compete for its stdin.
    command.stdin(Stdio::null());

    let command_line = spec.rendered();
    let child = command.spawn().map_err(|source| SpawnError {
        command: command_line.clone(),
        source,
    })?;

    debug!(
        "Spawned {} (pid {:?}): {command_line}",
        spec.label,
        child.id()
    );

    Ok(ManagedProcess {
        label: spec.label.clone(),
        command_line,
        child,
        state: ProcessState::Running,
        started_at: Instant::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sleep_spec(seconds: &str) -> CommandSpec {
        CommandSpec::new("sleeper", "sleep").arg(seconds)
    }

    #[test]
    fn test_command_spec_rendering() {
        let spec = CommandSpec::new("publisher", "/opt/bin/publisher")
            .arg("-connect_url")
            .arg("https://127.0.0.1:4433/moq")
            .args(["--logging", "DBG1"]);

        assert_eq!(
            spec.rendered(),
            "/opt/bin/publisher -connect_url https://127.0.0.1:4433/moq --logging DBG1"
        );
    }

    #[tokio::test]
    async fn test_spawn_missing_executable_reports_command() {
        let spec = CommandSpec::new("media-source", "/nonexistent/ffmpeg")
            .arg("-y")
            .arg("-i")
            .arg("input.flv");

        let error = spawn(&spec).unwrap_err();

        assert!(error.command.starts_with("/nonexistent/ffmpeg -y"));
        assert_eq!(error.source.kind(), std::io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_spawn_and_wait_for_exit() {
        let spec = CommandSpec::new("true", "true");
        let mut process = spawn(&spec).unwrap();

        assert_eq!(process.state(), ProcessState::Running);

        let status = process.wait_for_exit().await.unwrap();
        assert!(status.success());
        assert_eq!(process.state(), ProcessState::Exited);
    }

    #[tokio::test]
    async fn test_terminate_running_process() {
        let mut process = spawn(&sleep_spec("30")).unwrap();

        process.terminate(Duration::from_secs(5)).await.unwrap();

        assert_eq!(process.state(), ProcessState::Terminated);
    }

    #[tokio::test]
    async fn test_terminate_is_noop_after_exit() {
        let mut process = spawn(&CommandSpec::new("true", "true")).unwrap();
        process.wait_for_exit().await.unwrap();

        process.terminate(Duration::from_secs(1)).await.unwrap();

        assert_eq!(process.state(), ProcessState::Exited);
    }

    #[tokio::test]
    async fn test_terminate_twice_is_noop() {
        let mut process = spawn(&sleep_spec("30")).unwrap();

        process.terminate(Duration::from_secs(5)).await.unwrap();
        process.terminate(Duration::from_secs(5)).await.unwrap();

        assert_eq!(process.state(), ProcessState::Terminated);
    }

    #[tokio::test]
    async fn test_terminate_escalates_on_ignored_sigterm() {
        let spec = CommandSpec::new("stubborn", "sh")
            .arg("-c")
            .arg("trap '' TERM; sleep 30");
        let mut process = spawn(&spec).unwrap();

        // Give the shell a moment to install its trap.
        tokio::time::sleep(Duration::from_millis(200)).await;

        let result = process.terminate(Duration::from_millis(300)).await;

        assert!(result.is_err());
        assert_eq!(process.state(), ProcessState::Terminated);
    }
}
