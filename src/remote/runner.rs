//! Process execution seam used for both remote (ssh/scp) and local commands.

use std::ffi::OsString;
use std::process::Command;

use thiserror::Error;
use tokio::task;

/// Output captured from a finished process.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit code reported by the process, if available.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }

    /// Describes the exit status for error messages.
    #[must_use]
    pub fn status_text(&self) -> String {
        self.code.map_or_else(
            || String::from("terminated without an exit code"),
            |code| format!("exited with status {code}"),
        )
    }
}

/// Raised when a process cannot be started at all.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("failed to spawn {program}: {message}")]
pub struct SpawnError {
    /// Program that failed to start.
    pub program: String,
    /// Operating system error message.
    pub message: String,
}

/// Abstraction over command execution to support fakes in tests.
///
/// Runners are cloned onto tokio's blocking pool by [`run_blocking`], so they
/// must be cheap to clone and shareable across threads.
pub trait CommandRunner: Clone + Send + Sync + 'static {
    /// Runs `program` with the given arguments, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// Returns [`SpawnError`] if the command cannot be started.
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, SpawnError>;
}

/// Runs `program` through `runner` on tokio's blocking pool.
///
/// The awaiting task stays responsive to cancellation, so a Ctrl-C handler
/// polled alongside it still fires while the process runs.
///
/// # Errors
///
/// Returns [`SpawnError`] if the command cannot be started or the blocking
/// task is lost.
pub async fn run_blocking<R: CommandRunner>(
    runner: &R,
    program: &str,
    args: Vec<OsString>,
) -> Result<CommandOutput, SpawnError> {
    let worker = runner.clone();
    let name = program.to_owned();
    task::spawn_blocking(move || worker.run(&name, &args))
        .await
        .map_err(|err| SpawnError {
            program: program.to_owned(),
            message: err.to_string(),
        })?
}

/// Real command runner that shells out to the host operating system.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessCommandRunner;

impl CommandRunner for ProcessCommandRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, SpawnError> {
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|err| SpawnError {
                program: program.to_owned(),
                message: err.to_string(),
            })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
