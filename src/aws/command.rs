//! Command runner abstraction used to shell out to the AWS CLI.

use std::ffi::OsString;
use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;

use thiserror::Error;
use tokio::process::Command;

/// Result of running an external command.
#[derive(Clone, Debug, Eq, PartialEq)]
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
}

/// Raised when a command cannot be started at all.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CommandError {
    /// Raised when the process fails to spawn.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Program that failed to spawn.
        program: String,
        /// Error message reported by the OS.
        message: String,
    },
}

/// Future returned by [`CommandRunner::run`].
pub type CommandFuture<'a> =
    Pin<Box<dyn Future<Output = Result<CommandOutput, CommandError>> + Send + 'a>>;

/// Abstraction over command execution to support fakes in tests.
pub trait CommandRunner: Send + Sync {
    /// Runs `program` with the given arguments, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Spawn`] if the command cannot be started.
    fn run<'a>(&'a self, program: &'a str, args: &'a [OsString]) -> CommandFuture<'a>;
}

/// Real command runner that spawns processes on the tokio runtime.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessCommandRunner;

impl CommandRunner for ProcessCommandRunner {
    fn run<'a>(&'a self, program: &'a str, args: &'a [OsString]) -> CommandFuture<'a> {
        Box::pin(async move {
            let output = Command::new(program)
                .args(args)
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output()
                .await
                .map_err(|err| CommandError::Spawn {
                    program: program.to_owned(),
                    message: err.to_string(),
                })?;

            Ok(CommandOutput {
                code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        })
    }
}
