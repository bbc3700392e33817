//! Running `git` as a child process.
//!
//! [`GitRepository`](crate::GitRepository) never spawns processes itself; it
//! goes through [`CommandExecutor`] so tests can script the output of every
//! invocation.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

/// Outcome of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// The process exited with status zero.
    pub success: bool,
    /// Exit code, if the process was not killed by a signal.
    pub code: Option<i32>,
    /// Captured standard output, lossily decoded.
    pub stdout: String,
    /// Captured standard error, lossily decoded.
    pub stderr: String,
}

/// Why a command produced no [`CommandResult`].
#[derive(Debug, Error)]
pub enum ExecError {
    /// The process could not be started or its output could not be read.
    #[error("failed to run command: {0}")]
    Io(#[from] std::io::Error),

    /// The process did not finish in time and was killed.
    #[error("command did not finish within {0:?}")]
    TimedOut(Duration),
}

/// Runs `git` with the given arguments in a working directory.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Runs `git <args>` in `cwd`, killing it if it outlives `timeout`.
    async fn execute(
        &self,
        args: &[String],
        cwd: &Path,
        timeout: Option<Duration>,
    ) -> Result<CommandResult, ExecError>;
}

/// [`CommandExecutor`] that spawns the system `git`.
///
/// Terminal prompts are disabled so a credential request fails the command
/// instead of hanging it.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessExecutor;

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn execute(
        &self,
        args: &[String],
        cwd: &Path,
        timeout: Option<Duration>,
    ) -> Result<CommandResult, ExecError> {
        let mut command = Command::new("git");
        command
            .args(args)
            .current_dir(cwd)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match timeout {
            Some(limit) => tokio::time::timeout(limit, command.output())
                .await
                .map_err(|_| ExecError::TimedOut(limit))??,
            None => command.output().await?,
        };

        Ok(CommandResult {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn version_runs_outside_a_repository() {
        let dir = std::env::temp_dir();
        let result = ProcessExecutor
            .execute(&["--version".to_string()], &dir, Some(Duration::from_secs(30)))
            .await;

        // Hosts without git report a spawn failure rather than a result.
        match result {
            Ok(result) => {
                assert!(result.success);
                assert!(result.stdout.starts_with("git version"));
            }
            Err(e) => assert!(matches!(e, ExecError::Io(_))),
        }
    }

    #[tokio::test]
    async fn missing_working_directory_is_an_io_error() {
        let result = ProcessExecutor
            .execute(
                &["status".to_string()],
                Path::new("/nonexistent/commit-announcer"),
                None,
            )
            .await;

        assert!(matches!(result, Err(ExecError::Io(_))));
    }
}
