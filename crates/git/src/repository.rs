//! [`VcsClient`] over a local clone, driven through the `git` CLI.

use std::path::PathBuf;
use std::time::Duration;

use announcer::{CommitId, VcsClient, VcsError};
use async_trait::async_trait;
use tracing::{debug, info};

use crate::executor::{CommandExecutor, CommandResult, ExecError, ProcessExecutor};

/// Remote the clone pulls from unless configured otherwise.
pub const DEFAULT_REMOTE: &str = "origin";

/// Branch the clone tracks unless configured otherwise.
pub const DEFAULT_BRANCH: &str = "master";

/// A local clone tracking `<remote>/<branch>`.
#[derive(Debug, Clone)]
pub struct GitRepository<E = ProcessExecutor> {
    workdir: PathBuf,
    remote: String,
    branch: String,
    executor: E,
}

impl GitRepository<ProcessExecutor> {
    /// Opens the clone at `workdir`, tracking [`DEFAULT_REMOTE`]/[`DEFAULT_BRANCH`].
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self::with_executor(workdir, ProcessExecutor)
    }
}

impl<E: CommandExecutor> GitRepository<E> {
    /// Opens the clone at `workdir`, running commands through `executor`.
    pub fn with_executor(workdir: impl Into<PathBuf>, executor: E) -> Self {
        Self {
            workdir: workdir.into(),
            remote: DEFAULT_REMOTE.to_string(),
            branch: DEFAULT_BRANCH.to_string(),
            executor,
        }
    }

    /// Tracks `branch` on `remote` instead of the defaults.
    pub fn tracking(mut self, remote: impl Into<String>, branch: impl Into<String>) -> Self {
        self.remote = remote.into();
        self.branch = branch.into();
        self
    }

    fn remote_branch(&self) -> String {
        format!("{}/{}", self.remote, self.branch)
    }

    async fn run(&self, args: &[&str]) -> Result<String, VcsError> {
        self.run_with_timeout(args, None).await
    }

    async fn run_with_timeout(
        &self,
        args: &[&str],
        timeout: Option<Duration>,
    ) -> Result<String, VcsError> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        let command = format!("git {}", args.join(" "));
        debug!(%command, "running");

        let result = self
            .executor
            .execute(&args, &self.workdir, timeout)
            .await
            .map_err(|e| match e {
                ExecError::Io(source) => VcsError::Spawn {
                    command: command.clone(),
                    source,
                },
                ExecError::TimedOut(after) => VcsError::TimedOut {
                    command: command.clone(),
                    after,
                },
            })?;

        if result.success {
            return Ok(result.stdout);
        }
        Err(command_failed(command, result))
    }
}

fn command_failed(command: String, result: CommandResult) -> VcsError {
    let message = match result.code {
        Some(code) => format!("exit status {code}"),
        None => "terminated by signal".to_string(),
    };
    let output = match (result.stdout.trim().is_empty(), result.stderr.trim().is_empty()) {
        (_, true) => result.stdout,
        (true, false) => result.stderr,
        (false, false) => format!("{}{}", result.stdout, result.stderr),
    };
    VcsError::CommandFailed {
        command,
        message,
        output,
    }
}

fn non_empty_lines(output: &str) -> impl Iterator<Item = &str> {
    output.lines().map(str::trim).filter(|line| !line.is_empty())
}

fn parse_commit_id(command: &str, line: &str) -> Result<CommitId, VcsError> {
    let unexpected = || VcsError::UnexpectedOutput {
        command: command.to_string(),
        output: line.to_string(),
    };
    if !line.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(unexpected());
    }
    CommitId::new(line).ok_or_else(unexpected)
}

#[async_trait]
impl<E: CommandExecutor> VcsClient for GitRepository<E> {
    async fn is_cleanly_tracking_remote(&self) -> Result<bool, VcsError> {
        let changes = self
            .run(&["status", "--porcelain", "--untracked-files=no"])
            .await?;
        if non_empty_lines(&changes).next().is_some() {
            debug!("working tree has local modifications");
            return Ok(false);
        }

        let current = self.run(&["rev-parse", "--abbrev-ref", "HEAD"]).await?;
        if current.trim() != self.branch {
            debug!(current = current.trim(), expected = %self.branch, "not on the tracked branch");
            return Ok(false);
        }

        let range = format!("{}..HEAD", self.remote_branch());
        let local = self.run(&["rev-list", "--count", &range]).await?;
        let ahead: u64 = local
            .trim()
            .parse()
            .map_err(|_| VcsError::UnexpectedOutput {
                command: format!("git rev-list --count {range}"),
                output: local.clone(),
            })?;
        if ahead > 0 {
            debug!(ahead, "branch has local commits");
        }
        Ok(ahead == 0)
    }

    async fn ensure_cleanly_tracking_remote(&self) -> Result<(), VcsError> {
        info!(workdir = %self.workdir.display(), "discarding local changes");
        self.run(&["reset", "--hard", "HEAD"]).await?;
        self.run(&["checkout", "-q", &self.branch]).await?;
        self.run(&["reset", "--hard", &self.remote_branch()]).await?;
        Ok(())
    }

    async fn pull(&self, timeout: Duration) -> Result<(), VcsError> {
        self.run_with_timeout(&["pull", &self.remote, &self.branch], Some(timeout))
            .await
            .map(|_| ())
    }

    async fn latest_commit(&self) -> Result<CommitId, VcsError> {
        let output = self.run(&["log", "-1", "--format=%H"]).await?;
        parse_commit_id("git log -1 --format=%H", output.trim())
    }

    async fn commits_since(&self, since: &CommitId) -> Result<Vec<CommitId>, VcsError> {
        let range = format!("{since}..{}", self.branch);
        let output = self
            .run(&["log", &range, "--format=%H", "--reverse"])
            .await?;
        let command = format!("git log {range} --format=%H --reverse");
        non_empty_lines(&output)
            .map(|line| parse_commit_id(&command, line))
            .collect()
    }

    async fn commit_detail(&self, commit: &CommitId, format: &str) -> Result<String, VcsError> {
        let format = format!("--format={format}");
        self.run(&["log", "-1", commit.as_str(), &format]).await
    }

    async fn affected_files(&self, commit: &CommitId) -> Result<Vec<String>, VcsError> {
        let output = self
            .run(&["log", "-1", "--format=", "--name-only", commit.as_str()])
            .await?;
        Ok(non_empty_lines(&output).map(str::to_string).collect())
    }
}
