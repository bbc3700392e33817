//! Error types for the announcer domain.
//!
//! [`VcsError`] and [`ChatError`] are produced by the infrastructure adapters
//! behind the port traits in [`crate::ports`]. [`MalformedCommit`] and
//! [`SyncFailure`] are raised by the domain itself. [`AnnouncerError`] covers
//! conditions that stop the service outright.
//!
//! | Condition | Type | Handling |
//! |-----------|------|----------|
//! | Pull failed | [`VcsError`] | Retried with back-off; exhaustion is fatal |
//! | Clean-up failed | [`SyncFailure::Cleanup`] | Not retried; synchronisation fails |
//! | Commit detail short of fields | [`MalformedCommit`] | Logged; commit skipped |
//! | Connection gone during back-off | [`SyncFailure::Aborted`] | Nothing to do this cycle |

use std::time::Duration;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Port errors
// ---------------------------------------------------------------------------

/// Failure reported by a [`crate::VcsClient`] implementation.
#[derive(Debug, Error)]
pub enum VcsError {
    /// The command ran and reported failure.
    ///
    /// `output` carries the raw text the command produced so operators can
    /// see exactly what the server said.
    #[error("`{command}` failed: {message}")]
    CommandFailed {
        /// The command line that was executed.
        command: String,
        /// Short description of the failure (exit status, first error line).
        message: String,
        /// Raw combined output of the command.
        output: String,
    },

    /// The command did not finish within its time limit and was killed.
    #[error("`{command}` timed out after {after:?}")]
    TimedOut {
        /// The command line that was executed.
        command: String,
        /// The limit that was exceeded.
        after: Duration,
    },

    /// The command could not be started at all.
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        /// The command line that was attempted.
        command: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The command succeeded but its output could not be interpreted.
    #[error("unexpected output from `{command}`: {output}")]
    UnexpectedOutput {
        /// The command line that was executed.
        command: String,
        /// The offending output.
        output: String,
    },
}

impl VcsError {
    /// Returns the raw command output attached to this error, if any.
    pub fn output(&self) -> Option<&str> {
        match self {
            VcsError::CommandFailed { output, .. } | VcsError::UnexpectedOutput { output, .. } => {
                Some(output)
            }
            VcsError::TimedOut { .. } | VcsError::Spawn { .. } => None,
        }
    }
}

/// Failure reported by a [`crate::ChatConnector`] or [`crate::ChatConnection`].
#[derive(Debug, Error)]
pub enum ChatError {
    /// The connection is not (or no longer) established.
    #[error("not connected")]
    NotConnected,

    /// Opening the connection failed.
    #[error("failed to connect to {server}: {source}")]
    Connect {
        /// `host:port` that was dialled.
        server: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// I/O failure on an established connection.
    #[error("connection I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Domain errors
// ---------------------------------------------------------------------------

/// Commit detail text had fewer fields than the detail template asks for.
///
/// Local and non-fatal: the commit is skipped and the cycle continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed commit detail: found {found} of {expected} fields")]
pub struct MalformedCommit {
    /// Number of newline-delimited fields present.
    pub found: usize,
    /// Number of fields the template produces.
    pub expected: usize,
}

/// Why a repository synchronisation did not end with a successful pull.
#[derive(Debug, Error)]
pub enum SyncFailure {
    /// The clone has local changes and the operator declined to discard them.
    #[error("local changes were not discarded")]
    Declined,

    /// Resetting the clone to track the remote branch failed. Never retried.
    #[error("failed to clean repository: {0}")]
    Cleanup(#[source] VcsError),

    /// The liveness check before a back-off wait failed (connection lost or
    /// shutdown requested).
    #[error("synchronisation abandoned before attempt {attempt}")]
    Aborted {
        /// The attempt that would have followed the wait.
        attempt: u32,
    },

    /// Every pull attempt failed.
    #[error("exceeded {attempts} pull attempts")]
    Exhausted {
        /// Number of attempts made.
        attempts: u32,
        /// The error from the final attempt.
        #[source]
        last_error: VcsError,
    },
}

impl SyncFailure {
    /// Returns `true` if this failure means the repository cannot be kept up
    /// to date and the service should stop.
    ///
    /// An [`SyncFailure::Aborted`] synchronisation is not fatal: the service
    /// is already going away or has lost its connection.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SyncFailure::Aborted { .. })
    }
}

// ---------------------------------------------------------------------------
// Service-level errors
// ---------------------------------------------------------------------------

/// Errors that stop the announcer service.
#[derive(Debug, Error)]
pub enum AnnouncerError {
    /// A version-control operation the service cannot proceed without failed.
    #[error("version control error: {0}")]
    Vcs(#[from] VcsError),

    /// The chat connection could not be established.
    #[error("chat error: {0}")]
    Chat(#[from] ChatError),

    /// The background execution context could not be created.
    #[error("failed to start announcer runtime: {0}")]
    Runtime(#[source] std::io::Error),

    /// The background thread panicked.
    #[error("announcer thread panicked")]
    ThreadPanicked,

    /// The service configuration is invalid.
    ///
    /// Produced at construction time; the service never starts with an
    /// invalid configuration.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },
}
