//! Core domain for the commit announcer.
//!
//! The announcer keeps a local clone of a repository up to date, notices new
//! commits that touch a watched path, and posts a one-line summary of each to
//! a chat channel. It also answers a few commands addressed to it there.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate spawns no processes and
//! opens no sockets. The `git` and `irc` crates implement the traits in
//! [`ports`]; the `cli` crate wires them together.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`CommitId`, `ChannelName`, `WatchPath`, etc.) |
//! | [`types`] | Value types (`CommitRecord`, `RetrySchedule`, `LocalTimestamp`) |
//! | [`errors`] | Error types for each port and for the service |
//! | [`ports`] | Traits implemented by infrastructure crates |
//! | [`format`] | Path filter, announcement formatting, outbound sanitisation |
//! | [`commands`] | Chat command table |
//! | [`sync`] | Repository synchronisation with back-off |
//! | [`poll`] | A single poll cycle and its watermark |
//! | [`service`] | Event loop tying a chat session to the poll timer |
//! | [`thread`] | Running the service on its own thread |

pub mod commands;
pub mod errors;
pub mod format;
pub mod identifiers;
pub mod poll;
pub mod ports;
pub mod service;
pub mod sync;
pub mod thread;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use commands::{BotCommand, CommandTable, PONG};
pub use errors::{AnnouncerError, ChatError, MalformedCommit, SyncFailure, VcsError};
pub use format::{format_announcement, sanitize, should_announce, Announcement};
pub use identifiers::{ChannelName, CommitId, CycleId, Nickname, WatchPath};
pub use poll::{BatchReport, CycleOutcome, PollCycle};
pub use ports::{
    AssumeYes, ChatConnection, ChatConnector, ChatEvent, ChatEventHandler, ChatSession, Confirm,
    Delay, TokioDelay, VcsClient,
};
pub use service::{Announcer, AnnouncerConfig, ServiceExit, DEFAULT_POLL_INTERVAL};
pub use sync::{Synchronizer, PULL_TIMEOUT};
pub use thread::AnnouncerThread;
pub use types::{CommitRecord, LocalTimestamp, RetrySchedule, COMMIT_DETAIL_FORMAT};
