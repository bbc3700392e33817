//! Port traits implemented by infrastructure crates.
//!
//! The announcer never talks to git or to a chat server directly. It sees only
//! the traits in this module:
//!
//! | Trait | Implemented by | Purpose |
//! |-------|----------------|---------|
//! | [`VcsClient`] | `git` crate | Keep a local clone in sync, enumerate and describe commits |
//! | [`ChatConnector`] / [`ChatConnection`] | `irc` crate | Open a session, post messages, disconnect |
//! | [`ChatEventHandler`] | [`crate::service`] | React to inbound connection events |
//! | [`Delay`] | [`TokioDelay`], test clocks | Back-off waits |
//! | [`Confirm`] | `cli` crate, [`AssumeYes`] | Operator confirmation before discarding local changes |
//!
//! ## Concurrency contract
//!
//! A connection delivers its events on a single channel which the service
//! drains on its own event loop. Handler methods are therefore never invoked
//! concurrently with each other or with a poll cycle, but they may run between
//! any two awaits of a cycle.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::errors::{ChatError, VcsError};
use crate::identifiers::{ChannelName, CommitId, Nickname};

// ---------------------------------------------------------------------------
// Version control
// ---------------------------------------------------------------------------

/// Operations on the local clone of the watched repository.
#[async_trait]
pub trait VcsClient: Send + Sync {
    /// Returns `true` if the clone has no local modifications, is on the
    /// tracked branch, and has no commits the remote branch lacks.
    async fn is_cleanly_tracking_remote(&self) -> Result<bool, VcsError>;

    /// Discards local modifications and commits so the clone cleanly tracks
    /// the remote branch.
    async fn ensure_cleanly_tracking_remote(&self) -> Result<(), VcsError>;

    /// Pulls from the remote branch, giving up after `timeout`.
    async fn pull(&self, timeout: Duration) -> Result<(), VcsError>;

    /// Returns the identifier of the newest local commit.
    async fn latest_commit(&self) -> Result<CommitId, VcsError>;

    /// Returns the commits strictly after `since`, oldest first.
    async fn commits_since(&self, since: &CommitId) -> Result<Vec<CommitId>, VcsError>;

    /// Returns the detail of `commit` rendered with the given field template.
    async fn commit_detail(&self, commit: &CommitId, format: &str) -> Result<String, VcsError>;

    /// Returns the repository-relative paths touched by `commit`.
    async fn affected_files(&self, commit: &CommitId) -> Result<Vec<String>, VcsError>;
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// An established chat session.
///
/// Methods only queue work on the connection; they never block on the
/// network. Calling anything but [`ChatConnection::is_connected`] after the
/// connection has gone away returns [`ChatError::NotConnected`].
pub trait ChatConnection: Send + Sync {
    /// Returns `true` while the session is registered and not shutting down.
    fn is_connected(&self) -> bool;

    /// The nickname currently requested from the server.
    fn nickname(&self) -> Nickname;

    /// Requests a new nickname.
    fn set_nickname(&self, nickname: &Nickname) -> Result<(), ChatError>;

    /// Joins `channel`.
    fn join(&self, channel: &ChannelName) -> Result<(), ChatError>;

    /// Posts `text` to `channel`.
    fn send(&self, channel: &ChannelName, text: &str) -> Result<(), ChatError>;

    /// Leaves the network with an optional farewell `message`.
    fn disconnect(&self, message: &str) -> Result<(), ChatError>;
}

/// Inbound events delivered by a [`ChatConnection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// Registration finished; the session may join channels.
    Welcome,
    /// The requested nickname belongs to another session.
    NicknameInUse,
    /// A message was posted to a channel the session is in.
    PublicMessage {
        /// Channel the message was posted to.
        channel: String,
        /// Nickname of the author.
        sender: String,
        /// Message text.
        text: String,
    },
    /// The session ended. No further events follow.
    Disconnected {
        /// Server-supplied reason, if any.
        reason: Option<String>,
    },
}

/// A freshly opened session: the connection handle plus its event stream.
pub struct ChatSession {
    /// Handle used to post and disconnect.
    pub connection: Arc<dyn ChatConnection>,
    /// Inbound events, in arrival order.
    pub events: mpsc::UnboundedReceiver<ChatEvent>,
}

/// Opens chat sessions.
#[async_trait]
pub trait ChatConnector: Send + Sync {
    /// Connects and starts registration. The returned session is not yet
    /// welcomed; wait for [`ChatEvent::Welcome`] before joining.
    async fn connect(&self) -> Result<ChatSession, ChatError>;
}

/// Callbacks for inbound connection events, one method per event.
///
/// Invoked from the service event loop only, one event at a time.
pub trait ChatEventHandler {
    /// The requested nickname is taken.
    fn on_nickname_in_use(&mut self, connection: &dyn ChatConnection);

    /// Registration completed.
    fn on_welcome(&mut self, connection: &dyn ChatConnection);

    /// A message was posted to `channel`.
    fn on_public_message(&mut self, connection: &dyn ChatConnection, channel: &str, text: &str);
}

impl ChatEvent {
    /// Routes this event to the matching handler method.
    ///
    /// [`ChatEvent::Disconnected`] has no handler method; it ends the session
    /// and is returned to the caller instead.
    pub fn dispatch<H>(self, handler: &mut H, connection: &dyn ChatConnection) -> Option<Self>
    where
        H: ChatEventHandler + ?Sized,
    {
        match self {
            ChatEvent::Welcome => handler.on_welcome(connection),
            ChatEvent::NicknameInUse => handler.on_nickname_in_use(connection),
            ChatEvent::PublicMessage { channel, text, .. } => {
                handler.on_public_message(connection, &channel, &text)
            }
            disconnected @ ChatEvent::Disconnected { .. } => return Some(disconnected),
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Time and operator interaction
// ---------------------------------------------------------------------------

/// Suspends the caller for a back-off wait.
#[async_trait]
pub trait Delay: Send + Sync {
    /// Waits for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// [`Delay`] backed by the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioDelay;

#[async_trait]
impl Delay for TokioDelay {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Asks the operator a yes/no question.
pub trait Confirm: Send + Sync {
    /// Returns `true` if the operator accepted.
    fn confirm(&self, prompt: &str) -> bool;
}

/// [`Confirm`] that accepts without asking, for unattended deployments.
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&self, _prompt: &str) -> bool {
        true
    }
}
