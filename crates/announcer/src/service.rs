//! The announcer service: one chat session, a poll timer, and the command
//! dispatcher, all driven from a single event loop.
//!
//! ## Event loop
//!
//! [`Announcer::run`] owns the connection and selects over three sources:
//!
//! - the shutdown token,
//! - inbound [`ChatEvent`]s, dispatched to [`SessionHandler`],
//! - the poll timer, which runs a [`PollCycle`] once the session is welcomed.
//!
//! All three are handled on the same task, so handler callbacks and poll
//! cycles never run in parallel. While a cycle is awaiting the repository,
//! inbound events queue up and are handled once it finishes; a shutdown
//! request abandons the cycle.
//!
//! Replies and disconnect requests made from callbacks are deferred and
//! executed right after the callback returns.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::commands::{BotCommand, CommandTable, PONG};
use crate::errors::AnnouncerError;
use crate::format::sanitize;
use crate::identifiers::{ChannelName, Nickname, WatchPath};
use crate::poll::{CycleOutcome, PollCycle};
use crate::ports::{
    ChatConnection, ChatConnector, ChatEvent, ChatEventHandler, ChatSession, VcsClient,
};
use crate::sync::Synchronizer;
use crate::types::LocalTimestamp;

/// Default time between poll cycles.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Farewell used when the repository can no longer be updated.
pub const REPOSITORY_FAILURE_FAREWELL: &str = "Failed to update repository!";

/// How long to wait for the server to close the session after a disconnect
/// request.
const DISCONNECT_GRACE: Duration = Duration::from_secs(5);

/// Settings the service needs beyond its collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnouncerConfig {
    /// Commits touching a path under this prefix are announced.
    pub watch_path: WatchPath,
    /// Channel announcements and replies are posted to.
    pub channel: ChannelName,
    /// Time between poll cycles.
    pub poll_interval: Duration,
}

impl AnnouncerConfig {
    /// Creates a configuration polling every [`DEFAULT_POLL_INTERVAL`].
    pub fn new(watch_path: WatchPath, channel: ChannelName) -> Self {
        Self {
            watch_path,
            channel,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Sets the poll interval. Zero is rejected.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Result<Self, AnnouncerError> {
        if poll_interval.is_zero() {
            return Err(AnnouncerError::Configuration {
                message: "poll interval must be greater than zero".to_string(),
            });
        }
        self.poll_interval = poll_interval;
        Ok(self)
    }
}

/// Why the service stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceExit {
    /// The initial repository update failed; the service never connected.
    InitialSyncFailed,
    /// A chat user asked the bot to quit.
    Quit,
    /// The enclosing process requested shutdown.
    Shutdown,
    /// A poll cycle could not update the repository.
    RepositoryUnavailable,
    /// The server closed the session.
    ConnectionClosed,
}

// ---------------------------------------------------------------------------
// Session callbacks
// ---------------------------------------------------------------------------

/// Work queued by a callback, executed once the callback returns.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Deferred {
    Post(String),
    Disconnect { message: String, exit: ServiceExit },
}

/// Reacts to inbound events for one session.
pub struct SessionHandler<'a> {
    channel: &'a ChannelName,
    commands: &'a CommandTable,
    welcomed: bool,
    deferred: VecDeque<Deferred>,
}

impl<'a> SessionHandler<'a> {
    /// Creates a handler posting to `channel` and answering `commands`.
    pub fn new(channel: &'a ChannelName, commands: &'a CommandTable) -> Self {
        Self {
            channel,
            commands,
            welcomed: false,
            deferred: VecDeque::new(),
        }
    }

    /// `true` once the server has welcomed the session.
    pub fn is_welcomed(&self) -> bool {
        self.welcomed
    }

    fn post(&mut self, text: impl Into<String>) {
        self.deferred.push_back(Deferred::Post(text.into()));
    }

    fn stop(&mut self, message: impl Into<String>, exit: ServiceExit) {
        self.deferred.push_back(Deferred::Disconnect {
            message: message.into(),
            exit,
        });
    }

    fn invoke(&mut self, command: BotCommand) {
        debug!(command = command.name(), "running command");
        match command {
            BotCommand::Help => {
                let help = self.commands.help_text();
                self.post(help);
            }
            BotCommand::Ping => self.post(PONG),
            BotCommand::Quit => self.stop("", ServiceExit::Quit),
        }
    }

    /// Runs queued work against `connection`.
    ///
    /// Returns the exit reason once a disconnect has been issued; anything
    /// queued after it is dropped.
    fn flush(&mut self, connection: &dyn ChatConnection) -> Option<ServiceExit> {
        while let Some(work) = self.deferred.pop_front() {
            match work {
                Deferred::Post(text) => {
                    if let Err(e) = connection.send(self.channel, &sanitize(&text)) {
                        warn!(error = %e, "failed to post reply");
                    }
                }
                Deferred::Disconnect { message, exit } => {
                    info!(?exit, "disconnecting");
                    if let Err(e) = connection.disconnect(&message) {
                        warn!(error = %e, "failed to disconnect cleanly");
                    }
                    self.deferred.clear();
                    return Some(exit);
                }
            }
        }
        None
    }
}

impl ChatEventHandler for SessionHandler<'_> {
    fn on_nickname_in_use(&mut self, connection: &dyn ChatConnection) {
        let current = connection.nickname();
        let Some(next) = Nickname::new(format!("{current}_")) else {
            return;
        };
        info!(%current, %next, "nickname in use; retrying");
        if let Err(e) = connection.set_nickname(&next) {
            warn!(error = %e, "failed to change nickname");
        }
    }

    fn on_welcome(&mut self, connection: &dyn ChatConnection) {
        info!(channel = %self.channel, "registered; joining channel");
        self.welcomed = true;
        if let Err(e) = connection.join(self.channel) {
            warn!(error = %e, "failed to join channel");
        }
    }

    fn on_public_message(&mut self, connection: &dyn ChatConnection, _channel: &str, text: &str) {
        if let Some(command) = self.commands.resolve(&connection.nickname(), text) {
            self.invoke(command);
        }
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// The commit announcer.
pub struct Announcer {
    config: AnnouncerConfig,
    vcs: Arc<dyn VcsClient>,
    connector: Arc<dyn ChatConnector>,
    synchronizer: Synchronizer,
    commands: CommandTable,
}

impl Announcer {
    /// Assembles the service. `synchronizer` should operate on the same
    /// repository as `vcs`.
    pub fn new(
        config: AnnouncerConfig,
        vcs: Arc<dyn VcsClient>,
        connector: Arc<dyn ChatConnector>,
        synchronizer: Synchronizer,
    ) -> Self {
        Self {
            config,
            vcs,
            connector,
            synchronizer,
            commands: CommandTable::default(),
        }
    }

    /// Runs the service until it stops on its own or `shutdown` is cancelled.
    ///
    /// The repository is updated once before connecting, asking the operator
    /// before discarding local changes. If that fails the service returns
    /// [`ServiceExit::InitialSyncFailed`] without connecting.
    pub async fn run(self, shutdown: CancellationToken) -> Result<ServiceExit, AnnouncerError> {
        let initial = tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                info!("shutdown requested before connecting");
                return Ok(ServiceExit::Shutdown);
            }
            result = self.synchronizer.synchronize(false, || !shutdown.is_cancelled()) => result,
        };
        if let Err(failure) = initial {
            info!(error = %failure, "initial repository update failed; not connecting");
            return Ok(ServiceExit::InitialSyncFailed);
        }

        let watermark = self.vcs.latest_commit().await?;
        info!(at = %LocalTimestamp::now(), %watermark, "starting from latest commit");
        let mut cycle = PollCycle::new(
            watermark,
            self.config.watch_path.clone(),
            self.config.channel.clone(),
        );

        let ChatSession {
            connection,
            mut events,
        } = tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                info!("shutdown requested while connecting");
                return Ok(ServiceExit::Shutdown);
            }
            session = self.connector.connect() => session?,
        };
        info!("connected");

        let mut handler = SessionHandler::new(&self.config.channel, &self.commands);
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let exit = loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("shutdown requested");
                    handler.stop("", ServiceExit::Shutdown);
                }

                event = events.recv() => {
                    let Some(event) = event else {
                        info!("event stream closed");
                        return Ok(ServiceExit::ConnectionClosed);
                    };
                    if let Some(ChatEvent::Disconnected { reason }) =
                        event.dispatch(&mut handler, connection.as_ref())
                    {
                        info!(reason = reason.as_deref().unwrap_or_default(), "disconnected by server");
                        return Ok(ServiceExit::ConnectionClosed);
                    }
                }

                _ = ticker.tick(), if handler.is_welcomed() => {
                    let outcome = tokio::select! {
                        outcome = cycle.run(self.vcs.as_ref(), &self.synchronizer, connection.as_ref()) => outcome,
                        _ = shutdown.cancelled() => {
                            info!("shutdown requested; abandoning poll cycle");
                            handler.stop("", ServiceExit::Shutdown);
                            CycleOutcome::SyncAborted
                        }
                    };
                    if let CycleOutcome::SyncFailed(_) = outcome {
                        handler.stop(REPOSITORY_FAILURE_FAREWELL, ServiceExit::RepositoryUnavailable);
                    }
                }
            }

            if let Some(exit) = handler.flush(connection.as_ref()) {
                break exit;
            }
        };

        wait_for_close(&mut events).await;
        info!(at = %LocalTimestamp::now(), ?exit, "announcer stopped");
        Ok(exit)
    }
}

/// Drains `events` until the server confirms the disconnect or the grace
/// period runs out.
async fn wait_for_close(events: &mut mpsc::UnboundedReceiver<ChatEvent>) {
    let closed = tokio::time::timeout(DISCONNECT_GRACE, async {
        while let Some(event) = events.recv().await {
            if matches!(event, ChatEvent::Disconnected { .. }) {
                break;
            }
        }
    })
    .await;
    if closed.is_err() {
        warn!("server did not close the session in time");
    }
}
