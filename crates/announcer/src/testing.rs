//! In-memory fakes for the port traits, shared by the unit tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::errors::{ChatError, VcsError};
use crate::identifiers::{ChannelName, CommitId, Nickname};
use crate::ports::{ChatConnection, ChatConnector, ChatEvent, ChatSession, Confirm, Delay, VcsClient};

/// A 40-character hash made of the byte `n` repeated.
pub(crate) fn sha(n: u8) -> String {
    format!("{n:02x}").repeat(20)
}

// ─── Version control ───

struct FakeCommit {
    id: String,
    detail: String,
    files: Vec<String>,
}

#[derive(Default)]
struct FakeVcsState {
    dirty: bool,
    unreadable_state: bool,
    cleanup_fails: bool,
    failing_pulls: u32,
    listing_fails: bool,
    pull_timeouts: Vec<Duration>,
    cleanups: u32,
    detail_requests: Vec<String>,
    history: Vec<FakeCommit>,
}

/// Scriptable [`VcsClient`]. Pulls succeed unless told otherwise.
#[derive(Default)]
pub(crate) struct FakeVcs {
    state: Mutex<FakeVcsState>,
}

impl FakeVcs {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn with_state(self, f: impl FnOnce(&mut FakeVcsState)) -> Self {
        f(&mut self.state.lock().unwrap());
        self
    }

    pub(crate) fn dirty(self) -> Self {
        self.with_state(|s| s.dirty = true)
    }

    pub(crate) fn unreadable_state(self) -> Self {
        self.with_state(|s| s.unreadable_state = true)
    }

    pub(crate) fn failing_cleanup(self) -> Self {
        self.with_state(|s| s.cleanup_fails = true)
    }

    /// The next `count` pulls fail.
    pub(crate) fn failing_pulls(self, count: u32) -> Self {
        self.with_state(|s| s.failing_pulls = count)
    }

    /// Makes the next `count` pulls fail from now on.
    pub(crate) fn set_failing_pulls(&self, count: u32) {
        self.state.lock().unwrap().failing_pulls = count;
    }

    pub(crate) fn failing_listing(self) -> Self {
        self.with_state(|s| s.listing_fails = true)
    }

    pub(crate) fn with_commit(self, n: u8, detail: &str, files: &[&str]) -> Self {
        self.push_commit(n, detail, files);
        self
    }

    /// Appends a commit to the history, as if a pull had fetched it.
    pub(crate) fn push_commit(&self, n: u8, detail: &str, files: &[&str]) {
        self.state.lock().unwrap().history.push(FakeCommit {
            id: sha(n),
            detail: detail.to_string(),
            files: files.iter().map(|f| f.to_string()).collect(),
        });
    }

    pub(crate) fn pull_count(&self) -> usize {
        self.state.lock().unwrap().pull_timeouts.len()
    }

    pub(crate) fn pull_timeouts(&self) -> Vec<Duration> {
        self.state.lock().unwrap().pull_timeouts.clone()
    }

    pub(crate) fn cleanup_count(&self) -> u32 {
        self.state.lock().unwrap().cleanups
    }

    pub(crate) fn detail_requests(&self) -> Vec<String> {
        self.state.lock().unwrap().detail_requests.clone()
    }

    fn command_failed(command: &str, output: &str) -> VcsError {
        VcsError::CommandFailed {
            command: command.to_string(),
            message: "exit status: 1".to_string(),
            output: output.to_string(),
        }
    }
}

#[async_trait]
impl VcsClient for FakeVcs {
    async fn is_cleanly_tracking_remote(&self) -> Result<bool, VcsError> {
        let state = self.state.lock().unwrap();
        if state.unreadable_state {
            return Err(Self::command_failed("git status", "fatal: not a git repository"));
        }
        Ok(!state.dirty)
    }

    async fn ensure_cleanly_tracking_remote(&self) -> Result<(), VcsError> {
        let mut state = self.state.lock().unwrap();
        state.cleanups += 1;
        if state.cleanup_fails {
            return Err(Self::command_failed("git reset --hard", "error: index.lock exists"));
        }
        state.dirty = false;
        state.unreadable_state = false;
        Ok(())
    }

    async fn pull(&self, timeout: Duration) -> Result<(), VcsError> {
        let mut state = self.state.lock().unwrap();
        state.pull_timeouts.push(timeout);
        if state.failing_pulls > 0 {
            state.failing_pulls -= 1;
            return Err(Self::command_failed("git pull", "fatal: unable to access remote"));
        }
        Ok(())
    }

    async fn latest_commit(&self) -> Result<CommitId, VcsError> {
        let state = self.state.lock().unwrap();
        state
            .history
            .last()
            .and_then(|c| CommitId::new(c.id.clone()))
            .ok_or_else(|| Self::command_failed("git log -1", "fatal: no commits yet"))
    }

    async fn commits_since(&self, since: &CommitId) -> Result<Vec<CommitId>, VcsError> {
        let state = self.state.lock().unwrap();
        if state.listing_fails {
            return Err(Self::command_failed("git log", "fatal: bad revision"));
        }
        let start = state
            .history
            .iter()
            .position(|c| c.id == since.as_str())
            .map_or(0, |i| i + 1);
        Ok(state.history[start..]
            .iter()
            .filter_map(|c| CommitId::new(c.id.clone()))
            .collect())
    }

    async fn commit_detail(&self, commit: &CommitId, _format: &str) -> Result<String, VcsError> {
        let mut state = self.state.lock().unwrap();
        state.detail_requests.push(commit.to_string());
        state
            .history
            .iter()
            .find(|c| c.id == commit.as_str())
            .map(|c| c.detail.clone())
            .ok_or_else(|| Self::command_failed("git log -1", "fatal: bad object"))
    }

    async fn affected_files(&self, commit: &CommitId) -> Result<Vec<String>, VcsError> {
        let state = self.state.lock().unwrap();
        state
            .history
            .iter()
            .find(|c| c.id == commit.as_str())
            .map(|c| c.files.clone())
            .ok_or_else(|| Self::command_failed("git log -1", "fatal: bad object"))
    }
}

// ─── Chat ───

#[derive(Default)]
struct FakeChatState {
    connected: bool,
    nickname: String,
    joined: Vec<String>,
    sent: Vec<(String, String)>,
    disconnects: Vec<String>,
}

/// Recording [`ChatConnection`]. Disconnecting emits
/// [`ChatEvent::Disconnected`] when attached to an event stream.
pub(crate) struct FakeChat {
    state: Mutex<FakeChatState>,
    events: Option<mpsc::UnboundedSender<ChatEvent>>,
}

impl FakeChat {
    pub(crate) fn connected(nickname: &str) -> Self {
        Self {
            state: Mutex::new(FakeChatState {
                connected: true,
                nickname: nickname.to_string(),
                ..FakeChatState::default()
            }),
            events: None,
        }
    }

    pub(crate) fn disconnected(nickname: &str) -> Self {
        let chat = Self::connected(nickname);
        chat.state.lock().unwrap().connected = false;
        chat
    }

    pub(crate) fn sent(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().sent.clone()
    }

    pub(crate) fn joined(&self) -> Vec<String> {
        self.state.lock().unwrap().joined.clone()
    }

    pub(crate) fn disconnects(&self) -> Vec<String> {
        self.state.lock().unwrap().disconnects.clone()
    }
}

impl ChatConnection for FakeChat {
    fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    fn nickname(&self) -> Nickname {
        Nickname::new(self.state.lock().unwrap().nickname.clone()).unwrap()
    }

    fn set_nickname(&self, nickname: &Nickname) -> Result<(), ChatError> {
        self.state.lock().unwrap().nickname = nickname.to_string();
        Ok(())
    }

    fn join(&self, channel: &ChannelName) -> Result<(), ChatError> {
        self.state.lock().unwrap().joined.push(channel.to_string());
        Ok(())
    }

    fn send(&self, channel: &ChannelName, text: &str) -> Result<(), ChatError> {
        let mut state = self.state.lock().unwrap();
        if !state.connected {
            return Err(ChatError::NotConnected);
        }
        state.sent.push((channel.to_string(), text.to_string()));
        Ok(())
    }

    fn disconnect(&self, message: &str) -> Result<(), ChatError> {
        let mut state = self.state.lock().unwrap();
        state.connected = false;
        state.disconnects.push(message.to_string());
        if let Some(events) = &self.events {
            let _ = events.send(ChatEvent::Disconnected {
                reason: Some(message.to_string()),
            });
        }
        Ok(())
    }
}

/// [`ChatConnector`] handing out a single [`FakeChat`] session. The test
/// keeps the event sender to play the server's part.
pub(crate) struct FakeConnector {
    chat: Arc<FakeChat>,
    events: Mutex<Option<mpsc::UnboundedReceiver<ChatEvent>>>,
    connects: Mutex<u32>,
}

impl FakeConnector {
    pub(crate) fn new(nickname: &str) -> (Self, Arc<FakeChat>, mpsc::UnboundedSender<ChatEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut chat = FakeChat::connected(nickname);
        chat.events = Some(tx.clone());
        let chat = Arc::new(chat);
        let connector = Self {
            chat: chat.clone(),
            events: Mutex::new(Some(rx)),
            connects: Mutex::new(0),
        };
        (connector, chat, tx)
    }

    pub(crate) fn connects(&self) -> u32 {
        *self.connects.lock().unwrap()
    }
}

#[async_trait]
impl ChatConnector for FakeConnector {
    async fn connect(&self) -> Result<ChatSession, ChatError> {
        *self.connects.lock().unwrap() += 1;
        let events = self
            .events
            .lock()
            .unwrap()
            .take()
            .ok_or(ChatError::NotConnected)?;
        Ok(ChatSession {
            connection: self.chat.clone(),
            events,
        })
    }
}

// ─── Time and confirmation ───

type SleepHook = Box<dyn Fn(Duration) + Send + Sync>;

/// [`Delay`] that returns immediately and records what it was asked to wait.
#[derive(Default)]
pub(crate) struct RecordingDelay {
    waits: Mutex<Vec<Duration>>,
    hook: Option<SleepHook>,
}

impl RecordingDelay {
    /// Runs `hook` on every wait, after recording it.
    pub(crate) fn on_sleep(mut self, hook: impl Fn(Duration) + Send + Sync + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    pub(crate) fn waits(&self) -> Vec<Duration> {
        self.waits.lock().unwrap().clone()
    }
}

#[async_trait]
impl Delay for RecordingDelay {
    async fn sleep(&self, duration: Duration) {
        self.waits.lock().unwrap().push(duration);
        if let Some(hook) = &self.hook {
            hook(duration);
        }
    }
}

/// [`Confirm`] with a fixed answer.
pub(crate) struct ScriptedConfirm {
    answer: bool,
    prompts: Mutex<u32>,
}

impl ScriptedConfirm {
    pub(crate) fn answering(answer: bool) -> Self {
        Self {
            answer,
            prompts: Mutex::new(0),
        }
    }

    pub(crate) fn prompts(&self) -> u32 {
        *self.prompts.lock().unwrap()
    }
}

impl Confirm for ScriptedConfirm {
    fn confirm(&self, _prompt: &str) -> bool {
        *self.prompts.lock().unwrap() += 1;
        self.answer
    }
}
