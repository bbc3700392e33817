//! Announcer configuration file.
//!
//! Default location: `.commit-announcer/config.toml`, relative to the working
//! directory. Every key is optional; defaults reproduce the public Blink bot.

use std::path::{Path, PathBuf};
use std::time::Duration;

use announcer::{ChannelName, Nickname, RetrySchedule, WatchPath};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "COMMIT_ANNOUNCER_CONFIG";

/// Environment variable carrying the IRC server password.
pub const PASSWORD_ENV: &str = "COMMIT_ANNOUNCER_IRC_PASSWORD";

/// Path to the config file when nothing else is given.
pub fn default_config_path() -> PathBuf {
    Path::new(".commit-announcer").join("config.toml")
}

/// Picks the config path: the first argument, then [`CONFIG_ENV`], then the
/// default.
pub fn resolve_config_path(arg: Option<String>, env: Option<String>) -> PathBuf {
    arg.or(env)
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path)
}

/// Whole configuration file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AnnouncerSettings {
    /// Commits touching a path under this prefix are announced.
    pub watch_path: String,
    /// Seconds between poll cycles.
    pub poll_interval_secs: u64,
    /// Discard local changes at start-up without asking.
    pub discard_local_changes: bool,
    /// Local clone settings.
    pub repository: RepositorySettings,
    /// Chat network settings.
    pub irc: IrcSettings,
}

impl Default for AnnouncerSettings {
    fn default() -> Self {
        Self {
            watch_path: "third_party/WebKit".into(),
            poll_interval_secs: 10,
            discard_local_changes: false,
            repository: RepositorySettings::default(),
            irc: IrcSettings::default(),
        }
    }
}

/// `[repository]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RepositorySettings {
    /// Root of the local clone.
    pub path: PathBuf,
    /// Remote to pull from.
    pub remote: String,
    /// Branch to track.
    pub branch: String,
    /// Time limit for one pull, in seconds.
    pub pull_timeout_secs: u64,
    /// Base of the exponential back-off between pulls, in seconds.
    pub retry_base_secs: u64,
    /// Pulls attempted per synchronisation before giving up.
    pub max_pull_attempts: u32,
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("."),
            remote: git::DEFAULT_REMOTE.into(),
            branch: git::DEFAULT_BRANCH.into(),
            pull_timeout_secs: announcer::PULL_TIMEOUT.as_secs(),
            retry_base_secs: RetrySchedule::DEFAULT.base_wait().as_secs(),
            max_pull_attempts: RetrySchedule::DEFAULT.max_attempts(),
        }
    }
}

/// `[irc]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct IrcSettings {
    /// Server host name.
    pub server: String,
    /// Server port.
    pub port: u16,
    /// Channel to announce in.
    pub channel: String,
    /// Requested nickname.
    pub nickname: String,
    /// Real name sent at registration. Defaults to the nickname.
    pub realname: Option<String>,
    /// Server password. Prefer [`PASSWORD_ENV`] over writing it here.
    pub password: Option<String>,
}

impl Default for IrcSettings {
    fn default() -> Self {
        Self {
            server: irc::DEFAULT_SERVER.into(),
            port: irc::DEFAULT_PORT,
            channel: "#blink".into(),
            nickname: "commit-bot".into(),
            realname: None,
            password: None,
        }
    }
}

/// Settings after validation, in domain types.
#[derive(Debug, Clone)]
pub struct Validated {
    /// Path prefix that makes a commit worth announcing.
    pub watch_path: WatchPath,
    /// Time between poll cycles. Never zero.
    pub poll_interval: Duration,
    /// Skip the confirmation prompt and discard local changes.
    pub discard_local_changes: bool,
    /// The `[repository]` section as written.
    pub repository: RepositorySettings,
    /// Time limit for one pull. Never zero.
    pub pull_timeout: Duration,
    /// Pull retry schedule.
    pub schedule: RetrySchedule,
    /// Channel to join and announce in.
    pub channel: ChannelName,
    /// Nickname requested at registration.
    pub nickname: Nickname,
}

impl AnnouncerSettings {
    /// Loads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "no config file; using defaults");
            return Ok(Self::default());
        }
        Self::load_from(path)
    }

    /// Loads a specific file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Replaces the IRC password with `password` when one is given.
    pub fn with_password_override(mut self, password: Option<String>) -> Self {
        if let Some(password) = password.filter(|p| !p.is_empty()) {
            self.irc.password = Some(password);
        }
        self
    }

    /// Checks every value and converts to domain types.
    pub fn validate(&self) -> Result<Validated> {
        let Some(watch_path) = WatchPath::new(self.watch_path.as_str()) else {
            bail!("watch_path must not be empty");
        };
        if self.poll_interval_secs == 0 {
            bail!("poll_interval_secs must be greater than zero");
        }
        let Some(schedule) = RetrySchedule::new(
            self.repository.max_pull_attempts,
            Duration::from_secs(self.repository.retry_base_secs),
        ) else {
            bail!("repository.max_pull_attempts must be greater than zero");
        };
        if self.repository.pull_timeout_secs == 0 {
            bail!("repository.pull_timeout_secs must be greater than zero");
        }
        if !self.irc.channel.starts_with(['#', '&']) {
            bail!("irc.channel must start with '#' or '&', got {:?}", self.irc.channel);
        }
        let Some(channel) = ChannelName::new(self.irc.channel.as_str()) else {
            bail!("irc.channel must not be empty");
        };
        let Some(nickname) = Nickname::new(self.irc.nickname.as_str()) else {
            bail!("irc.nickname must not be empty");
        };
        if self.irc.nickname.contains(char::is_whitespace) {
            bail!("irc.nickname must not contain whitespace");
        }

        Ok(Validated {
            watch_path,
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            discard_local_changes: self.discard_local_changes,
            repository: self.repository.clone(),
            pull_timeout: Duration::from_secs(self.repository.pull_timeout_secs),
            schedule,
            channel,
            nickname,
        })
    }
}
