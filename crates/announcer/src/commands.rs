//! Chat commands addressed to the bot.
//!
//! A line is a command when it starts with the bot's current nickname followed
//! by a colon, e.g. `commit-bot: ping`. The remainder, trimmed, must match a
//! registered command name exactly; anything else is ignored.

use crate::identifiers::Nickname;

/// Reply to `ping`.
pub const PONG: &str = "Pong.";

/// A built-in bot action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BotCommand {
    /// List every registered command name.
    Help,
    /// Reply with [`PONG`].
    Ping,
    /// Disconnect from the network.
    Quit,
}

impl BotCommand {
    /// The name the command is invoked by.
    pub fn name(self) -> &'static str {
        match self {
            BotCommand::Help => "help",
            BotCommand::Ping => "ping",
            BotCommand::Quit => "quit",
        }
    }
}

/// Mapping from command name to action, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTable {
    entries: Vec<(&'static str, BotCommand)>,
}

impl CommandTable {
    /// Builds the table from `commands`, in the order given. Later duplicates
    /// of a name are dropped.
    pub fn new(commands: impl IntoIterator<Item = BotCommand>) -> Self {
        let mut entries: Vec<(&'static str, BotCommand)> = Vec::new();
        for command in commands {
            if !entries.iter().any(|(name, _)| *name == command.name()) {
                entries.push((command.name(), command));
            }
        }
        Self { entries }
    }

    /// Looks up `name` exactly (case-sensitive).
    pub fn get(&self, name: &str) -> Option<BotCommand> {
        self.entries
            .iter()
            .find(|(entry, _)| *entry == name)
            .map(|(_, command)| *command)
    }

    /// Registered command names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(name, _)| *name)
    }

    /// Text posted in reply to `help`.
    pub fn help_text(&self) -> String {
        format!(
            "Commands available: {}",
            self.names().collect::<Vec<_>>().join(" ")
        )
    }

    /// Resolves a chat line to a command if it is addressed to `nickname` and
    /// names a registered command.
    pub fn resolve(&self, nickname: &Nickname, message: &str) -> Option<BotCommand> {
        let prefix = format!("{nickname}:");
        let rest = message.strip_prefix(prefix.as_str())?;
        self.get(rest.trim())
    }
}

impl Default for CommandTable {
    /// `help`, `ping` and `quit`.
    fn default() -> Self {
        Self::new([BotCommand::Help, BotCommand::Ping, BotCommand::Quit])
    }
}
