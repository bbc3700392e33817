//! Identifier newtypes for commits, chat names, paths and poll cycles.
//!
//! Each identity the announcer handles gets its own newtype over a primitive,
//! so a [`CommitId`] cannot be passed where a [`ChannelName`] is expected even
//! though both are strings underneath.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// String-backed newtypes: non-empty constructor, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers: String-backed (repository / chat names)
// ---------------------------------------------------------------------------

string_id! {
    /// A full commit identifier as printed by the version-control client
    /// (a 40-character lowercase hex SHA for git).
    CommitId
}

impl CommitId {
    /// Length of the abbreviated identifier used in links.
    pub const SHORT_LEN: usize = 8;

    /// Returns the first [`Self::SHORT_LEN`] characters of the identifier, or
    /// the whole identifier if it is shorter.
    pub fn short(&self) -> &str {
        self.0.get(..Self::SHORT_LEN).unwrap_or(&self.0)
    }
}

string_id! {
    /// A chat channel the announcer joins and posts to (e.g. `"#blink"`).
    ChannelName
}

string_id! {
    /// A display name on the chat network.
    ///
    /// The name the bot actually ends up with may differ from the configured
    /// one after a nickname collision; the live value is always read back from
    /// the connection.
    Nickname
}

string_id! {
    /// A repository-relative path prefix. A commit qualifies for announcement
    /// when at least one file it touches starts with this prefix.
    ///
    /// Matching is a plain, case-sensitive string prefix test: no glob
    /// expansion, no separator normalisation.
    WatchPath
}

impl WatchPath {
    /// Returns `true` if `path` lies under this prefix.
    pub fn covers(&self, path: &str) -> bool {
        path.starts_with(self.0.as_str())
    }
}

// ---------------------------------------------------------------------------
// Identifiers: UUID-backed (internally generated)
// ---------------------------------------------------------------------------

/// Identifies a single poll cycle.
///
/// Generated fresh for every cycle and attached to the cycle's tracing span so
/// all log lines from one synchronise/announce pass can be correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CycleId(Uuid);

impl CycleId {
    /// Generates a new random cycle identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for CycleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
