//! Commit filtering and announcement formatting.
//!
//! Everything here is pure: the same input text always produces the same
//! output, and nothing touches the repository or the connection. The poll
//! cycle fetches the inputs and decides what to do with the results.

use std::sync::OnceLock;

use regex::Regex;

use crate::errors::MalformedCommit;
use crate::identifiers::WatchPath;
use crate::types::CommitRecord;

/// Base of the canonical commit link.
pub const LINK_BASE: &str = "https://crrev.com/";

/// Body-line prefixes that mark a commit as landing with reduced review or
/// testing. Matched case-insensitively at the start of a line.
pub const RED_FLAG_MARKERS: [&str; 2] = ["NOTRY=true", "TBR="];

/// IRC colour code wrapped around red-flag text (orange).
const HIGHLIGHT_START: &str = "\x037";
const HIGHLIGHT_END: &str = "\x03";

fn commit_position_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^Cr-Commit-Position: refs/heads/master@\{#(?P<position>\d+)\}")
            .expect("commit position pattern should compile")
    })
}

// ---------------------------------------------------------------------------
// Filtering
// ---------------------------------------------------------------------------

/// Returns `true` if at least one of `files` lies under `watch_path`.
pub fn should_announce<S: AsRef<str>>(files: &[S], watch_path: &WatchPath) -> bool {
    files.iter().any(|path| watch_path.covers(path.as_ref()))
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

/// A one-line chat message describing a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement(String);

impl Announcement {
    /// Returns the message text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Announcement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Formats raw commit detail (see [`crate::COMMIT_DETAIL_FORMAT`]) into an
/// announcement.
///
/// Returns [`MalformedCommit`] when the detail is missing fields; callers log
/// it and skip the commit.
pub fn format_announcement(detail: &str) -> Result<Announcement, MalformedCommit> {
    CommitRecord::parse(detail).map(|record| announce(&record))
}

/// Builds the announcement for an already parsed commit.
///
/// Layout: `<link> <author> committed "<subject>" <red flags>`, with trailing
/// whitespace removed when there are no red flags.
pub fn announce(record: &CommitRecord) -> Announcement {
    let mut commit_position = None;
    let mut red_flags = Vec::new();

    for line in record.body.split('\n') {
        if let Some(captures) = commit_position_pattern().captures(line) {
            commit_position = captures.name("position").map(|m| m.as_str());
        }

        for marker in RED_FLAG_MARKERS {
            if starts_with_ignore_ascii_case(line, marker) {
                red_flags.push(line.trim());
            }
        }
    }

    let link = match commit_position {
        Some(position) => format!("{LINK_BASE}{position}"),
        None => format!("{LINK_BASE}{}", short_id(&record.id)),
    };
    let red_flag_message = if red_flags.is_empty() {
        String::new()
    } else {
        format!("{HIGHLIGHT_START}{}{HIGHLIGHT_END}", red_flags.join(" "))
    };

    let message = format!(
        "{link} {} committed \"{}\" {red_flag_message}",
        record.author_email, record.subject
    );
    Announcement(message.trim().to_string())
}

fn short_id(id: &str) -> &str {
    match id.char_indices().nth(crate::CommitId::SHORT_LEN) {
        Some((end, _)) => &id[..end],
        None => id,
    }
}

fn starts_with_ignore_ascii_case(line: &str, prefix: &str) -> bool {
    line.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

// ---------------------------------------------------------------------------
// Outbound sanitisation
// ---------------------------------------------------------------------------

/// Reduces `text` to ASCII, replacing every other character with a backslash
/// escape: `\xNN` up to U+00FF, `\uNNNN` up to U+FFFF, `\UNNNNNNNN` beyond.
pub fn sanitize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        let code = u32::from(c);
        if c.is_ascii() {
            out.push(c);
        } else if code <= 0xff {
            out.push_str(&format!("\\x{code:02x}"));
        } else if code <= 0xffff {
            out.push_str(&format!("\\u{code:04x}"));
        } else {
            out.push_str(&format!("\\U{code:08x}"));
        }
    }
    out
}
