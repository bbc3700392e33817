//! Shared value types for the announcer domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaningful values with invariants (a commit record always has all four
//! fields, a retry schedule always allows at least one attempt) and take part
//! in domain computations.

use std::time::Duration;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::errors::MalformedCommit;

// ---------------------------------------------------------------------------
// Commit records
// ---------------------------------------------------------------------------

/// Field template handed to the version-control client when fetching commit
/// detail: full hash, author email, subject, body, one per line.
///
/// The body is free text and may itself span many lines; it is always the last
/// field.
pub const COMMIT_DETAIL_FORMAT: &str = "%H\n%ae\n%s\n%b";

/// A single commit as read from the version-control client.
///
/// Built from the raw text produced with [`COMMIT_DETAIL_FORMAT`]; immutable
/// once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    /// Full commit identifier (content hash).
    pub id: String,
    /// Author contact string (email address).
    pub author_email: String,
    /// One-line subject.
    pub subject: String,
    /// Free-text body; may be empty.
    pub body: String,
}

impl CommitRecord {
    /// Parses commit detail text laid out according to [`COMMIT_DETAIL_FORMAT`].
    ///
    /// Detail with fewer line breaks than the template is malformed. Only the
    /// first three line breaks split fields; everything after the third belongs
    /// to the body.
    pub fn parse(detail: &str) -> Result<Self, MalformedCommit> {
        let expected = COMMIT_DETAIL_FORMAT.matches('\n').count();
        let found = detail.matches('\n').count();
        if found < expected {
            return Err(MalformedCommit {
                found: found + 1,
                expected: expected + 1,
            });
        }

        let mut fields = detail.splitn(expected + 1, '\n');
        let (Some(id), Some(author_email), Some(subject), Some(body)) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(MalformedCommit {
                found: found + 1,
                expected: expected + 1,
            });
        };

        Ok(Self {
            id: id.to_string(),
            author_email: author_email.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Retry schedule
// ---------------------------------------------------------------------------

/// Bounded exponential back-off schedule for repository pulls.
///
/// Attempt numbers are 1-based. No wait precedes attempt 1; the wait before
/// attempt `n >= 2` is `base_wait × 2^(n-1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySchedule {
    max_attempts: u32,
    base_wait: Duration,
}

impl RetrySchedule {
    /// Eight attempts with a ten-second base wait.
    ///
    /// Waits before attempts 2..=8: 20s, 40s, 80s, 160s, 320s, 640s, 1280s.
    pub const DEFAULT: Self = Self {
        max_attempts: 8,
        base_wait: Duration::from_secs(10),
    };

    /// Creates a schedule, returning `None` if `max_attempts` is zero.
    #[must_use]
    pub fn new(max_attempts: u32, base_wait: Duration) -> Option<Self> {
        if max_attempts == 0 {
            None
        } else {
            Some(Self {
                max_attempts,
                base_wait,
            })
        }
    }

    /// Total number of attempts, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// The base wait the exponential schedule is derived from.
    pub fn base_wait(&self) -> Duration {
        self.base_wait
    }

    /// Returns the wait that precedes `attempt`, or `None` for the first
    /// attempt (and for the meaningless attempt 0).
    pub fn wait_before(&self, attempt: u32) -> Option<Duration> {
        if attempt < 2 {
            return None;
        }
        let factor = 2u32.checked_pow(attempt - 1);
        Some(
            factor
                .map(|f| self.base_wait.saturating_mul(f))
                .unwrap_or(Duration::MAX),
        )
    }

    /// All waits of the schedule, in order (attempts `2..=max_attempts`).
    pub fn waits(&self) -> impl Iterator<Item = Duration> + '_ {
        (2..=self.max_attempts).filter_map(|attempt| self.wait_before(attempt))
    }

    /// Worst-case time spent waiting when every attempt fails.
    pub fn total_wait(&self) -> Duration {
        self.waits().fold(Duration::ZERO, Duration::saturating_add)
    }
}

impl Default for RetrySchedule {
    fn default() -> Self {
        Self::DEFAULT
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A wall-clock timestamp in the operator's local time zone.
///
/// Displayed as `[<date> <time> <offset>]`, e.g. `[06/01/24 12:34:56 +02:00]`.
/// The zone is shown as its numeric UTC offset. Attached to every cycle-level
/// log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LocalTimestamp(DateTime<Local>);

impl LocalTimestamp {
    /// Returns the current local time.
    pub fn now() -> Self {
        Self(Local::now())
    }
}

impl std::fmt::Display for LocalTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("[%x %X %:z]"))
    }
}
