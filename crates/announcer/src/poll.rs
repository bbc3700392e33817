//! One poll cycle: synchronise, collect new commits, announce, advance.
//!
//! # Watermark
//!
//! The cycle owns the watermark: the last commit it has taken responsibility
//! for. The next query asks for commits strictly after it. The watermark moves
//! to the last commit of a batch as soon as the batch has been fetched, before
//! any commit in it is announced. Progress is tracked per batch, not per
//! message: a batch interrupted half-way is not revisited, so delivery is at
//! most once. A failed fetch leaves the watermark where it was.

use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::errors::{SyncFailure, VcsError};
use crate::format::{format_announcement, sanitize, should_announce};
use crate::identifiers::{ChannelName, CommitId, CycleId, WatchPath};
use crate::ports::{ChatConnection, VcsClient};
use crate::sync::Synchronizer;
use crate::types::{LocalTimestamp, COMMIT_DETAIL_FORMAT};

/// What a single cycle did.
#[derive(Debug)]
pub enum CycleOutcome {
    /// The connection was down; nothing was attempted.
    NotConnected,
    /// Synchronisation was abandoned because the connection went away.
    SyncAborted,
    /// Synchronisation failed for good. The service must stop.
    SyncFailed(SyncFailure),
    /// Listing new commits failed; the watermark is unchanged.
    FetchFailed(VcsError),
    /// The repository has nothing after the watermark.
    NoNewCommits,
    /// A batch was processed and the watermark advanced.
    Processed(BatchReport),
}

/// Counts for one processed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Commits in the batch.
    pub commits: usize,
    /// Announcements handed to the connection.
    pub announced: usize,
    /// Commits that touched nothing under the watch path.
    pub filtered: usize,
    /// Qualifying commits whose detail was malformed.
    pub malformed: usize,
    /// Commits skipped because a repository query or a send failed.
    pub failed: usize,
}

/// Poll-cycle state carried from one iteration to the next.
#[derive(Debug, Clone)]
pub struct PollCycle {
    watermark: CommitId,
    watch_path: WatchPath,
    channel: ChannelName,
}

impl PollCycle {
    /// Starts from `watermark`; only commits after it will be considered.
    pub fn new(watermark: CommitId, watch_path: WatchPath, channel: ChannelName) -> Self {
        Self {
            watermark,
            watch_path,
            channel,
        }
    }

    /// The last commit handled.
    pub fn watermark(&self) -> &CommitId {
        &self.watermark
    }

    /// Runs one cycle.
    pub async fn run(
        &mut self,
        vcs: &dyn VcsClient,
        synchronizer: &Synchronizer,
        connection: &dyn ChatConnection,
    ) -> CycleOutcome {
        let span = info_span!("poll_cycle", cycle_id = %CycleId::new_random());
        self.run_inner(vcs, synchronizer, connection)
            .instrument(span)
            .await
    }

    async fn run_inner(
        &mut self,
        vcs: &dyn VcsClient,
        synchronizer: &Synchronizer,
        connection: &dyn ChatConnection,
    ) -> CycleOutcome {
        if !connection.is_connected() {
            debug!("not connected; skipping poll");
            return CycleOutcome::NotConnected;
        }

        if let Err(failure) = synchronizer
            .synchronize(true, || connection.is_connected())
            .await
        {
            if failure.is_fatal() {
                error!(at = %LocalTimestamp::now(), error = %failure, "failed to update repository");
                return CycleOutcome::SyncFailed(failure);
            }
            info!(error = %failure, "repository update abandoned");
            return CycleOutcome::SyncAborted;
        }

        let commits = match vcs.commits_since(&self.watermark).await {
            Ok(commits) => commits,
            Err(e) => {
                error!(error = %e, watermark = %self.watermark, "failed to list new commits");
                return CycleOutcome::FetchFailed(e);
            }
        };
        let Some(last) = commits.last() else {
            debug!(watermark = %self.watermark, "no new commits");
            return CycleOutcome::NoNewCommits;
        };
        self.watermark = last.clone();
        info!(
            at = %LocalTimestamp::now(),
            commits = commits.len(),
            watermark = %self.watermark,
            "processing new commits"
        );

        let mut report = BatchReport {
            commits: commits.len(),
            ..BatchReport::default()
        };
        for commit in &commits {
            self.process(vcs, connection, commit, &mut report).await;
        }
        CycleOutcome::Processed(report)
    }

    async fn process(
        &self,
        vcs: &dyn VcsClient,
        connection: &dyn ChatConnection,
        commit: &CommitId,
        report: &mut BatchReport,
    ) {
        let files = match vcs.affected_files(commit).await {
            Ok(files) => files,
            Err(e) => {
                warn!(error = %e, %commit, "failed to list affected files; skipping commit");
                report.failed += 1;
                return;
            }
        };
        if !should_announce(&files, &self.watch_path) {
            report.filtered += 1;
            return;
        }

        let detail = match vcs.commit_detail(commit, COMMIT_DETAIL_FORMAT).await {
            Ok(detail) => detail,
            Err(e) => {
                warn!(error = %e, %commit, "failed to read commit detail; skipping commit");
                report.failed += 1;
                return;
            }
        };
        let announcement = match format_announcement(&detail) {
            Ok(announcement) => announcement,
            Err(e) => {
                error!(error = %e, %commit, "malformed commit log");
                report.malformed += 1;
                return;
            }
        };

        info!(at = %LocalTimestamp::now(), %commit, "posting commit");
        match connection.send(&self.channel, &sanitize(announcement.as_str())) {
            Ok(()) => {
                info!(at = %LocalTimestamp::now(), message = ?announcement.as_str(), "posted message");
                report.announced += 1;
            }
            Err(e) => {
                warn!(error = %e, %commit, "failed to post announcement");
                report.failed += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::testing::{sha, FakeChat, FakeVcs, RecordingDelay, ScriptedConfirm};

    fn setup(vcs: FakeVcs) -> (Arc<FakeVcs>, Synchronizer, PollCycle) {
        let vcs = Arc::new(vcs);
        let synchronizer = Synchronizer::new(
            vcs.clone(),
            Arc::new(RecordingDelay::default()),
            Arc::new(ScriptedConfirm::answering(false)),
        );
        let cycle = PollCycle::new(
            CommitId::new(sha(0)).unwrap(),
            WatchPath::new("third_party/WebKit").unwrap(),
            ChannelName::new("#blink").unwrap(),
        );
        (vcs, synchronizer, cycle)
    }

    fn detail(n: u8, body: &str) -> String {
        format!("{}\ndev{n}@chromium.org\nChange {n}\n{body}", sha(n))
    }

    #[tokio::test]
    async fn no_new_commits_sends_nothing() {
        let (vcs, sync, mut cycle) = setup(FakeVcs::new().with_commit(0, &detail(0, ""), &[]));
        let chat = FakeChat::connected("commit-bot");

        let outcome = cycle.run(vcs.as_ref(), &sync, &chat).await;

        assert!(matches!(outcome, CycleOutcome::NoNewCommits));
        assert!(chat.sent().is_empty());
        assert_eq!(cycle.watermark().as_str(), sha(0));
    }

    #[tokio::test]
    async fn only_qualifying_commit_is_announced() {
        let (vcs, sync, mut cycle) = setup(
            FakeVcs::new()
                .with_commit(0, &detail(0, ""), &[])
                .with_commit(1, &detail(1, "Unrelated.\n"), &["chrome/browser/foo.cc"])
                .with_commit(
                    2,
                    &detail(2, "Blink.\n\nCr-Commit-Position: refs/heads/master@{#123456}\n"),
                    &["third_party/WebKit/Source/core/Node.cpp"],
                ),
        );
        let chat = FakeChat::connected("commit-bot");

        let outcome = cycle.run(vcs.as_ref(), &sync, &chat).await;

        let sent = chat.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "#blink");
        assert!(sent[0].1.contains("https://crrev.com/123456"));
        assert_eq!(
            sent[0].1,
            "https://crrev.com/123456 dev2@chromium.org committed \"Change 2\""
        );
        match outcome {
            CycleOutcome::Processed(report) => {
                assert_eq!(report.commits, 2);
                assert_eq!(report.announced, 1);
                assert_eq!(report.filtered, 1);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(cycle.watermark().as_str(), sha(2));
        assert_eq!(vcs.detail_requests(), vec![sha(2)]);
    }

    #[tokio::test]
    async fn watermark_advances_even_when_nothing_qualifies() {
        let (vcs, sync, mut cycle) = setup(
            FakeVcs::new()
                .with_commit(0, &detail(0, ""), &[])
                .with_commit(1, &detail(1, ""), &["docs/README.md"]),
        );
        let chat = FakeChat::connected("commit-bot");

        cycle.run(vcs.as_ref(), &sync, &chat).await;

        assert!(chat.sent().is_empty());
        assert_eq!(cycle.watermark().as_str(), sha(1));
    }

    #[tokio::test]
    async fn later_cycles_only_see_newer_commits() {
        let (vcs, sync, mut cycle) = setup(
            FakeVcs::new()
                .with_commit(0, &detail(0, ""), &[])
                .with_commit(1, &detail(1, ""), &["third_party/WebKit/a"]),
        );
        let chat = FakeChat::connected("commit-bot");

        cycle.run(vcs.as_ref(), &sync, &chat).await;
        vcs.push_commit(2, &detail(2, ""), &["third_party/WebKit/b"]);
        cycle.run(vcs.as_ref(), &sync, &chat).await;
        let outcome = cycle.run(vcs.as_ref(), &sync, &chat).await;

        let sent: Vec<String> = chat.sent().into_iter().map(|(_, text)| text).collect();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].contains("Change 1"));
        assert!(sent[1].contains("Change 2"));
        assert!(matches!(outcome, CycleOutcome::NoNewCommits));
        assert_eq!(cycle.watermark().as_str(), sha(2));
    }

    #[tokio::test]
    async fn malformed_commit_is_skipped_and_the_rest_announced() {
        let (vcs, sync, mut cycle) = setup(
            FakeVcs::new()
                .with_commit(0, &detail(0, ""), &[])
                .with_commit(1, &format!("{}\ndev1@chromium.org", sha(1)), &["third_party/WebKit/a"])
                .with_commit(2, &detail(2, ""), &["third_party/WebKit/b"]),
        );
        let chat = FakeChat::connected("commit-bot");

        let outcome = cycle.run(vcs.as_ref(), &sync, &chat).await;

        match outcome {
            CycleOutcome::Processed(report) => {
                assert_eq!(report.malformed, 1);
                assert_eq!(report.announced, 1);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        let sent = chat.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("Change 2"));
    }

    #[tokio::test]
    async fn disconnected_cycle_does_nothing() {
        let (vcs, sync, mut cycle) = setup(
            FakeVcs::new()
                .with_commit(0, &detail(0, ""), &[])
                .with_commit(1, &detail(1, ""), &["third_party/WebKit/a"]),
        );
        let chat = FakeChat::disconnected("commit-bot");

        let outcome = cycle.run(vcs.as_ref(), &sync, &chat).await;

        assert!(matches!(outcome, CycleOutcome::NotConnected));
        assert_eq!(vcs.pull_count(), 0);
        assert_eq!(cycle.watermark().as_str(), sha(0));
    }

    #[tokio::test]
    async fn exhausted_pulls_are_fatal_and_keep_the_watermark() {
        let (vcs, sync, mut cycle) = setup(
            FakeVcs::new()
                .with_commit(0, &detail(0, ""), &[])
                .with_commit(1, &detail(1, ""), &["third_party/WebKit/a"])
                .failing_pulls(8),
        );
        let chat = FakeChat::connected("commit-bot");

        let outcome = cycle.run(vcs.as_ref(), &sync, &chat).await;

        assert!(matches!(
            outcome,
            CycleOutcome::SyncFailed(SyncFailure::Exhausted { attempts: 8, .. })
        ));
        assert!(chat.sent().is_empty());
        assert_eq!(cycle.watermark().as_str(), sha(0));
    }

    #[tokio::test]
    async fn failed_listing_keeps_the_watermark() {
        let (vcs, sync, mut cycle) = setup(
            FakeVcs::new()
                .with_commit(0, &detail(0, ""), &[])
                .with_commit(1, &detail(1, ""), &["third_party/WebKit/a"])
                .failing_listing(),
        );
        let chat = FakeChat::connected("commit-bot");

        let outcome = cycle.run(vcs.as_ref(), &sync, &chat).await;

        assert!(matches!(outcome, CycleOutcome::FetchFailed(_)));
        assert_eq!(cycle.watermark().as_str(), sha(0));
    }

    #[tokio::test]
    async fn announcements_are_sanitised() {
        let (vcs, sync, mut cycle) = setup(
            FakeVcs::new()
                .with_commit(0, &detail(0, ""), &[])
                .with_commit(
                    1,
                    &format!("{}\nzoë@chromium.org\nCafé layout\n", sha(1)),
                    &["third_party/WebKit/a"],
                ),
        );
        let chat = FakeChat::connected("commit-bot");

        cycle.run(vcs.as_ref(), &sync, &chat).await;

        let sent = chat.sent();
        assert!(sent[0].1.contains("zo\\xeb@chromium.org"));
        assert!(sent[0].1.contains("\"Caf\\xe9 layout\""));
    }
}
