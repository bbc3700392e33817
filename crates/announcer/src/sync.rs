//! Repository synchronisation with bounded exponential back-off.
//!
//! Before every poll the local clone is brought back to a clean state that
//! tracks the remote branch, then pulled. Pulls go over the network and fail
//! transiently, so they are retried on the [`RetrySchedule`]. Clean-up
//! failures are local and never retried.
//!
//! The back-off wait goes through the [`Delay`] port and is preceded by a
//! liveness check supplied by the caller, so a shutdown or lost connection
//! ends the sequence at the next attempt boundary.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::errors::SyncFailure;
use crate::ports::{Confirm, Delay, VcsClient};
use crate::types::{LocalTimestamp, RetrySchedule};

/// Time limit for a single pull.
pub const PULL_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Question put to the operator before local changes are thrown away.
pub const DISCARD_PROMPT: &str =
    "This repository has local changes, continue? (uncommitted changes will be lost) y/n: ";

/// Keeps the local clone clean and up to date.
#[derive(Clone)]
pub struct Synchronizer {
    vcs: Arc<dyn VcsClient>,
    delay: Arc<dyn Delay>,
    confirm: Arc<dyn Confirm>,
    schedule: RetrySchedule,
    pull_timeout: Duration,
}

impl Synchronizer {
    /// Creates a synchroniser with the default schedule and pull timeout.
    pub fn new(vcs: Arc<dyn VcsClient>, delay: Arc<dyn Delay>, confirm: Arc<dyn Confirm>) -> Self {
        Self {
            vcs,
            delay,
            confirm,
            schedule: RetrySchedule::DEFAULT,
            pull_timeout: PULL_TIMEOUT,
        }
    }

    /// Replaces the retry schedule.
    pub fn with_schedule(mut self, schedule: RetrySchedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Replaces the per-pull time limit.
    pub fn with_pull_timeout(mut self, pull_timeout: Duration) -> Self {
        self.pull_timeout = pull_timeout;
        self
    }

    /// Brings the clone to a clean tracking state and pulls.
    ///
    /// With `force_clean == false`, local changes are only discarded after the
    /// operator confirms; declining fails without touching the network.
    /// `is_alive` is consulted before every back-off wait.
    ///
    /// Succeeds only when a pull succeeds within the retry budget.
    pub async fn synchronize<F>(&self, force_clean: bool, is_alive: F) -> Result<(), SyncFailure>
    where
        F: Fn() -> bool,
    {
        self.ensure_trackable(force_clean).await?;
        self.pull_with_backoff(is_alive).await
    }

    async fn ensure_trackable(&self, force_clean: bool) -> Result<(), SyncFailure> {
        let clean = match self.vcs.is_cleanly_tracking_remote().await {
            Ok(clean) => clean,
            Err(e) => {
                warn!(error = %e, "could not inspect repository state; treating it as dirty");
                false
            }
        };
        if clean {
            return Ok(());
        }

        if !force_clean && !self.confirm.confirm(DISCARD_PROMPT) {
            info!("keeping local changes; repository not updated");
            return Err(SyncFailure::Declined);
        }

        self.vcs.ensure_cleanly_tracking_remote().await.map_err(|e| {
            error!(error = %e, "failed to clean repository");
            SyncFailure::Cleanup(e)
        })
    }

    async fn pull_with_backoff<F>(&self, is_alive: F) -> Result<(), SyncFailure>
    where
        F: Fn() -> bool,
    {
        let max_attempts = self.schedule.max_attempts();
        let mut attempt = 1;

        loop {
            match self.vcs.pull(self.pull_timeout).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    error!(
                        error = %e,
                        output = e.output().unwrap_or_default(),
                        attempt,
                        max_attempts,
                        "error pulling from server"
                    );
                    if attempt >= max_attempts {
                        error!(at = %LocalTimestamp::now(), "exceeded pull attempts; aborting");
                        return Err(SyncFailure::Exhausted {
                            attempts: attempt,
                            last_error: e,
                        });
                    }
                }
            }

            attempt += 1;

            // The operator may have asked us to stop while the last pull ran.
            if !is_alive() {
                info!(attempt, "connection closed; abandoning repository update");
                return Err(SyncFailure::Aborted { attempt });
            }

            let wait = self.schedule.wait_before(attempt).unwrap_or_default();
            if wait < Duration::from_secs(120) {
                info!("waiting {} seconds", wait.as_secs());
            } else {
                info!("waiting {} minutes", wait.as_secs() / 60);
            }
            self.delay.sleep(wait).await;
            info!(attempt, max_attempts, "pull attempt {attempt} out of {max_attempts}");
        }
    }
}
