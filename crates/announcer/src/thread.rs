//! Runs an [`Announcer`] on a dedicated OS thread with its own runtime.
//!
//! The announcer blocks on operator confirmation during start-up and keeps a
//! long-lived session open, so it gets a thread of its own rather than a task
//! on the caller's runtime. The caller keeps an [`AnnouncerThread`] handle to
//! observe the thread exiting on its own and to stop it.

use std::thread::JoinHandle;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::errors::AnnouncerError;
use crate::service::{Announcer, ServiceExit};

const THREAD_NAME: &str = "commit-announcer";

/// Handle to a running announcer thread.
///
/// Dropping the handle requests shutdown and waits for the thread.
pub struct AnnouncerThread {
    shutdown: CancellationToken,
    exited: CancellationToken,
    handle: Option<JoinHandle<Result<ServiceExit, AnnouncerError>>>,
}

impl AnnouncerThread {
    /// Spawns the thread and starts `announcer` on it.
    pub fn start(announcer: Announcer) -> Result<Self, AnnouncerError> {
        let shutdown = CancellationToken::new();
        let exited = CancellationToken::new();

        let handle = std::thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn({
                let shutdown = shutdown.clone();
                let exited = exited.clone();
                move || {
                    // Cancelled however the thread ends, including a panic.
                    let _exited = exited.drop_guard();
                    let runtime = tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                        .map_err(AnnouncerError::Runtime)?;
                    runtime.block_on(announcer.run(shutdown))
                }
            })
            .map_err(AnnouncerError::Runtime)?;

        info!(thread = THREAD_NAME, "announcer thread started");
        Ok(Self {
            shutdown,
            exited,
            handle: Some(handle),
        })
    }

    /// `true` once the thread has finished.
    pub fn is_finished(&self) -> bool {
        self.exited.is_cancelled()
    }

    /// Resolves when the thread finishes, whether on its own or after
    /// [`Self::stop`].
    pub async fn exited(&self) {
        self.exited.cancelled().await;
    }

    /// Requests shutdown and waits for the thread to finish.
    ///
    /// Blocks the calling thread; call it from `spawn_blocking` inside an
    /// async context.
    pub fn stop(mut self) -> Result<ServiceExit, AnnouncerError> {
        self.shutdown.cancel();
        self.wait()
    }

    /// Waits for the thread to finish without requesting shutdown.
    pub fn join(mut self) -> Result<ServiceExit, AnnouncerError> {
        self.wait()
    }

    fn wait(&mut self) -> Result<ServiceExit, AnnouncerError> {
        let Some(handle) = self.handle.take() else {
            return Err(AnnouncerError::ThreadPanicked);
        };
        match handle.join() {
            Ok(result) => result,
            Err(_) => {
                error!(thread = THREAD_NAME, "announcer thread panicked");
                Err(AnnouncerError::ThreadPanicked)
            }
        }
    }
}

impl Drop for AnnouncerThread {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.shutdown.cancel();
            let _ = self.wait();
        }
    }
}
