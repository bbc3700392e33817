//! Commit announcer entry point.
//!
//! This binary is the composition root. Responsibilities:
//!
//! 1. **Wire observability**: `tracing-subscriber` with a fmt or JSON layer
//!    and an optional OpenTelemetry OTLP exporter.
//! 2. **Parse configuration**: load `.commit-announcer/config.toml` (or the
//!    path given as the first argument or in `COMMIT_ANNOUNCER_CONFIG`) and
//!    validate it.
//! 3. **Construct infrastructure**: a [`git::GitRepository`], an
//!    [`irc::IrcConnector`] and a confirmation source, injected into an
//!    [`announcer::Announcer`].
//! 4. **Supervise**: run the announcer on its own thread until it exits or
//!    the operator presses Ctrl-C.

mod config;
mod confirm;
mod observability;

use std::process::ExitCode;
use std::sync::Arc;

use announcer::{
    Announcer, AnnouncerConfig, AnnouncerThread, AssumeYes, Confirm, ServiceExit, Synchronizer,
    TokioDelay,
};
use anyhow::{Context, Result};
use git::GitRepository;
use irc::IrcConnector;
use tracing::{error, info};

use crate::config::{resolve_config_path, AnnouncerSettings, CONFIG_ENV, PASSWORD_ENV};
use crate::confirm::StdinConfirm;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let telemetry = observability::init()?;
    let result = run().await;
    if let Err(e) = &result {
        error!("announcer failed: {e:#}");
    }
    telemetry.shutdown();
    result
}

async fn run() -> Result<ExitCode> {
    let path = resolve_config_path(std::env::args().nth(1), std::env::var(CONFIG_ENV).ok());
    let settings = AnnouncerSettings::load(&path)?
        .with_password_override(std::env::var(PASSWORD_ENV).ok());
    let validated = settings
        .validate()
        .with_context(|| format!("invalid configuration in {}", path.display()))?;

    let repository = &validated.repository;
    let vcs = Arc::new(
        GitRepository::new(&repository.path).tracking(&repository.remote, &repository.branch),
    );

    let mut connector = IrcConnector::new(
        settings.irc.server.as_str(),
        settings.irc.port,
        validated.nickname.clone(),
    );
    if let Some(realname) = &settings.irc.realname {
        connector = connector.with_realname(realname.as_str());
    }
    if let Some(password) = &settings.irc.password {
        connector = connector.with_password(password.as_str());
    }

    let confirm: Arc<dyn Confirm> = if validated.discard_local_changes {
        Arc::new(AssumeYes)
    } else {
        Arc::new(StdinConfirm)
    };
    let synchronizer = Synchronizer::new(vcs.clone(), Arc::new(TokioDelay), confirm)
        .with_schedule(validated.schedule)
        .with_pull_timeout(validated.pull_timeout);

    let config = AnnouncerConfig::new(validated.watch_path.clone(), validated.channel.clone())
        .with_poll_interval(validated.poll_interval)?;
    let announcer = Announcer::new(config, vcs, Arc::new(connector), synchronizer);

    let thread = AnnouncerThread::start(announcer)?;
    info!(
        server = %settings.irc.server,
        channel = %validated.channel,
        repository = %repository.path.display(),
        "bot started"
    );

    let interrupted = tokio::select! {
        _ = tokio::signal::ctrl_c() => true,
        _ = thread.exited() => false,
    };

    let exit = tokio::task::spawn_blocking(move || {
        if interrupted {
            info!("disconnecting bot");
            thread.stop()
        } else {
            info!("bot offline");
            thread.join()
        }
    })
    .await
    .context("announcer supervisor task failed")??;

    info!(?exit, "done");
    Ok(match exit {
        ServiceExit::Quit | ServiceExit::Shutdown => ExitCode::SUCCESS,
        ServiceExit::InitialSyncFailed
        | ServiceExit::RepositoryUnavailable
        | ServiceExit::ConnectionClosed => ExitCode::FAILURE,
    })
}
