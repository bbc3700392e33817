//! Commit announcer version-control adapter.
//!
//! Implements the [`announcer::VcsClient`] trait over a local git clone by
//! running the `git` CLI.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** This crate must not contain domain rules. It knows how
//! to ask git a question and how to read the answer; deciding what to do with
//! it belongs to the [`announcer`] crate.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`executor`] | Spawning `git` with a time limit |
//! | [`repository`] | [`GitRepository`], the `VcsClient` implementation |

pub mod executor;
pub mod repository;

pub use executor::{CommandExecutor, CommandResult, ExecError, ProcessExecutor};
pub use repository::{GitRepository, DEFAULT_BRANCH, DEFAULT_REMOTE};
