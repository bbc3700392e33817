//! Commit announcer chat adapter.
//!
//! Implements [`announcer::ChatConnector`] and [`announcer::ChatConnection`]
//! for IRC over plain TCP.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** This crate must not contain domain rules. It speaks the
//! protocol (registration, keep-alive, numeric replies) and hands the
//! [`announcer`] crate a stream of [`announcer::ChatEvent`]s.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`message`] | Protocol line parsing and serialisation |
//! | [`connection`] | A registered session over any async byte stream |
//! | [`connector`] | Dialling a server over TCP |

pub mod connection;
pub mod connector;
pub mod message;

pub use connection::{IrcConnection, Registration, MAX_LINE_LENGTH};
pub use connector::{IrcConnector, DEFAULT_PORT, DEFAULT_SERVER};
pub use message::{Message, ParseError};
