//! Real-time chat relay over WebSockets with an `exchange` command that
//! broadcasts currency rates and records them in an activity log.
//!
//! - [`server`] accepts connections and runs one task per session.
//! - [`registry`] tracks connected [`session`]s.
//! - [`broadcast`] fans messages out to every session.
//! - [`command`] classifies inbound text and carries it out.
//! - [`rates`] fetches dated rates from the bank API.
//! - [`activity_log`] appends rate results to a file.

pub mod activity_log;
pub mod broadcast;
pub mod client;
pub mod command;
pub mod config;
pub mod error;
pub mod rates;
pub mod registry;
pub mod runtime;
pub mod server;
pub mod session;

// Re-export public items for convenience
pub use command::{Command, Router};
pub use config::Config;
pub use rates::{HttpRateSource, RateFetcher, RateSource};
pub use registry::ClientRegistry;
pub use server::ChatServer;
