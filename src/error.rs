use chrono::NaiveDate;
use thiserror::Error;

use crate::session::SessionId;

/// Connection-level failures. Never fatal to the process.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The session's outbound queue is gone, its connection already closed.
    #[error("session {0} is no longer connected")]
    Closed(SessionId),

    /// The session's queue is full; it is being disconnected.
    #[error("session {0} is not keeping up")]
    Lagged(SessionId),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Registry misuse. Seeing one of these means a handler bug, not bad input.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("session {0} is already registered")]
    DuplicateSession(SessionId),

    #[error("session {0} is not registered")]
    NotFound(SessionId),
}

/// A single dated lookup against the rate source failed.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("rate source answered {status} for {date}")]
    Status { date: NaiveDate, status: u16 },

    #[error("unreadable rates for {date}: {reason}")]
    Malformed { date: NaiveDate, reason: String },

    #[error("request for {date} failed: {reason}")]
    Transport { date: NaiveDate, reason: String },
}

/// Errors returned by [`RateFetcher`](crate::rates::RateFetcher).
#[derive(Error, Debug)]
pub enum RateError {
    /// Rejected before any lookup was issued.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}
