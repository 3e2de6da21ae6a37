//! Error type shared by the SDK.

use crate::event::EventName;

/// Errors surfaced by the SDK.
///
/// Transport faults inside the connection loop never reach callers as
/// errors; they only show up as a closed connection and a reconnect. These
/// variants cover the places where a caller does get a `Result`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The WebSocket could not be opened or failed mid-stream.
    #[error("transport error: {0}")]
    Transport(String),

    /// A frame or payload was not valid JSON for the expected shape.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The session store could not be read or written.
    #[error("session store error: {0}")]
    Session(String),

    /// The backend answered with a `status: "error"` frame.
    #[error("{event} rejected: {message}")]
    Rejected { event: EventName, message: String },

    /// No frame for `event` arrived within the request timeout.
    #[error("timed out waiting for {event}")]
    Timeout { event: EventName },

    /// The client's connection task is gone.
    #[error("client closed")]
    Closed,
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Session(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
