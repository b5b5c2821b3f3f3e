// crates/stream/src/error.rs
use thiserror::Error;

use crate::formatter::EventKind;
use crate::types::JobId;

/// Errors raised by the streaming core.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The producer appended after the channel was closed.
    #[error("output channel for job {0} is closed")]
    ChannelClosed(JobId),

    #[error("job {0} is already running")]
    AlreadyRunning(JobId),

    #[error("job {0} is not running")]
    NotRunning(JobId),
}

/// Errors raised while rendering one event for the wire.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("failed to render {kind} event: {message}")]
    Render { kind: EventKind, message: String },

    #[error("lookup failed: {0}")]
    Lookup(String),

    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl FormatError {
    pub fn render(kind: EventKind, message: impl Into<String>) -> Self {
        Self::Render {
            kind,
            message: message.into(),
        }
    }
}
