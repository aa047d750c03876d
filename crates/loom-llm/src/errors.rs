//! Stream error types.

use loom_core::StreamId;
use thiserror::Error;

/// Errors raised while producing or accumulating a fragment stream.
///
/// Cloneable so a fragment can carry one to the accumulator.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum StreamError {
    /// The stream was cancelled before completion.
    #[error("stream cancelled")]
    Cancelled,
    /// The transport failed to deliver or decode a fragment.
    #[error("transport error: {0}")]
    Transport(String),
    /// The stream exists but has not received its terminal fragment.
    #[error("stream {0} is not complete")]
    NotComplete(StreamId),
    /// No accumulating entry exists for the stream.
    #[error("stream {0} not found")]
    NotFound(StreamId),
}

impl StreamError {
    /// Category string for structured logs.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Cancelled => "cancelled",
            Self::Transport(_) => "transport",
            Self::NotComplete(_) => "not_complete",
            Self::NotFound(_) => "not_found",
        }
    }
}

/// Result type for stream operations.
pub type Result<T> = std::result::Result<T, StreamError>;
