//! Context tree error types.

use loom_core::{ContextId, MessageId};
use thiserror::Error;

/// Structural errors returned by [`ContextTree`](crate::ContextTree) operations.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ContextError {
    /// No context with this ID.
    #[error("context not found: {0}")]
    ContextNotFound(ContextId),
    /// No message with this ID.
    #[error("message not found: {0}")]
    MessageNotFound(MessageId),
    /// The operation is not allowed, e.g. deleting the root context.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

impl ContextError {
    /// Unknown context or message.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ContextNotFound(_) | Self::MessageNotFound(_))
    }
}

/// Result type for context tree operations.
pub type Result<T> = std::result::Result<T, ContextError>;
