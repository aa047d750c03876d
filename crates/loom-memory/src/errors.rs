//! Memory error types.

use thiserror::Error;

use loom_context::ContextError;
use loom_embeddings::EmbeddingError;

/// Errors from memory operations.
///
/// Retrieval degrades instead of failing, so these surface only from
/// structural tree errors and from index writes.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Unknown context or message, or an invalid tree operation.
    #[error("context error: {0}")]
    Context(#[from] ContextError),

    /// The semantic index rejected a write or a direct search.
    #[error("index error: {0}")]
    Index(#[from] EmbeddingError),
}

/// Result alias for memory operations.
pub type Result<T> = std::result::Result<T, MemoryError>;

#[cfg(test)]
mod tests {
    use super::*;
    use loom_core::ContextId;
    use std::error::Error;

    #[test]
    fn wraps_context_errors() {
        let err: MemoryError = ContextError::ContextNotFound(ContextId::from("c1")).into();
        assert!(matches!(err, MemoryError::Context(_)));
        assert!(err.to_string().starts_with("context error:"));
        assert!(err.to_string().contains("c1"));
    }

    #[test]
    fn wraps_index_errors_with_source() {
        let err: MemoryError = EmbeddingError::NotReady.into();
        assert_eq!(err.to_string(), "index error: Embedding service not ready");
        assert!(err.source().is_some());
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MemoryError>();
    }
}
