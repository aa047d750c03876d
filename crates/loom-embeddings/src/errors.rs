//! Semantic index error types.
//!
//! Index failures never abort retrieval on their own: the adapter logs and
//! skips failed sub-searches. These errors surface only from direct calls.

use thiserror::Error;

/// Errors from indexing and search.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// `SQLite` error (preserves source chain).
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Vector storage operation failed (non-SQLite).
    #[error("Storage failed: {0}")]
    Storage(String),

    /// Metadata could not be encoded or decoded.
    #[error("Metadata error: {0}")]
    Json(#[from] serde_json::Error),

    /// The named collection does not exist.
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    /// Embedding service not ready.
    #[error("Embedding service not ready")]
    NotReady,

    /// Generic internal error.
    #[error("{0}")]
    Internal(String),
}

/// Result alias for index operations.
pub type Result<T> = std::result::Result<T, EmbeddingError>;
