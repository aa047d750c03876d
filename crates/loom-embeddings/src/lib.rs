//! # loom-embeddings
//!
//! Semantic indexing and branch-aware retrieval.
//!
//! - [`SemanticIndex`]: the collection-oriented similarity index boundary
//! - [`SqliteSemanticIndex`]: reference index storing vectors in `SQLite`
//!   and ranking by brute-force cosine similarity
//! - [`HashingEmbeddingService`]: deterministic feature-hashing embedder
//! - [`SemanticIndexAdapter`]: per-context indexing and hybrid search over a
//!   `ContextTree`

#![deny(unsafe_code)]

pub mod adapter;
pub mod config;
pub mod errors;
pub mod index;
pub mod normalize;
pub mod service;
pub mod text;
pub mod vector_repo;

pub use adapter::{SemanticIndexAdapter, message_document_id};
pub use config::SemanticIndexConfig;
pub use errors::{EmbeddingError, Result};
pub use index::{
    Document, DocumentKind, DocumentMetadata, SearchHit, SearchRequest, SemanticIndex,
};
pub use service::{EmbeddingService, HashingEmbeddingService};
pub use text::{classify_tool_result, message_index_text, tool_output_text};
pub use vector_repo::SqliteSemanticIndex;
