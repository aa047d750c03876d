//! # loom-memory
//!
//! Bounded, ranked model context built from conversation memory.
//!
//! - [`WorkingMemory`]: recent-turn buffer with system-preserving eviction
//! - [`VectorMemory`]: full history recalled by similarity
//! - [`HybridMemory`]: working buffer plus vector recall for a linear conversation
//! - [`GraphAwareMemory`]: branch-aware memory over a `ContextTree`
//! - [`assembly`]: scoring, deduplication, and budget-bounded assembly

#![deny(unsafe_code)]

pub mod assembly;
pub mod config;
pub mod errors;
pub mod graph;
pub mod hybrid;
pub mod vector;
pub mod working;

pub use assembly::{
    ScoreWeights, ScoredMessage, assemble_context, deduplicate_by_content, estimate_tokens,
    merge_unique, score_messages,
};
pub use config::{GraphMemoryConfig, HybridMemoryConfig, VectorMemoryConfig};
pub use errors::{MemoryError, Result};
pub use graph::{BranchInfo, ContextInfo, GraphAwareMemory, GraphMemoryVariables};
pub use hybrid::{HybridMemory, HybridVariables};
pub use vector::VectorMemory;
pub use working::{WorkingMemory, format_history};
