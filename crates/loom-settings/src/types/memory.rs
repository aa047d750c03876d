//! Memory subsystem settings.
//!
//! Three sections: `hybrid` (working buffer, scoring, budget), `graph`
//! (branch-aware retrieval) and `index` (semantic index collections and
//! search limits).

use serde::{Deserialize, Serialize};

use super::{check_non_zero, check_unit_interval};
use crate::errors::Result;

/// Container for all memory settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MemorySettings {
    /// Working buffer, scoring, and token budget.
    pub hybrid: HybridMemorySettings,
    /// Branch-aware retrieval.
    pub graph: GraphMemorySettings,
    /// Semantic index.
    pub index: IndexSettings,
}

impl MemorySettings {
    /// Range-check every section.
    pub fn validate(&self) -> Result<()> {
        self.hybrid.validate()?;
        self.graph.validate()?;
        self.index.validate()
    }
}

/// Settings for the working-buffer-plus-vector composition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HybridMemorySettings {
    /// Recent messages kept in the working buffer.
    pub working_memory_size: usize,
    /// Token budget for the assembled context.
    pub max_context_tokens: usize,
    /// Weight applied to semantic relevance (0.0–1.0).
    pub semantic_weight: f64,
    /// Weight applied to recency (0.0–1.0).
    pub recency_weight: f64,
    /// Recent working messages checked for duplicate semantic hits.
    pub deduplication_window: usize,
    /// Index tool outputs into a separate collection.
    pub enable_tool_indexing: bool,
    /// Collection receiving tool outputs.
    pub tools_collection: String,
    /// Sort the non-system part of the assembled context by timestamp.
    pub chronological: bool,
    /// Long-term vector store.
    pub vector: VectorMemorySettings,
}

impl Default for HybridMemorySettings {
    fn default() -> Self {
        Self {
            working_memory_size: 10,
            max_context_tokens: 4000,
            semantic_weight: 0.7,
            recency_weight: 0.3,
            deduplication_window: 5,
            enable_tool_indexing: true,
            tools_collection: "tools".to_owned(),
            chronological: false,
            vector: VectorMemorySettings::default(),
        }
    }
}

impl HybridMemorySettings {
    fn validate(&self) -> Result<()> {
        check_non_zero("hybrid.workingMemorySize", self.working_memory_size)?;
        check_non_zero("hybrid.maxContextTokens", self.max_context_tokens)?;
        check_unit_interval("hybrid.semanticWeight", self.semantic_weight)?;
        check_unit_interval("hybrid.recencyWeight", self.recency_weight)?;
        self.vector.validate()
    }
}

/// Long-term vector store settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VectorMemorySettings {
    /// Collection holding the full history.
    pub collection: String,
    /// Maximum hits per query.
    pub max_retrieved: usize,
    /// Minimum similarity for a hit to count.
    pub score_threshold: f64,
}

impl Default for VectorMemorySettings {
    fn default() -> Self {
        Self {
            collection: "conversations".to_owned(),
            max_retrieved: 10,
            score_threshold: 0.7,
        }
    }
}

impl VectorMemorySettings {
    fn validate(&self) -> Result<()> {
        check_non_zero("hybrid.vector.maxRetrieved", self.max_retrieved)?;
        check_unit_interval("hybrid.vector.scoreThreshold", self.score_threshold)
    }
}

/// How far up the branch chain the conversation path reaches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PathTruncationSetting {
    /// Every ancestor contributes all of its messages.
    #[default]
    Full,
    /// Ancestors contribute messages up to the branch point only.
    AtBranchPoint,
}

/// Branch-aware retrieval settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GraphMemorySettings {
    /// Maximum messages returned by retrieval.
    pub max_retrieved: usize,
    /// Merge the root-to-active conversation path into retrieval.
    pub include_path: bool,
    /// Path truncation mode.
    pub path_truncation: PathTruncationSetting,
}

impl Default for GraphMemorySettings {
    fn default() -> Self {
        Self {
            max_retrieved: 20,
            include_path: true,
            path_truncation: PathTruncationSetting::Full,
        }
    }
}

impl GraphMemorySettings {
    fn validate(&self) -> Result<()> {
        check_non_zero("graph.maxRetrieved", self.max_retrieved)
    }
}

/// Semantic index settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IndexSettings {
    /// Collection holding every message from every context.
    pub global_collection: String,
    /// Prefix of per-context collection names.
    pub context_prefix: String,
    /// Search related contexts when the current one is thin.
    pub enable_cross_search: bool,
    /// Contexts searched by a cross-context query.
    pub max_contexts_per_query: usize,
    /// Minimum similarity for a hit to resolve into a message.
    pub score_threshold: f64,
    /// Result cap for hybrid search.
    pub max_retrieved: usize,
    /// Dimensions of the hashing embedder.
    pub embedding_dimensions: usize,
    /// `SQLite` database path. `None` keeps the index in memory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_path: Option<String>,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            global_collection: "global_conversations".to_owned(),
            context_prefix: "ctx_".to_owned(),
            enable_cross_search: true,
            max_contexts_per_query: 5,
            score_threshold: 0.5,
            max_retrieved: 20,
            embedding_dimensions: 256,
            database_path: None,
        }
    }
}

impl IndexSettings {
    fn validate(&self) -> Result<()> {
        check_non_zero("index.maxRetrieved", self.max_retrieved)?;
        check_non_zero("index.embeddingDimensions", self.embedding_dimensions)?;
        check_unit_interval("index.scoreThreshold", self.score_threshold)
    }
}
