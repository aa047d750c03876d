//! Memory configuration derived from settings.

use loom_context::PathTruncation;
use loom_settings::{
    GraphMemorySettings, HybridMemorySettings, MemorySettings, PathTruncationSetting,
    VectorMemorySettings,
};

use crate::assembly::ScoreWeights;

/// Long-term vector store configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct VectorMemoryConfig {
    /// Collection holding the full history.
    pub collection: String,
    /// Maximum hits per query.
    pub max_retrieved: usize,
    /// Minimum similarity for a hit to count.
    pub score_threshold: f32,
}

impl Default for VectorMemoryConfig {
    fn default() -> Self {
        Self::from_settings(&VectorMemorySettings::default())
    }
}

impl VectorMemoryConfig {
    /// Create config from settings.
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_settings(s: &VectorMemorySettings) -> Self {
        Self {
            collection: s.collection.clone(),
            max_retrieved: s.max_retrieved,
            score_threshold: s.score_threshold as f32,
        }
    }
}

/// Configuration for [`HybridMemory`](crate::HybridMemory).
#[derive(Clone, Debug, PartialEq)]
pub struct HybridMemoryConfig {
    /// Recent messages kept in the working buffer.
    pub working_memory_size: usize,
    /// Token budget for assembled context.
    pub max_context_tokens: usize,
    /// Scoring weights.
    pub weights: ScoreWeights,
    /// Recent working messages checked for duplicate semantic hits.
    pub deduplication_window: usize,
    /// Index tool outputs into `tools_collection`.
    pub enable_tool_indexing: bool,
    /// Collection receiving tool outputs.
    pub tools_collection: String,
    /// Sort the non-system part of assembled context by timestamp.
    pub chronological: bool,
    /// Long-term vector store.
    pub vector: VectorMemoryConfig,
}

impl Default for HybridMemoryConfig {
    fn default() -> Self {
        Self::from_settings(&HybridMemorySettings::default())
    }
}

impl HybridMemoryConfig {
    /// Create config from settings.
    pub fn from_settings(s: &HybridMemorySettings) -> Self {
        Self {
            working_memory_size: s.working_memory_size,
            max_context_tokens: s.max_context_tokens,
            weights: ScoreWeights::from_settings(s),
            deduplication_window: s.deduplication_window,
            enable_tool_indexing: s.enable_tool_indexing,
            tools_collection: s.tools_collection.clone(),
            chronological: s.chronological,
            vector: VectorMemoryConfig::from_settings(&s.vector),
        }
    }
}

/// Configuration for [`GraphAwareMemory`](crate::GraphAwareMemory).
#[derive(Clone, Debug, PartialEq)]
pub struct GraphMemoryConfig {
    /// Maximum messages returned by retrieval.
    pub max_retrieved: usize,
    /// Merge the root-to-active conversation path into retrieval.
    pub include_path: bool,
    /// Path truncation mode for the tree.
    pub path_truncation: PathTruncation,
    /// Recent messages kept in the session buffer.
    pub buffer_size: usize,
    /// Token budget for assembled context.
    pub max_context_tokens: usize,
    /// Scoring weights.
    pub weights: ScoreWeights,
    /// Sort the non-system part of assembled context by timestamp.
    pub chronological: bool,
}

impl Default for GraphMemoryConfig {
    fn default() -> Self {
        Self::from_settings(&MemorySettings::default())
    }
}

impl GraphMemoryConfig {
    /// Create config from settings. Buffer size, budget, and weights come
    /// from the hybrid section.
    pub fn from_settings(s: &MemorySettings) -> Self {
        let GraphMemorySettings {
            max_retrieved,
            include_path,
            path_truncation,
        } = &s.graph;
        Self {
            max_retrieved: *max_retrieved,
            include_path: *include_path,
            path_truncation: match path_truncation {
                PathTruncationSetting::Full => PathTruncation::Full,
                PathTruncationSetting::AtBranchPoint => PathTruncation::AtBranchPoint,
            },
            buffer_size: s.hybrid.working_memory_size,
            max_context_tokens: s.hybrid.max_context_tokens,
            weights: ScoreWeights::from_settings(&s.hybrid),
            chronological: s.hybrid.chronological,
        }
    }
}
