//! Semantic index configuration.

use std::path::PathBuf;

use loom_settings::IndexSettings;

/// Collection naming and retrieval limits for the semantic index adapter.
#[derive(Clone, Debug, PartialEq)]
pub struct SemanticIndexConfig {
    /// Collection holding every message from every context.
    pub global_collection: String,
    /// Prefix of per-context collection names.
    pub context_prefix: String,
    /// Search related contexts when the current one yields too little.
    pub enable_cross_search: bool,
    /// Related contexts searched per query.
    pub max_contexts_per_query: usize,
    /// Hits scoring below this never resolve into messages.
    pub score_threshold: f32,
    /// Result cap for hybrid search.
    pub max_retrieved: usize,
    /// Dimensions of the hashing embedder.
    pub embedding_dimensions: usize,
    /// `SQLite` file for the reference index. `None` keeps it in memory.
    pub database_path: Option<PathBuf>,
}

impl Default for SemanticIndexConfig {
    fn default() -> Self {
        Self::from_settings(&IndexSettings::default())
    }
}

impl SemanticIndexConfig {
    /// Create config from settings.
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_settings(s: &IndexSettings) -> Self {
        Self {
            global_collection: s.global_collection.clone(),
            context_prefix: s.context_prefix.clone(),
            enable_cross_search: s.enable_cross_search,
            max_contexts_per_query: s.max_contexts_per_query,
            score_threshold: s.score_threshold as f32,
            max_retrieved: s.max_retrieved,
            embedding_dimensions: s.embedding_dimensions,
            database_path: s.database_path.as_ref().map(PathBuf::from),
        }
    }

    /// Half the retrieval cap: the threshold below which related contexts
    /// are consulted, and the cap on what they contribute.
    pub fn related_cap(&self) -> usize {
        self.max_retrieved / 2
    }
}
