//! Branch-aware indexing and hybrid search over a [`ContextTree`].
//!
//! Every message is indexed twice: into the global collection and into the
//! collection of its owning context. Searches return full [`Message`]s,
//! resolved from the tree by the `message_id` stored with each hit.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use tracing::{debug, warn};

use loom_context::ContextTree;
use loom_core::{ContextId, Message, MessageId};

use crate::config::SemanticIndexConfig;
use crate::errors::{EmbeddingError, Result};
use crate::index::{Document, DocumentMetadata, SearchHit, SearchRequest, SemanticIndex};
use crate::service::HashingEmbeddingService;
use crate::text::message_index_text;
use crate::vector_repo::SqliteSemanticIndex;

/// Document id under which a message is indexed.
pub fn message_document_id(message_id: &MessageId) -> String {
    format!("msg_{message_id}")
}

/// Indexes messages per context and answers layered searches.
///
/// The tree is passed into each search rather than held, so the owner of
/// both decides when the tree changes.
pub struct SemanticIndexAdapter {
    index: Arc<dyn SemanticIndex>,
    config: SemanticIndexConfig,
    context_collections: BTreeMap<ContextId, String>,
}

impl SemanticIndexAdapter {
    /// Adapter over an existing index.
    pub fn new(index: Arc<dyn SemanticIndex>, config: SemanticIndexConfig) -> Self {
        Self {
            index,
            config,
            context_collections: BTreeMap::new(),
        }
    }

    /// Adapter over the `SQLite` reference index with the hashing embedder,
    /// in memory or at `config.database_path`.
    pub fn from_config(config: SemanticIndexConfig) -> Result<Self> {
        let service = Arc::new(HashingEmbeddingService::new(config.embedding_dimensions));
        let index = match &config.database_path {
            Some(path) => SqliteSemanticIndex::open(path, service)?,
            None => SqliteSemanticIndex::in_memory(service)?,
        };
        Ok(Self::new(Arc::new(index), config))
    }

    /// Active configuration.
    pub fn config(&self) -> &SemanticIndexConfig {
        &self.config
    }

    /// Underlying index.
    pub fn index(&self) -> &Arc<dyn SemanticIndex> {
        &self.index
    }

    /// Collection name for a context.
    pub fn collection_name(&self, context_id: &ContextId) -> String {
        format!("{}{context_id}", self.config.context_prefix)
    }

    /// Contexts this adapter has indexed into, with their collections.
    pub fn context_collections(&self) -> impl Iterator<Item = (&ContextId, &str)> {
        self.context_collections
            .iter()
            .map(|(id, name)| (id, name.as_str()))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Indexing
    // ─────────────────────────────────────────────────────────────────────

    /// Index `message` globally and in its context's collection.
    ///
    /// A message without a context only lands in the global collection.
    pub async fn index_message(&mut self, message: &Message) -> Result<()> {
        let document = Document::new(
            message_document_id(&message.id),
            message_index_text(message),
            DocumentMetadata::for_message(message),
        );

        self.index
            .index_document(&self.config.global_collection, document.clone())
            .await?;

        if let Some(context_id) = &message.context_id {
            let collection = self.collection_name(context_id);
            self.index.index_document(&collection, document).await?;
            let _ = self
                .context_collections
                .entry(context_id.clone())
                .or_insert(collection);
        }
        Ok(())
    }

    /// Index every message in `tree`, context by context in creation order.
    /// Returns the number indexed.
    pub async fn index_existing_messages(&mut self, tree: &ContextTree) -> Result<usize> {
        let mut contexts: Vec<_> = tree.contexts().collect();
        contexts.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));

        let mut indexed = 0;
        for context in contexts {
            for message in tree.context_messages(&context.id) {
                self.index_message(&message).await?;
                indexed += 1;
            }
        }
        debug!(indexed, "indexed existing messages");
        Ok(indexed)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Search
    // ─────────────────────────────────────────────────────────────────────

    /// Messages from one context's collection.
    pub async fn search_in_context(
        &self,
        tree: &ContextTree,
        context_id: &ContextId,
        query: &str,
    ) -> Result<Vec<Message>> {
        let request = SearchRequest::new(
            self.collection_name(context_id),
            query,
            self.config.max_retrieved,
        );
        let hits = self.index.search(&request).await?;
        Ok(self.resolve_hits(tree, hits))
    }

    /// Messages from the global collection.
    pub async fn search_across_contexts(
        &self,
        tree: &ContextTree,
        query: &str,
    ) -> Result<Vec<Message>> {
        let request = SearchRequest::new(
            self.config.global_collection.clone(),
            query,
            self.config.max_retrieved,
        );
        let hits = self.index.search(&request).await?;
        Ok(self.resolve_hits(tree, hits))
    }

    /// Parent, then siblings, then direct children of `context_id`.
    pub fn related_contexts(&self, tree: &ContextTree, context_id: &ContextId) -> Vec<ContextId> {
        let Some(context) = tree.get_context(context_id) else {
            return Vec::new();
        };

        let mut related = Vec::new();
        if let Some(parent_id) = &context.parent_id {
            related.push(parent_id.clone());
            related.extend(
                tree.context_branches(parent_id)
                    .into_iter()
                    .filter(|sibling| &sibling.id != context_id)
                    .map(|sibling| sibling.id.clone()),
            );
        }
        related.extend(
            tree.context_branches(context_id)
                .into_iter()
                .map(|child| child.id.clone()),
        );
        related
    }

    /// Search the related contexts of `context_id`, at most
    /// `max_contexts_per_query` of them.
    ///
    /// Failed searches are logged and skipped. The result is capped at half
    /// the retrieval cap.
    pub async fn search_related_contexts(
        &self,
        tree: &ContextTree,
        context_id: &ContextId,
        query: &str,
    ) -> Vec<Message> {
        if !self.config.enable_cross_search {
            return Vec::new();
        }

        let mut messages = Vec::new();
        let related = self
            .related_contexts(tree, context_id)
            .into_iter()
            .filter(|id| id != context_id)
            .take(self.config.max_contexts_per_query);

        for related_id in related {
            match self.search_in_context(tree, &related_id, query).await {
                Ok(found) => messages.extend(found),
                Err(e) => {
                    warn!(context_id = %related_id, error = %e, "related context search failed, skipping");
                }
            }
        }

        messages.truncate(self.config.related_cap());
        messages
    }

    /// The message `context_id` branched from, preceded by its parent
    /// message when there is one. Empty for the root.
    pub fn branch_point_messages(&self, tree: &ContextTree, context_id: &ContextId) -> Vec<Message> {
        let Some(branch_msg) = tree
            .get_context(context_id)
            .and_then(|c| c.branch_point.as_ref())
            .and_then(|id| tree.get_message(id))
        else {
            return Vec::new();
        };

        let mut messages = Vec::with_capacity(2);
        if let Some(parent) = branch_msg
            .parent_id
            .as_ref()
            .and_then(|id| tree.get_message(id))
        {
            messages.push(parent.clone());
        }
        messages.push(branch_msg.clone());
        messages
    }

    /// Layered search for `context_id`:
    ///
    /// 1. the context's own collection (a failure counts as no hits);
    /// 2. related contexts, when step 1 found fewer than half the cap;
    /// 3. branch-point messages, always, placed first.
    ///
    /// Deduplicated by message id (first occurrence wins) and capped at
    /// `max_retrieved`.
    pub async fn hybrid_search(
        &self,
        tree: &ContextTree,
        context_id: &ContextId,
        query: &str,
    ) -> Vec<Message> {
        let mut found = match self.search_in_context(tree, context_id, query).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!(context_id = %context_id, error = %e, "context search failed, continuing");
                Vec::new()
            }
        };

        if found.len() < self.config.related_cap() {
            found.extend(self.search_related_contexts(tree, context_id, query).await);
        }

        let mut seen = HashSet::new();
        let mut unique = Vec::new();
        for message in self
            .branch_point_messages(tree, context_id)
            .into_iter()
            .chain(found)
        {
            if unique.len() >= self.config.max_retrieved {
                break;
            }
            if seen.insert(message.id.clone()) {
                unique.push(message);
            }
        }

        debug!(context_id = %context_id, results = unique.len(), "hybrid search");
        unique
    }

    fn resolve_hits(&self, tree: &ContextTree, hits: Vec<SearchHit>) -> Vec<Message> {
        hits.into_iter()
            .filter(|hit| hit.score >= self.config.score_threshold)
            .filter_map(|hit| hit.metadata.message_id)
            .filter_map(|id| tree.get_message(&id).cloned())
            .collect()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Maintenance
    // ─────────────────────────────────────────────────────────────────────

    /// Empty one context's collection.
    pub async fn clear_context(&self, context_id: &ContextId) -> Result<()> {
        self.index
            .clear_collection(&self.collection_name(context_id))
            .await
    }

    /// Empty the global collection and every known context collection.
    ///
    /// A failure on the global collection is returned; failures on context
    /// collections are logged and skipped.
    pub async fn clear_all_contexts(&self) -> Result<()> {
        self.index
            .clear_collection(&self.config.global_collection)
            .await?;

        for (context_id, collection) in &self.context_collections {
            if let Err(e) = self.index.clear_collection(collection).await {
                warn!(context_id = %context_id, collection = %collection, error = %e, "failed to clear context collection");
            }
        }
        Ok(())
    }

    /// Drop a context's collection and forget it. Missing collections are
    /// not an error.
    pub async fn delete_context_collection(&mut self, context_id: &ContextId) -> Result<()> {
        let collection = self.collection_name(context_id);
        match self.index.delete_collection(&collection).await {
            Ok(()) | Err(EmbeddingError::CollectionNotFound(_)) => {}
            Err(e) => return Err(e),
        }
        let _ = self.context_collections.remove(context_id);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
