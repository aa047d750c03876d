//! Branch-aware memory over a [`ContextTree`].
//!
//! The tree is the source of truth for what was said where. Every message
//! added here lands in the active context, gets indexed globally and per
//! context, and enters a small session buffer. Retrieval combines the
//! root-to-active conversation path with the adapter's layered search.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use loom_context::{Context, ContextTree};
use loom_core::{ContextId, Conversation, Message, MessageId};
use loom_embeddings::SemanticIndexAdapter;

use crate::assembly::{assemble_context, merge_unique, score_messages};
use crate::config::GraphMemoryConfig;
use crate::errors::Result;
use crate::working::{WorkingMemory, exchange_messages, format_history};

/// Summary of the active context.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ContextInfo {
    /// Context id.
    pub context_id: ContextId,
    /// Display title.
    pub context_title: String,
    /// Message the context diverged from. `None` for the root.
    pub branch_point: Option<MessageId>,
    /// Creation time.
    pub created: DateTime<Utc>,
    /// Messages in the context itself.
    pub message_count: usize,
}

/// A branch the active context can switch into.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BranchInfo {
    /// Context id.
    pub id: ContextId,
    /// Display title.
    pub title: String,
    /// Creation time.
    pub created: DateTime<Utc>,
}

/// Prompt variables exposed by [`GraphAwareMemory`].
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct GraphMemoryVariables {
    /// The conversation path as prompt history. `None` when empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<String>,
    /// The active context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_info: Option<ContextInfo>,
    /// Direct branches of the active context.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub available_branches: Vec<BranchInfo>,
}

/// Memory that follows the branching structure of a conversation.
pub struct GraphAwareMemory {
    tree: ContextTree,
    adapter: SemanticIndexAdapter,
    buffer: WorkingMemory,
    config: GraphMemoryConfig,
}

impl GraphAwareMemory {
    /// Memory over a fresh tree.
    pub fn new(adapter: SemanticIndexAdapter, config: GraphMemoryConfig) -> Self {
        Self {
            tree: ContextTree::new().with_path_truncation(config.path_truncation),
            adapter,
            buffer: WorkingMemory::new(config.buffer_size),
            config,
        }
    }

    /// Memory over an existing tree. Every message in it is indexed and the
    /// buffer is seeded from the active context.
    pub async fn with_tree(
        mut tree: ContextTree,
        mut adapter: SemanticIndexAdapter,
        config: GraphMemoryConfig,
    ) -> Result<Self> {
        tree.set_path_truncation(config.path_truncation);
        let _ = adapter.index_existing_messages(&tree).await?;

        let seed = Conversation {
            model: String::new(),
            messages: tree.context_messages(tree.active_context_id()),
        };
        Ok(Self {
            buffer: WorkingMemory::with_conversation(config.buffer_size, seed),
            tree,
            adapter,
            config,
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Writing
    // ─────────────────────────────────────────────────────────────────────

    /// Append `message` to the active context, index it, and buffer it.
    /// Returns the stored message with its context and parent set.
    pub async fn add_message(&mut self, message: Message) -> Result<Message> {
        let active = self.tree.active_context_id().clone();
        let stored = self.tree.add_message(message, &active)?;
        self.adapter.index_message(&stored).await?;
        self.buffer.add(stored.clone());
        Ok(stored)
    }

    /// Record an exchange through [`add_message`](Self::add_message).
    pub async fn save_context(&mut self, input: &str, output: &str) -> Result<Vec<Message>> {
        let mut stored = Vec::with_capacity(2);
        for message in exchange_messages(input, output) {
            stored.push(self.add_message(message).await?);
        }
        Ok(stored)
    }

    /// Make `context_id` the active context.
    pub fn switch_context(&mut self, context_id: &ContextId) -> Result<()> {
        self.tree.switch_context(context_id)?;
        debug!(context_id = %context_id, "switched context");
        Ok(())
    }

    /// Open a branch diverging from `message_id`. The active context does
    /// not change.
    ///
    /// The source message is re-indexed so its branch flags match the tree.
    pub async fn branch_from_message(
        &mut self,
        message_id: &MessageId,
        title: impl Into<String>,
    ) -> Result<Context> {
        let context = self.tree.branch_from_message(message_id, title)?;
        self.reindex_message(message_id).await;
        Ok(context)
    }

    /// Delete a context and its descendants along with their collections.
    /// Returns the deleted ids.
    ///
    /// Once the tree has dropped the contexts, collection cleanup failures
    /// are logged and skipped.
    pub async fn delete_context(&mut self, context_id: &ContextId) -> Result<Vec<ContextId>> {
        let branch_point = self
            .tree
            .get_context(context_id)
            .and_then(|c| c.branch_point.clone());
        let deleted = self.tree.delete_context(context_id)?;

        let gone: HashSet<&ContextId> = deleted.iter().collect();
        self.buffer
            .retain(|m| m.context_id.as_ref().is_none_or(|c| !gone.contains(c)));

        for id in &deleted {
            if let Err(e) = self.adapter.delete_context_collection(id).await {
                warn!(context_id = %id, error = %e, "failed to delete context collection");
            }
        }
        if let Some(message_id) = branch_point {
            self.reindex_message(&message_id).await;
        }
        Ok(deleted)
    }

    async fn reindex_message(&mut self, message_id: &MessageId) {
        let Some(message) = self.tree.get_message(message_id).cloned() else {
            return;
        };
        if let Err(e) = self.adapter.index_message(&message).await {
            warn!(message_id = %message_id, error = %e, "failed to refresh indexed message");
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Retrieval
    // ─────────────────────────────────────────────────────────────────────

    /// Messages relevant to `query` in the active context.
    ///
    /// With `include_path`, the conversation path comes first, followed by
    /// search hits not already on it, capped at `max_retrieved`. If the path
    /// cannot be built the search hits are returned alone.
    pub async fn relevant_messages(&self, query: &str) -> Vec<Message> {
        let active = self.tree.active_context_id();
        let hits = self.adapter.hybrid_search(&self.tree, active, query).await;
        if !self.config.include_path {
            return hits;
        }

        match self.tree.conversation_path(active) {
            Ok(path) => {
                let mut merged = merge_unique(path, hits);
                merged.truncate(self.config.max_retrieved);
                merged
            }
            Err(e) => {
                warn!(context_id = %active, error = %e, "conversation path failed, using search results only");
                hits
            }
        }
    }

    /// Ranked, budget-bounded context for `query`.
    ///
    /// Path messages (or the session buffer, without `include_path`) score
    /// as recent; search hits off the path score as recalled.
    pub async fn build_context(&self, query: &str) -> Vec<Message> {
        let active = self.tree.active_context_id();
        let recent = if self.config.include_path {
            self.tree.conversation_path(active).unwrap_or_else(|e| {
                warn!(context_id = %active, error = %e, "conversation path failed, using session buffer");
                self.buffer.messages().to_vec()
            })
        } else {
            self.buffer.messages().to_vec()
        };

        let recent_ids: HashSet<&MessageId> = recent.iter().map(|m| &m.id).collect();
        let relevant: Vec<Message> = self
            .adapter
            .hybrid_search(&self.tree, active, query)
            .await
            .into_iter()
            .filter(|m| !recent_ids.contains(&m.id))
            .collect();

        let scored = score_messages(&recent, &relevant, query, self.config.weights);
        let context = assemble_context(
            &scored,
            self.config.max_context_tokens,
            self.config.chronological,
        );
        debug!(
            context_id = %active,
            recent = recent.len(),
            relevant = relevant.len(),
            assembled = context.len(),
            "built context"
        );
        context
    }

    /// Messages from the root down to the active context.
    pub fn conversation_path(&self) -> Result<Vec<Message>> {
        Ok(self.tree.conversation_path(self.tree.active_context_id())?)
    }

    /// Messages in the active context itself.
    pub fn current_context_messages(&self) -> Vec<Message> {
        self.tree.context_messages(self.tree.active_context_id())
    }

    /// Direct branches of the active context.
    pub fn context_branches(&self) -> Vec<Context> {
        self.tree
            .context_branches(self.tree.active_context_id())
            .into_iter()
            .cloned()
            .collect()
    }

    /// Messages that follow `message_id` in its context.
    pub fn message_branches(&self, message_id: &MessageId) -> Vec<Message> {
        self.tree
            .message_branches(message_id)
            .into_iter()
            .cloned()
            .collect()
    }

    /// History of the conversation path, the active context, and its
    /// branches.
    pub fn memory_variables(&self) -> Result<GraphMemoryVariables> {
        let path = self.conversation_path()?;
        let history = (!path.is_empty()).then(|| format_history(&path));

        let context_info = self.tree.active_context().map(|context| ContextInfo {
            context_id: context.id.clone(),
            context_title: context.title.clone(),
            branch_point: context.branch_point.clone(),
            created: context.created,
            message_count: context.message_count(),
        });

        let available_branches = self
            .tree
            .context_branches(self.tree.active_context_id())
            .into_iter()
            .map(|branch| BranchInfo {
                id: branch.id.clone(),
                title: branch.title.clone(),
                created: branch.created,
            })
            .collect();

        Ok(GraphMemoryVariables {
            history,
            context_info,
            available_branches,
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Clearing
    // ─────────────────────────────────────────────────────────────────────

    /// Empty the active context in the index and the tree, keeping the
    /// context and its branches. The session buffer is emptied too.
    pub async fn clear(&mut self) -> Result<()> {
        let active = self.tree.active_context_id().clone();
        self.adapter.clear_context(&active).await?;
        let removed = self.tree.clear_context_messages(&active)?;
        self.buffer.clear();
        debug!(context_id = %active, removed = removed.len(), "cleared active context");
        Ok(())
    }

    /// Empty every collection and start over with a fresh tree.
    pub async fn clear_all(&mut self) -> Result<()> {
        self.adapter.clear_all_contexts().await?;
        self.tree = ContextTree::new().with_path_truncation(self.config.path_truncation);
        self.buffer.clear();
        debug!("cleared all contexts");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────

    /// The conversation tree.
    pub fn tree(&self) -> &ContextTree {
        &self.tree
    }

    /// The index adapter.
    pub fn adapter(&self) -> &SemanticIndexAdapter {
        &self.adapter
    }

    /// The session buffer.
    pub fn buffer(&self) -> &WorkingMemory {
        &self.buffer
    }

    /// The active context.
    pub fn current_context(&self) -> Option<&Context> {
        self.tree.active_context()
    }

    /// Active configuration.
    pub fn config(&self) -> &GraphMemoryConfig {
        &self.config
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
