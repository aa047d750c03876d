//! Working buffer plus vector recall, merged into one bounded context.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, warn};

use loom_core::{Conversation, Message, Role};
use loom_embeddings::{
    Document, DocumentKind, DocumentMetadata, SearchHit, SearchRequest, SemanticIndex,
    classify_tool_result, message_index_text, tool_output_text,
};

use crate::assembly::{assemble_context, deduplicate_by_content, score_messages};
use crate::config::HybridMemoryConfig;
use crate::errors::Result;
use crate::vector::VectorMemory;
use crate::working::{WorkingMemory, exchange_messages};

/// Prompt variables exposed by [`HybridMemory`].
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct HybridVariables {
    /// The working buffer as prompt history.
    pub history: String,
    /// Assembled context for the latest user turn, when the buffer ends
    /// with one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hybrid_context: Option<String>,
}

/// Recent turns and semantic recall over a single linear conversation.
pub struct HybridMemory {
    working: WorkingMemory,
    vector: VectorMemory,
    index: Arc<dyn SemanticIndex>,
    config: HybridMemoryConfig,
}

impl HybridMemory {
    /// Empty memory over `index`.
    pub fn new(index: Arc<dyn SemanticIndex>, config: HybridMemoryConfig) -> Self {
        Self {
            working: WorkingMemory::new(config.working_memory_size),
            vector: VectorMemory::new(index.clone(), config.vector.clone()),
            index,
            config,
        }
    }

    /// Memory seeded with every message of `conversation`.
    pub async fn with_conversation(
        index: Arc<dyn SemanticIndex>,
        config: HybridMemoryConfig,
        conversation: &Conversation,
    ) -> Result<Self> {
        let mut memory = Self::new(index, config);
        for message in &conversation.messages {
            memory.add_message(message.clone()).await?;
        }
        Ok(memory)
    }

    /// Record `message` in the working buffer and the vector store.
    ///
    /// Tool results are also indexed into the tools collection when tool
    /// indexing is on. A failure there is logged and does not fail the call.
    pub async fn add_message(&mut self, message: Message) -> Result<()> {
        self.working.add(message.clone());
        self.vector.add_message(message.clone()).await?;

        if self.config.enable_tool_indexing && message.role == Role::Tool {
            if let Err(e) = self.index_tool_output(&message).await {
                warn!(
                    message_id = %message.id,
                    tool = message.tool_name.as_deref().unwrap_or_default(),
                    error = %e,
                    "tool output indexing failed"
                );
            }
        }
        Ok(())
    }

    async fn index_tool_output(&self, message: &Message) -> Result<()> {
        let tool_name = message.tool_name.as_deref().unwrap_or("unknown");
        let metadata = DocumentMetadata {
            message_id: Some(message.id.clone()),
            context_id: message.context_id.clone(),
            timestamp: Some(message.timestamp.timestamp()),
            tool_name: Some(tool_name.to_owned()),
            kind: Some(DocumentKind::ToolOutput),
            ..DocumentMetadata::default()
        }
        .with_extra("result_type", classify_tool_result(&message.content))
        .with_extra("content_type", "tool_result")
        .with_extra("indexed_at", Utc::now().to_rfc3339());

        let document = Document::new(
            format!("tool_{tool_name}_{}", message.id),
            tool_output_text(tool_name, &message.content),
            metadata,
        );
        self.index
            .index_document(&self.config.tools_collection, document)
            .await?;
        debug!(message_id = %message.id, tool = tool_name, "indexed tool output");
        Ok(())
    }

    /// Record an exchange through [`add_message`](Self::add_message).
    pub async fn save_context(&mut self, input: &str, output: &str) -> Result<()> {
        for message in exchange_messages(input, output) {
            self.add_message(message).await?;
        }
        Ok(())
    }

    /// Ranked, budget-bounded context for `query`.
    ///
    /// Working messages and vector hits are scored together. Hits already
    /// in the buffer, by id or by content within the deduplication window,
    /// are dropped. A failed vector search leaves only the working buffer.
    pub async fn hybrid_context(&self, query: &str) -> Vec<Message> {
        let recent = self.working.messages();
        let relevant = match self.vector.relevant_messages(query).await {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "vector recall failed, using working memory only");
                Vec::new()
            }
        };

        let in_buffer: HashSet<_> = recent.iter().map(|m| &m.id).collect();
        let relevant: Vec<Message> = relevant
            .into_iter()
            .filter(|m| !in_buffer.contains(&m.id))
            .collect();
        let relevant = deduplicate_by_content(recent, relevant, self.config.deduplication_window);

        let scored = score_messages(recent, &relevant, query, self.config.weights);
        let context = assemble_context(
            &scored,
            self.config.max_context_tokens,
            self.config.chronological,
        );
        debug!(
            recent = recent.len(),
            relevant = relevant.len(),
            assembled = context.len(),
            "assembled hybrid context"
        );
        context
    }

    /// [`hybrid_context`](Self::hybrid_context) as role-prefixed lines.
    pub async fn hybrid_context_text(&self, query: &str) -> String {
        self.hybrid_context(query)
            .await
            .iter()
            .map(message_index_text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Indexed tool outputs similar to `query`. Empty when tool indexing is
    /// off.
    pub async fn relevant_tool_outputs(&self, query: &str, max: usize) -> Result<Vec<SearchHit>> {
        if !self.config.enable_tool_indexing {
            return Ok(Vec::new());
        }
        let request = SearchRequest::new(&self.config.tools_collection, query, max)
            .with_filter("content_type", "tool_result");
        Ok(self.index.search(&request).await?)
    }

    /// History text and, when the buffer ends with a user turn, the hybrid
    /// context for it.
    pub async fn memory_variables(&self) -> HybridVariables {
        let hybrid_context = match self.working.messages().last() {
            Some(last) if last.role == Role::User => {
                Some(self.hybrid_context_text(&last.content).await)
            }
            _ => None,
        };
        HybridVariables {
            history: self.working.history(),
            hybrid_context,
        }
    }

    /// Empty the buffer, the vector store, and the tools collection.
    pub async fn clear(&mut self) -> Result<()> {
        self.working.clear();
        self.vector.clear().await?;
        if self.config.enable_tool_indexing {
            self.index
                .clear_collection(&self.config.tools_collection)
                .await?;
        }
        Ok(())
    }

    /// Working buffer.
    pub fn working(&self) -> &WorkingMemory {
        &self.working
    }

    /// Vector store.
    pub fn vector(&self) -> &VectorMemory {
        &self.vector
    }

    /// Active configuration.
    pub fn config(&self) -> &HybridMemoryConfig {
        &self.config
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use loom_embeddings::{EmbeddingError, HashingEmbeddingService, SqliteSemanticIndex};
    use serde_json::json;
    use tracing::Level;

    /// Real index that rejects writes or searches on one collection.
    struct BrokenCollection {
        inner: SqliteSemanticIndex,
        broken: &'static str,
    }

    impl BrokenCollection {
        fn check(&self, collection: &str) -> loom_embeddings::Result<()> {
            if collection == self.broken {
                return Err(EmbeddingError::Storage(format!("{collection} unavailable")));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl SemanticIndex for BrokenCollection {
        async fn index_document(
            &self,
            collection: &str,
            document: Document,
        ) -> loom_embeddings::Result<()> {
            self.check(collection)?;
            self.inner.index_document(collection, document).await
        }
        async fn search(&self, request: &SearchRequest) -> loom_embeddings::Result<Vec<SearchHit>> {
            self.check(&request.collection)?;
            self.inner.search(request).await
        }
        async fn clear_collection(&self, collection: &str) -> loom_embeddings::Result<()> {
            self.inner.clear_collection(collection).await
        }
        async fn delete_collection(&self, collection: &str) -> loom_embeddings::Result<()> {
            self.inner.delete_collection(collection).await
        }
        async fn list_collections(&self) -> loom_embeddings::Result<Vec<String>> {
            self.inner.list_collections().await
        }
        async fn count(&self, collection: &str) -> loom_embeddings::Result<usize> {
            self.inner.count(collection).await
        }
    }

    fn sqlite() -> SqliteSemanticIndex {
        SqliteSemanticIndex::in_memory(Arc::new(HashingEmbeddingService::new(256))).unwrap()
    }

    fn index() -> Arc<dyn SemanticIndex> {
        Arc::new(sqlite())
    }

    fn broken(collection: &'static str) -> Arc<dyn SemanticIndex> {
        Arc::new(BrokenCollection {
            inner: sqlite(),
            broken: collection,
        })
    }

    fn config() -> HybridMemoryConfig {
        let mut config = HybridMemoryConfig {
            working_memory_size: 2,
            ..HybridMemoryConfig::default()
        };
        config.vector.collection = "history".to_owned();
        config.vector.score_threshold = 0.3;
        config
    }

    async fn memory_with(index: Arc<dyn SemanticIndex>, config: HybridMemoryConfig) -> HybridMemory {
        let conversation = Conversation::new("m")
            .add_message(Message::user("rust ownership rules"))
            .add_message(Message::assistant("bread baking needs patience"))
            .add_message(Message::user("rust borrow checker errors"))
            .add_message(Message::assistant("sourdough starter feeding schedule"));
        HybridMemory::with_conversation(index, config, &conversation)
            .await
            .unwrap()
    }

    fn contents(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(|m| m.content.as_str()).collect()
    }

    #[tokio::test]
    async fn seeded_memory_splits_buffer_and_store() {
        let memory = memory_with(index(), config()).await;
        assert_eq!(
            contents(memory.working().messages()),
            ["rust borrow checker errors", "sourdough starter feeding schedule"]
        );
        assert_eq!(memory.vector().messages().len(), 4);
    }

    #[tokio::test]
    async fn hybrid_context_merges_recall_with_buffer() {
        let memory = memory_with(index(), config()).await;
        let context = memory.hybrid_context("rust").await;
        // buffer match 0.86, recalled 0.69, buffer non-match 0.51
        assert_eq!(
            contents(&context),
            [
                "rust borrow checker errors",
                "rust ownership rules",
                "sourdough starter feeding schedule",
            ]
        );
    }

    #[tokio::test]
    async fn hybrid_context_respects_budget() {
        let config = HybridMemoryConfig {
            max_context_tokens: 6,
            ..config()
        };
        let memory = memory_with(index(), config).await;
        let context = memory.hybrid_context("rust").await;
        assert_eq!(contents(&context), ["rust borrow checker errors"]);
    }

    #[tokio::test]
    async fn recalled_duplicates_of_buffer_are_dropped() {
        let mut memory = HybridMemory::new(index(), config());
        memory.add_message(Message::user("rust ownership rules")).await.unwrap();
        memory
            .add_message(Message::assistant("bread baking needs patience"))
            .await
            .unwrap();
        let repeat = Message::user("rust ownership rules");
        memory.add_message(repeat.clone()).await.unwrap();

        let context = memory.hybrid_context("rust ownership").await;
        assert_eq!(context.len(), 2);
        assert_eq!(context[0].id, repeat.id);
        assert_eq!(context[1].content, "bread baking needs patience");
    }

    #[tokio::test]
    async fn failed_recall_falls_back_to_buffer() {
        let (logs, _guard) = loom_core::logging::capture_logs();
        let mut memory = HybridMemory::new(broken("history"), config());
        for message in [
            Message::user("rust ownership rules"),
            Message::assistant("bread baking needs patience"),
        ] {
            memory.working.add(message);
        }
        let context = memory.hybrid_context("rust").await;
        assert_eq!(
            contents(&context),
            ["rust ownership rules", "bread baking needs patience"]
        );
        assert!(logs.has_event(Level::WARN, "vector recall failed"));
    }

    #[tokio::test]
    async fn context_text_is_role_prefixed() {
        let memory = memory_with(index(), config()).await;
        let text = memory.hybrid_context_text("rust").await;
        assert!(text.starts_with("User: rust borrow checker errors\nUser: rust ownership rules\n"));
        assert!(text.ends_with("Assistant: sourdough starter feeding schedule"));
    }

    #[tokio::test]
    async fn tool_outputs_are_indexed_and_classified() {
        let index = index();
        let mut memory = HybridMemory::new(index.clone(), config());
        let build = Message::tool_result("cargo", "build completed successfully");
        memory.add_message(build.clone()).await.unwrap();
        memory
            .add_message(Message::tool_result("pytest", "3 tests failed"))
            .await
            .unwrap();
        assert_eq!(index.count("tools").await.unwrap(), 2);

        let hits = memory.relevant_tool_outputs("cargo build", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        let hit = &hits[0];
        assert_eq!(hit.id, format!("tool_cargo_{}", build.id));
        assert_eq!(hit.text, "Tool: cargo\nOutput: build completed successfully");
        assert_eq!(hit.metadata.kind, Some(DocumentKind::ToolOutput));
        assert_eq!(hit.metadata.tool_name.as_deref(), Some("cargo"));
        assert_eq!(hit.metadata.message_id, Some(build.id.clone()));
        assert_eq!(hit.metadata.extra.get("result_type"), Some(&json!("success")));
        assert!(hit.metadata.extra.contains_key("indexed_at"));

        let all = memory.relevant_tool_outputs("cargo build", 5).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].metadata.extra.get("result_type"), Some(&json!("error")));
    }

    #[tokio::test]
    async fn tool_indexing_disabled() {
        let index = index();
        let config = HybridMemoryConfig {
            enable_tool_indexing: false,
            ..config()
        };
        let mut memory = HybridMemory::new(index.clone(), config);
        memory
            .add_message(Message::tool_result("cargo", "ok"))
            .await
            .unwrap();
        assert_matches!(
            index.count("tools").await,
            Err(EmbeddingError::CollectionNotFound(_))
        );
        assert!(memory.relevant_tool_outputs("cargo", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn tool_indexing_failure_is_logged_not_returned() {
        let (logs, _guard) = loom_core::logging::capture_logs();
        let mut memory = HybridMemory::new(broken("tools"), config());
        memory
            .add_message(Message::tool_result("cargo", "build completed"))
            .await
            .unwrap();
        assert_eq!(memory.working().len(), 1);
        assert_eq!(memory.vector().messages().len(), 1);
        assert!(logs.has_event(Level::WARN, "tool output indexing failed"));
    }

    #[tokio::test]
    async fn memory_variables_follow_last_turn() {
        let mut memory = HybridMemory::new(index(), config());
        memory.save_context("rust ownership rules", "").await.unwrap();
        let vars = memory.memory_variables().await;
        assert_eq!(vars.history, "Human: rust ownership rules");
        assert_eq!(
            vars.hybrid_context.as_deref(),
            Some("User: rust ownership rules")
        );

        memory.save_context("", "moves transfer ownership").await.unwrap();
        let vars = memory.memory_variables().await;
        assert_eq!(
            vars.history,
            "Human: rust ownership rules\nAI: moves transfer ownership"
        );
        assert!(vars.hybrid_context.is_none());
        let json = serde_json::to_value(&vars).unwrap();
        assert!(json.get("hybrid_context").is_none());
    }

    #[tokio::test]
    async fn clear_empties_every_store() {
        let index = index();
        let mut memory = memory_with(index.clone(), config()).await;
        memory
            .add_message(Message::tool_result("cargo", "ok"))
            .await
            .unwrap();
        memory.clear().await.unwrap();
        assert!(memory.working().is_empty());
        assert!(memory.vector().messages().is_empty());
        assert_eq!(index.count("history").await.unwrap(), 0);
        assert_eq!(index.count("tools").await.unwrap(), 0);
        assert!(memory.hybrid_context("rust").await.is_empty());
    }
}
