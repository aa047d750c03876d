//! Long-term memory over a flat message history.
//!
//! Every message is indexed into one collection with its position in the
//! history, so hits can be mapped back to messages and returned in the
//! order they were said.

use std::sync::Arc;

use tracing::debug;

use loom_core::{Conversation, Message};
use loom_embeddings::{
    Document, DocumentMetadata, SearchRequest, SemanticIndex, message_document_id,
    message_index_text,
};

use crate::config::VectorMemoryConfig;
use crate::errors::Result;
use crate::working::exchange_messages;

/// Full history plus a semantic index over it.
pub struct VectorMemory {
    index: Arc<dyn SemanticIndex>,
    config: VectorMemoryConfig,
    history: Vec<Message>,
}

impl VectorMemory {
    /// Empty memory writing to `config.collection`.
    pub fn new(index: Arc<dyn SemanticIndex>, config: VectorMemoryConfig) -> Self {
        Self {
            index,
            config,
            history: Vec::new(),
        }
    }

    /// Memory holding and indexing every message of `conversation`.
    pub async fn with_conversation(
        index: Arc<dyn SemanticIndex>,
        config: VectorMemoryConfig,
        conversation: &Conversation,
    ) -> Result<Self> {
        let mut memory = Self::new(index, config);
        for message in &conversation.messages {
            memory.add_message(message.clone()).await?;
        }
        Ok(memory)
    }

    /// Append `message` and index it at its position.
    pub async fn add_message(&mut self, message: Message) -> Result<()> {
        let position = self.history.len();
        let document = Document::new(
            message_document_id(&message.id),
            message_index_text(&message),
            DocumentMetadata::for_message(&message).with_position(position),
        );
        self.index
            .index_document(&self.config.collection, document)
            .await?;
        self.history.push(message);
        Ok(())
    }

    /// Record an exchange. Empty sides are skipped.
    pub async fn save_context(&mut self, input: &str, output: &str) -> Result<()> {
        for message in exchange_messages(input, output) {
            self.add_message(message).await?;
        }
        Ok(())
    }

    /// Messages similar to `query` above the score threshold, oldest first.
    pub async fn relevant_messages(&self, query: &str) -> Result<Vec<Message>> {
        let request = SearchRequest::new(&self.config.collection, query, self.config.max_retrieved)
            .with_min_score(self.config.score_threshold);
        let hits = self.index.search(&request).await?;

        let mut positions: Vec<usize> = hits
            .into_iter()
            .filter_map(|hit| hit.metadata.position)
            .filter(|&position| position < self.history.len())
            .collect();
        positions.sort_unstable();
        positions.dedup();

        debug!(query_len = query.len(), hits = positions.len(), "vector memory search");
        Ok(positions
            .into_iter()
            .map(|position| self.history[position].clone())
            .collect())
    }

    /// Relevant messages as `role: content` lines.
    pub async fn relevant_context_text(&self, query: &str) -> Result<String> {
        let messages = self.relevant_messages(query).await?;
        Ok(messages
            .iter()
            .map(|message| format!("{}: {}", message.role.as_str(), message.content))
            .collect::<Vec<_>>()
            .join("\n"))
    }

    /// Forget the history and empty the collection.
    pub async fn clear(&mut self) -> Result<()> {
        self.index.clear_collection(&self.config.collection).await?;
        self.history.clear();
        Ok(())
    }

    /// Every stored message, oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.history
    }

    /// Active configuration.
    pub fn config(&self) -> &VectorMemoryConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_embeddings::{HashingEmbeddingService, SqliteSemanticIndex};

    fn index() -> Arc<dyn SemanticIndex> {
        Arc::new(SqliteSemanticIndex::in_memory(Arc::new(HashingEmbeddingService::new(256))).unwrap())
    }

    fn config(threshold: f32) -> VectorMemoryConfig {
        VectorMemoryConfig {
            collection: "history".to_owned(),
            max_retrieved: 10,
            score_threshold: threshold,
        }
    }

    fn conversation() -> Conversation {
        Conversation::new("m")
            .add_message(Message::user("rust ownership rules"))
            .add_message(Message::assistant("bread baking needs patience"))
            .add_message(Message::user("rust borrow checker errors"))
            .add_message(Message::assistant("sourdough starter feeding schedule"))
    }

    fn contents(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(|m| m.content.as_str()).collect()
    }

    #[tokio::test]
    async fn indexes_every_message_with_position() {
        let index = index();
        let memory = VectorMemory::with_conversation(index.clone(), config(0.3), &conversation())
            .await
            .unwrap();
        assert_eq!(memory.messages().len(), 4);
        assert_eq!(index.count("history").await.unwrap(), 4);

        let hits = index
            .search(&SearchRequest::new("history", "borrow checker", 1))
            .await
            .unwrap();
        assert_eq!(hits[0].metadata.position, Some(2));
    }

    #[tokio::test]
    async fn relevant_messages_in_history_order() {
        let memory = VectorMemory::with_conversation(index(), config(0.3), &conversation())
            .await
            .unwrap();
        let found = memory.relevant_messages("rust").await.unwrap();
        assert_eq!(
            contents(&found),
            ["rust ownership rules", "rust borrow checker errors"]
        );
    }

    #[tokio::test]
    async fn threshold_drops_weak_hits() {
        let memory = VectorMemory::with_conversation(index(), config(0.4), &conversation())
            .await
            .unwrap();
        let found = memory.relevant_messages("rust ownership").await.unwrap();
        assert_eq!(contents(&found), ["rust ownership rules"]);
    }

    #[tokio::test]
    async fn unrelated_query_finds_nothing() {
        let memory = VectorMemory::with_conversation(index(), config(0.3), &conversation())
            .await
            .unwrap();
        assert!(memory.relevant_messages("quantum chromodynamics").await.unwrap().is_empty());
        assert!(memory.relevant_messages("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn context_text_uses_role_names() {
        let memory = VectorMemory::with_conversation(index(), config(0.6), &conversation())
            .await
            .unwrap();
        let text = memory.relevant_context_text("borrow checker").await.unwrap();
        assert_eq!(text, "user: rust borrow checker errors");
    }

    #[tokio::test]
    async fn save_context_and_clear() {
        let index = index();
        let mut memory = VectorMemory::new(index.clone(), config(0.3));
        memory.save_context("rust ownership rules", "").await.unwrap();
        memory
            .save_context("", "bread baking needs patience")
            .await
            .unwrap();
        assert_eq!(memory.messages().len(), 2);
        assert!(memory.messages()[1].is_assistant());

        memory.clear().await.unwrap();
        assert!(memory.messages().is_empty());
        assert_eq!(index.count("history").await.unwrap(), 0);
        assert!(memory.relevant_messages("rust").await.unwrap().is_empty());
    }
}
