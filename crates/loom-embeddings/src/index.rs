//! The semantic index boundary.
//!
//! A [`SemanticIndex`] stores [`Document`]s in named collections and answers
//! ranked similarity queries. How text becomes vectors and where vectors
//! live is the implementation's business; callers only see document ids,
//! scores and [`DocumentMetadata`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use loom_core::{ContextId, Message, MessageId, Role};

use crate::errors::Result;

/// What a document was built from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// A conversation message.
    Message,
    /// The output of a tool invocation.
    ToolOutput,
}

/// Typed metadata carried alongside a document.
///
/// Serializes as one flat JSON object; `extra` entries sit beside the typed
/// keys and are what metadata filters match against along with them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentMetadata {
    /// Source message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,
    /// Context owning the source message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_id: Option<ContextId>,
    /// Role of the source message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// Unix seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    /// Previous message in the source context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<MessageId>,
    /// Position of the source message within its context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<usize>,
    /// Whether a context branches from the source message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_point: Option<bool>,
    /// Contexts branched from the source message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child_count: Option<usize>,
    /// Thread title at the source message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_title: Option<String>,
    /// Tool that produced the source message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Insertion order within a flat history.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    /// Document origin.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<DocumentKind>,
    /// Anything else.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl DocumentMetadata {
    /// Metadata describing `message` and its place in the tree.
    pub fn for_message(message: &Message) -> Self {
        Self {
            message_id: Some(message.id.clone()),
            context_id: message.context_id.clone(),
            role: Some(message.role),
            timestamp: Some(message.timestamp.timestamp()),
            parent_id: message.parent_id.clone(),
            depth: Some(message.metadata.depth),
            branch_point: Some(message.metadata.branch_point),
            child_count: Some(message.metadata.child_count),
            thread_title: message.metadata.thread_title.clone(),
            tool_name: message.tool_name.clone(),
            position: None,
            kind: Some(DocumentKind::Message),
            extra: BTreeMap::new(),
        }
    }

    /// Set the flat-history position.
    #[must_use]
    pub fn with_position(mut self, position: usize) -> Self {
        self.position = Some(position);
        self
    }

    /// Add an untyped entry.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let _ = self.extra.insert(key.into(), value.into());
        self
    }

    /// True when every `filter` entry equals the same key in this metadata.
    pub fn matches(&self, filter: &BTreeMap<String, Value>) -> bool {
        if filter.is_empty() {
            return true;
        }
        let Ok(Value::Object(fields)) = serde_json::to_value(self) else {
            return false;
        };
        filter.iter().all(|(k, v)| fields.get(k) == Some(v))
    }
}

/// A unit of indexed text.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    /// Unique within its collection. Re-indexing an id replaces it.
    pub id: String,
    /// Text that gets embedded.
    pub text: String,
    /// Metadata returned with hits.
    pub metadata: DocumentMetadata,
}

impl Document {
    /// Build a document.
    pub fn new(id: impl Into<String>, text: impl Into<String>, metadata: DocumentMetadata) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata,
        }
    }
}

/// A similarity query against one collection.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchRequest {
    /// Collection to search.
    pub collection: String,
    /// Query text.
    pub query: String,
    /// Maximum hits. Zero means the index default.
    pub limit: usize,
    /// Metadata equality filter.
    pub filter: BTreeMap<String, Value>,
    /// Drop hits scoring below this.
    pub min_score: Option<f32>,
}

impl SearchRequest {
    /// Query `collection` for up to `limit` hits.
    pub fn new(collection: impl Into<String>, query: impl Into<String>, limit: usize) -> Self {
        Self {
            collection: collection.into(),
            query: query.into(),
            limit,
            filter: BTreeMap::new(),
            min_score: None,
        }
    }

    /// Only return documents whose metadata has `key == value`.
    #[must_use]
    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let _ = self.filter.insert(key.into(), value.into());
        self
    }

    /// Only return hits scoring at least `min_score`.
    #[must_use]
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }
}

/// One ranked search result.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchHit {
    /// Document id.
    pub id: String,
    /// Similarity (higher is closer).
    pub score: f32,
    /// Indexed text.
    pub text: String,
    /// Metadata stored with the document.
    pub metadata: DocumentMetadata,
}

/// Collection-oriented similarity index.
#[async_trait]
pub trait SemanticIndex: Send + Sync {
    /// Store `document` in `collection`, creating the collection on first use.
    async fn index_document(&self, collection: &str, document: Document) -> Result<()>;

    /// Store several documents. Stops at the first failure.
    async fn index_documents(&self, collection: &str, documents: Vec<Document>) -> Result<()> {
        for document in documents {
            self.index_document(collection, document).await?;
        }
        Ok(())
    }

    /// Ranked hits, best first. Unknown collections yield no hits.
    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>>;

    /// Remove every document but keep the collection.
    async fn clear_collection(&self, collection: &str) -> Result<()>;

    /// Remove the collection and its documents.
    async fn delete_collection(&self, collection: &str) -> Result<()>;

    /// Known collection names, sorted.
    async fn list_collections(&self) -> Result<Vec<String>>;

    /// Documents in `collection`.
    async fn count(&self, collection: &str) -> Result<usize>;
}
