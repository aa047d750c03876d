//! # Model transport boundary
//!
//! [`LanguageModel`] is the seam to whatever talks to the model. The memory
//! layer only needs two things from it: a complete reply, or an ordered
//! stream of [`Fragment`]s for one stream id.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use loom_core::{Conversation, Message};

use crate::errors::Result;
use crate::fragment::Fragment;

/// Boxed fragment stream returned by [`LanguageModel::stream`].
pub type FragmentStream = Pin<Box<dyn Stream<Item = Fragment> + Send>>;

/// Request sent to the model.
#[derive(Clone, Debug, PartialEq)]
pub struct ChatRequest {
    /// Model identifier.
    pub model: String,
    /// Role-tagged messages in order.
    pub messages: Vec<Message>,
    /// Ask for incremental delivery.
    pub stream: bool,
}

impl ChatRequest {
    /// Request for a one-shot reply.
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: false,
        }
    }

    /// Request built from a conversation plus a new user turn.
    pub fn from_conversation(conversation: &Conversation, user_message: &str) -> Self {
        let conversation = conversation.add_message(Message::user(user_message));
        Self::new(conversation.model, conversation.messages)
    }

    /// Switch to incremental delivery.
    #[must_use]
    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }
}

/// Language-model transport.
///
/// Transport failures inside a stream arrive as fragments carrying an
/// error; the stream ends after a terminal fragment.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Model identifier.
    fn model(&self) -> &str;

    /// One complete reply.
    async fn chat(&self, request: &ChatRequest) -> Result<Message>;

    /// Incremental reply.
    async fn stream(&self, request: &ChatRequest) -> Result<FragmentStream>;
}
