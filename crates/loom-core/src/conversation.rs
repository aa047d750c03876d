//! Linear conversation value type.
//!
//! [`Conversation`] is the flat, branch-free view of a dialogue handed to a
//! model call. Every "mutating" helper returns a new value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::messages::{Message, Role};

/// An ordered list of messages bound to a model identifier.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Model the conversation is addressed to.
    pub model: String,
    /// Messages in order.
    pub messages: Vec<Message>,
}

impl Conversation {
    /// Empty conversation.
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: Vec::new(),
        }
    }

    /// Conversation opening with a system prompt. An empty prompt adds nothing.
    #[must_use]
    pub fn with_system(model: impl Into<String>, system_prompt: &str) -> Self {
        let conversation = Self::new(model);
        if system_prompt.is_empty() {
            conversation
        } else {
            conversation.add_message(Message::system(system_prompt))
        }
    }

    /// Copy with `message` appended.
    #[must_use]
    pub fn add_message(&self, message: Message) -> Self {
        let mut messages = Vec::with_capacity(self.messages.len() + 1);
        messages.extend(self.messages.iter().cloned());
        messages.push(message);
        Self {
            model: self.model.clone(),
            messages,
        }
    }

    /// Copy with a different model.
    #[must_use]
    pub fn with_model(&self, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: self.messages.clone(),
        }
    }

    /// Independent copy of the messages.
    pub fn messages(&self) -> Vec<Message> {
        self.messages.clone()
    }

    /// Number of messages.
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// No messages at all.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Most recent message.
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Most recent assistant message.
    pub fn last_assistant_message(&self) -> Option<&Message> {
        self.last_with_role(Role::Assistant)
    }

    /// Most recent user message.
    pub fn last_user_message(&self) -> Option<&Message> {
        self.last_with_role(Role::User)
    }

    fn last_with_role(&self, role: Role) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == role)
    }

    /// All messages with `role`, in order.
    pub fn messages_by_role(&self, role: Role) -> Vec<Message> {
        self.messages
            .iter()
            .filter(|m| m.role == role)
            .cloned()
            .collect()
    }

    /// Messages strictly newer than `after`.
    pub fn messages_after(&self, after: DateTime<Utc>) -> Vec<Message> {
        self.messages
            .iter()
            .filter(|m| m.timestamp > after)
            .cloned()
            .collect()
    }

    /// Messages strictly older than `before`.
    pub fn messages_before(&self, before: DateTime<Utc>) -> Vec<Message> {
        self.messages
            .iter()
            .filter(|m| m.timestamp < before)
            .cloned()
            .collect()
    }

    /// Contains at least one system message.
    pub fn has_system_message(&self) -> bool {
        self.messages.iter().any(Message::is_system)
    }
}
