//! The branching conversation graph.
//!
//! A [`ContextTree`] owns every [`Context`] and [`Message`]. Contexts are
//! linear branches; a new context diverges from a message in its parent
//! context. Exactly one context is the root (never deletable) and exactly
//! one is active.
//!
//! All mutation goes through `&mut self`, so each operation is atomic with
//! respect to readers of the same tree.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use loom_core::{ContextId, Message, MessageId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::adjacency::{BranchIndex, MessageChain};
use crate::errors::{ContextError, Result};
use crate::path::PathTruncation;

/// Title given to the root context.
pub const ROOT_CONTEXT_TITLE: &str = "Main Conversation";

/// One linear branch of conversation history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    /// Unique identity.
    pub id: ContextId,
    /// Context this one branched from. `None` for the root.
    pub parent_id: Option<ContextId>,
    /// Message in the parent context this branch diverged from.
    pub branch_point: Option<MessageId>,
    /// Display title.
    pub title: String,
    /// Creation time.
    pub created: DateTime<Utc>,
    /// Messages in order. Append-only.
    pub message_ids: Vec<MessageId>,
    /// Currently active.
    pub is_active: bool,
}

impl Context {
    fn new(parent_id: Option<ContextId>, branch_point: Option<MessageId>, title: String) -> Self {
        Self {
            id: ContextId::new(),
            parent_id,
            branch_point,
            title,
            created: Utc::now(),
            message_ids: Vec::new(),
            is_active: false,
        }
    }

    /// This is a root context.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Number of messages.
    pub fn message_count(&self) -> usize {
        self.message_ids.len()
    }

    /// ID of the last message.
    pub fn last_message_id(&self) -> Option<&MessageId> {
        self.message_ids.last()
    }
}

/// All contexts and messages plus their relationships.
#[derive(Clone, Debug)]
pub struct ContextTree {
    root_context_id: ContextId,
    active_context_id: ContextId,
    contexts: HashMap<ContextId, Context>,
    messages: HashMap<MessageId, Message>,
    message_chain: MessageChain,
    branches: BranchIndex,
    path_truncation: PathTruncation,
}

impl Default for ContextTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextTree {
    /// Tree holding only an empty, active root context.
    pub fn new() -> Self {
        let mut root = Context::new(None, None, ROOT_CONTEXT_TITLE.to_owned());
        root.is_active = true;
        let root_id = root.id.clone();

        Self {
            root_context_id: root_id.clone(),
            active_context_id: root_id.clone(),
            contexts: HashMap::from([(root_id, root)]),
            messages: HashMap::new(),
            message_chain: MessageChain::new(),
            branches: BranchIndex::new(),
            path_truncation: PathTruncation::default(),
        }
    }

    /// Use `truncation` for [`conversation_path`](Self::conversation_path).
    #[must_use]
    pub fn with_path_truncation(mut self, truncation: PathTruncation) -> Self {
        self.path_truncation = truncation;
        self
    }

    /// Change the path truncation mode.
    pub fn set_path_truncation(&mut self, truncation: PathTruncation) {
        self.path_truncation = truncation;
    }

    /// Current path truncation mode.
    pub fn path_truncation(&self) -> PathTruncation {
        self.path_truncation
    }

    // ── Mutation ────────────────────────────────────────────────────────

    /// Append `message` to `context_id` and return the stored copy.
    ///
    /// Sets the message's context, links it to the context's previous last
    /// message (if any) and fixes its depth to the prior message count.
    /// A message already in the tree is rejected.
    pub fn add_message(&mut self, mut message: Message, context_id: &ContextId) -> Result<Message> {
        if self.messages.contains_key(&message.id) {
            return Err(ContextError::InvalidOperation(format!(
                "message {} is already stored",
                message.id
            )));
        }
        let context = self
            .contexts
            .get_mut(context_id)
            .ok_or_else(|| ContextError::ContextNotFound(context_id.clone()))?;

        message.context_id = Some(context_id.clone());
        if let Some(last) = context.message_ids.last() {
            message.parent_id = Some(last.clone());
            self.message_chain.link(last.clone(), message.id.clone());
        }
        message.metadata.depth = context.message_ids.len();

        context.message_ids.push(message.id.clone());
        let _ = self.messages.insert(message.id.clone(), message.clone());
        Ok(message)
    }

    /// Open a new, empty, inactive context diverging from `message_id`.
    ///
    /// The source message is flagged as a branch point and its child count
    /// goes up by one.
    pub fn branch_from_message(
        &mut self,
        message_id: &MessageId,
        title: impl Into<String>,
    ) -> Result<Context> {
        let source = self
            .messages
            .get_mut(message_id)
            .ok_or_else(|| ContextError::MessageNotFound(message_id.clone()))?;
        let parent_context = source.context_id.clone().ok_or_else(|| {
            ContextError::InvalidOperation(format!("message {message_id} has no context"))
        })?;

        source.metadata.branch_point = true;
        source.metadata.child_count += 1;

        let context = Context::new(
            Some(parent_context.clone()),
            Some(message_id.clone()),
            title.into(),
        );
        self.branches.link(parent_context, context.id.clone());
        let _ = self.contexts.insert(context.id.clone(), context.clone());

        debug!(context_id = %context.id, branch_point = %message_id, "branched context");
        Ok(context)
    }

    /// Make `context_id` the active context.
    pub fn switch_context(&mut self, context_id: &ContextId) -> Result<()> {
        if !self.contexts.contains_key(context_id) {
            return Err(ContextError::ContextNotFound(context_id.clone()));
        }
        if let Some(current) = self.contexts.get_mut(&self.active_context_id) {
            current.is_active = false;
        }
        if let Some(target) = self.contexts.get_mut(context_id) {
            target.is_active = true;
        }
        self.active_context_id = context_id.clone();
        Ok(())
    }

    /// Remove every message of `context_id` while keeping the context and
    /// its branches. Returns the removed message IDs in order.
    ///
    /// Branches that diverged from a removed message keep their
    /// `branch_point` ID; their paths simply no longer include it.
    pub fn clear_context_messages(&mut self, context_id: &ContextId) -> Result<Vec<MessageId>> {
        let context = self
            .contexts
            .get_mut(context_id)
            .ok_or_else(|| ContextError::ContextNotFound(context_id.clone()))?;
        let removed = std::mem::take(&mut context.message_ids);

        for message_id in &removed {
            let _ = self.messages.remove(message_id);
            self.message_chain.remove(message_id);
        }

        debug!(context_id = %context_id, removed = removed.len(), "cleared context messages");
        Ok(removed)
    }

    /// Delete `context_id`, every context branched from it (recursively),
    /// and all of their messages. Returns the deleted context IDs, the
    /// requested one first.
    ///
    /// If the active context was deleted, the root becomes active. The
    /// branch-point message in the surviving parent loses one child.
    pub fn delete_context(&mut self, context_id: &ContextId) -> Result<Vec<ContextId>> {
        if *context_id == self.root_context_id {
            return Err(ContextError::InvalidOperation(
                "cannot delete root context".to_owned(),
            ));
        }
        let branch_point = self
            .contexts
            .get(context_id)
            .ok_or_else(|| ContextError::ContextNotFound(context_id.clone()))?
            .branch_point
            .clone();

        let doomed = self.subtree(context_id);
        for id in &doomed {
            if let Some(context) = self.contexts.remove(id) {
                for message_id in &context.message_ids {
                    let _ = self.messages.remove(message_id);
                    self.message_chain.remove(message_id);
                }
            }
            self.branches.remove(id);
        }

        if let Some(source_id) = &branch_point {
            if let Some(source) = self.messages.get_mut(source_id) {
                source.metadata.child_count = source.metadata.child_count.saturating_sub(1);
                source.metadata.branch_point = source.metadata.child_count > 0;
            }
        }

        if doomed.contains(&self.active_context_id) {
            let root = self.root_context_id.clone();
            self.switch_context(&root)?;
        }

        debug!(context_id = %context_id, deleted = doomed.len(), "deleted context subtree");
        Ok(doomed)
    }

    /// `context_id` and all its descendants, parents before children.
    fn subtree(&self, context_id: &ContextId) -> Vec<ContextId> {
        let mut out = vec![context_id.clone()];
        let mut next = 0;
        while let Some(id) = out.get(next).cloned() {
            out.extend(self.branches.children(&id).iter().cloned());
            next += 1;
        }
        out
    }

    // ── Read access ─────────────────────────────────────────────────────

    /// Root context ID.
    pub fn root_context_id(&self) -> &ContextId {
        &self.root_context_id
    }

    /// Active context ID.
    pub fn active_context_id(&self) -> &ContextId {
        &self.active_context_id
    }

    /// The active context.
    pub fn active_context(&self) -> Option<&Context> {
        self.contexts.get(&self.active_context_id)
    }

    /// Context by ID.
    pub fn get_context(&self, context_id: &ContextId) -> Option<&Context> {
        self.contexts.get(context_id)
    }

    /// Message by ID.
    pub fn get_message(&self, message_id: &MessageId) -> Option<&Message> {
        self.messages.get(message_id)
    }

    /// Copies of the messages of `context_id` in order. Empty if unknown.
    pub fn context_messages(&self, context_id: &ContextId) -> Vec<Message> {
        self.contexts
            .get(context_id)
            .map(|c| {
                c.message_ids
                    .iter()
                    .filter_map(|id| self.messages.get(id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Contexts branched directly from `context_id`, in creation order.
    pub fn context_branches(&self, context_id: &ContextId) -> Vec<&Context> {
        self.branches
            .children(context_id)
            .iter()
            .filter_map(|id| self.contexts.get(id))
            .collect()
    }

    /// The message following `message_id` in its context, if any.
    pub fn message_branches(&self, message_id: &MessageId) -> Vec<&Message> {
        self.message_chain
            .children(message_id)
            .iter()
            .filter_map(|id| self.messages.get(id))
            .collect()
    }

    /// Contexts branched from the given message.
    pub fn contexts_branched_from(&self, message_id: &MessageId) -> Vec<&Context> {
        let Some(owner) = self.messages.get(message_id).and_then(|m| m.context_id.as_ref()) else {
            return Vec::new();
        };
        self.context_branches(owner)
            .into_iter()
            .filter(|c| c.branch_point.as_ref() == Some(message_id))
            .collect()
    }

    /// Parent context of `context_id`.
    pub fn parent_context(&self, context_id: &ContextId) -> Option<&Context> {
        self.branches
            .parent(context_id)
            .and_then(|id| self.contexts.get(id))
    }

    /// Every context, in no particular order.
    pub fn contexts(&self) -> impl Iterator<Item = &Context> {
        self.contexts.values()
    }

    /// Number of contexts.
    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }

    /// Number of messages across all contexts.
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
