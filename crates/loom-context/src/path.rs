//! Root-to-context conversation path.

use serde::{Deserialize, Serialize};

use loom_core::{ContextId, Message};

use crate::errors::{ContextError, Result};
use crate::tree::{Context, ContextTree};

/// How much of each ancestor context the conversation path includes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathTruncation {
    /// Every context on the chain contributes all of its messages.
    #[default]
    Full,
    /// Each ancestor contributes messages up to and including the message
    /// its child on the chain branched from. The target context contributes
    /// everything.
    AtBranchPoint,
}

impl ContextTree {
    /// Messages from the root down to `context_id`, using the tree's
    /// configured [`PathTruncation`].
    pub fn conversation_path(&self, context_id: &ContextId) -> Result<Vec<Message>> {
        self.conversation_path_with(context_id, self.path_truncation())
    }

    /// Messages from the root down to `context_id` under `truncation`.
    pub fn conversation_path_with(
        &self,
        context_id: &ContextId,
        truncation: PathTruncation,
    ) -> Result<Vec<Message>> {
        let chain = self.context_chain(context_id)?;
        let mut path = Vec::new();

        for (i, context) in chain.iter().enumerate() {
            let cut = match truncation {
                PathTruncation::Full => None,
                PathTruncation::AtBranchPoint => chain
                    .get(i + 1)
                    .and_then(|child| child.branch_point.as_ref()),
            };

            for message_id in &context.message_ids {
                if let Some(message) = self.get_message(message_id) {
                    path.push(message.clone());
                }
                if cut == Some(message_id) {
                    break;
                }
            }
        }

        Ok(path)
    }

    /// Contexts from the root down to `context_id`, inclusive.
    pub fn context_chain(&self, context_id: &ContextId) -> Result<Vec<&Context>> {
        let mut current = self
            .get_context(context_id)
            .ok_or_else(|| ContextError::ContextNotFound(context_id.clone()))?;
        let mut chain = vec![current];

        while let Some(parent_id) = &current.parent_id {
            match self.get_context(parent_id) {
                Some(parent) => {
                    chain.push(parent);
                    current = parent;
                }
                None => break,
            }
        }

        chain.reverse();
        Ok(chain)
    }
}
