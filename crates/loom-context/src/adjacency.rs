//! Typed parent/child relations.
//!
//! The tree keeps two independent relations: message-to-previous-message
//! within a context ([`MessageChain`]) and context-to-parent-context
//! branching ([`BranchIndex`]). Each is an [`Adjacency`] over its own key
//! type, so the two can never be confused.

use std::collections::HashMap;
use std::hash::Hash;

use loom_core::{ContextId, MessageId};

/// A parent → ordered children relation with a child → parent reverse map.
#[derive(Clone, Debug)]
pub struct Adjacency<K> {
    children: HashMap<K, Vec<K>>,
    parents: HashMap<K, K>,
}

/// Message adjacency inside a context's linear chain.
pub type MessageChain = Adjacency<MessageId>;

/// Context branching relation.
pub type BranchIndex = Adjacency<ContextId>;

impl<K> Default for Adjacency<K> {
    fn default() -> Self {
        Self {
            children: HashMap::new(),
            parents: HashMap::new(),
        }
    }
}

impl<K: Clone + Eq + Hash> Adjacency<K> {
    /// Empty relation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `child` under `parent`, appended after existing children.
    pub fn link(&mut self, parent: K, child: K) {
        let _ = self.parents.insert(child.clone(), parent.clone());
        self.children.entry(parent).or_default().push(child);
    }

    /// Children of `key` in link order.
    pub fn children(&self, key: &K) -> &[K] {
        self.children.get(key).map_or(&[], Vec::as_slice)
    }

    /// Parent of `key`.
    pub fn parent(&self, key: &K) -> Option<&K> {
        self.parents.get(key)
    }

    /// Drop `key` from both sides of the relation.
    ///
    /// Its own children become parentless.
    pub fn remove(&mut self, key: &K) {
        if let Some(parent) = self.parents.remove(key) {
            if let Some(siblings) = self.children.get_mut(&parent) {
                siblings.retain(|k| k != key);
                if siblings.is_empty() {
                    let _ = self.children.remove(&parent);
                }
            }
        }
        if let Some(children) = self.children.remove(key) {
            for child in &children {
                let _ = self.parents.remove(child);
            }
        }
    }

    /// Number of child → parent links.
    pub fn len(&self) -> usize {
        self.parents.len()
    }

    /// No links.
    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }
}
