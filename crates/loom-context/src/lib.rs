//! # loom-context
//!
//! The branching conversation history.
//!
//! - [`ContextTree`]: owns contexts and messages, branching, traversal, deletion
//! - [`adjacency`]: separate typed relations for message chains and context branches
//! - [`PathTruncation`]: how much of each ancestor the root-to-context path includes

#![deny(unsafe_code)]

pub mod adjacency;
pub mod errors;
pub mod path;
pub mod tree;

pub use adjacency::{Adjacency, BranchIndex, MessageChain};
pub use errors::{ContextError, Result};
pub use path::PathTruncation;
pub use tree::{Context, ContextTree, ROOT_CONTEXT_TITLE};
