//! # loom-core
//!
//! Foundation types for the Loom conversation memory workspace.
//!
//! Every other Loom crate depends on the vocabulary defined here:
//!
//! - **Branded IDs**: `MessageId`, `ContextId`, `StreamId` as newtypes for type safety
//! - **Messages**: [`Message`] with a closed [`Role`] set and typed [`MessageMetadata`]
//! - **Conversations**: [`Conversation`] value type with pure, non-mutating helpers
//! - **Logging**: `tracing` subscriber bootstrap and a capture layer for tests

#![deny(unsafe_code)]

pub mod conversation;
pub mod ids;
pub mod logging;
pub mod messages;

pub use conversation::Conversation;
pub use logging::LogFormat;
pub use ids::{ContextId, MessageId, StreamId};
pub use messages::{
    Message, MessageMetadata, MessageSource, Role, ThinkingBlock, TokenUsage, ToolCall,
    ToolFunction,
};
