//! # loom-llm
//!
//! Everything between the model transport and a finished [`Message`]:
//!
//! - [`Fragment`]: one incremental piece of a streamed reply
//! - [`MessageAccumulator`]: thread-safe per-stream fold of fragments
//! - [`consume_stream`]: the consumer loop with cancellation and guaranteed cleanup
//! - [`thinking`]: splitting `<think>` reasoning from the visible answer
//! - [`LanguageModel`]: the transport boundary trait
//!
//! [`Message`]: loom_core::Message

#![deny(unsafe_code)]

pub mod accumulator;
pub mod consume;
pub mod errors;
pub mod fragment;
pub mod thinking;
pub mod transport;

pub use accumulator::{AccumulatingMessage, MessageAccumulator, StreamStats, sanitize_stream_content};
pub use consume::{consume_stream, stream_reply};
pub use errors::{Result, StreamError};
pub use fragment::Fragment;
pub use thinking::{
    ParsedThinking, effective_content, extract_response_content, parse_message_with_thinking,
    parse_thinking, remove_thinking_blocks, update_message_with_thinking,
};
pub use transport::{ChatRequest, FragmentStream, LanguageModel};
