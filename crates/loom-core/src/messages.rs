//! Message model.
//!
//! A [`Message`] is one turn of conversation. Messages are values: the
//! context tree stores them and hands out clones, and builders such as
//! [`Message::with_source`] return a new message rather than mutating.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::{ContextId, MessageId, StreamId};

/// Longest tool-progress command shown before truncation.
const PROGRESS_COMMAND_MAX: usize = 50;
/// Characters of the command kept when truncating.
const PROGRESS_COMMAND_KEEP: usize = 47;

// ─────────────────────────────────────────────────────────────────────────────
// Role and source
// ─────────────────────────────────────────────────────────────────────────────

/// Who produced a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Human input.
    User,
    /// Model output.
    Assistant,
    /// Instructions that frame the conversation.
    System,
    /// Output of a tool invocation.
    Tool,
    /// Transient progress line for a running tool.
    ToolProgress,
    /// A surfaced failure.
    Error,
}

impl Role {
    /// Wire name of the role.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Tool => "tool",
            Self::ToolProgress => "tool_progress",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle stage a message was produced in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageSource {
    /// Shown by the UI before the backend confirmed it.
    Optimistic,
    /// Partial content from an in-flight stream.
    Streaming,
    /// Completed message.
    #[default]
    Final,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool calls and thinking
// ─────────────────────────────────────────────────────────────────────────────

/// A function the model asked to invoke.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolFunction {
    /// Tool name.
    pub name: String,
    /// Tool arguments (JSON object).
    pub arguments: Map<String, Value>,
}

/// A tool call emitted by the assistant.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// The requested function.
    pub function: ToolFunction,
}

impl ToolCall {
    /// Build a tool call from a name and arguments.
    #[must_use]
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            function: ToolFunction {
                name: name.into(),
                arguments,
            },
        }
    }
}

/// Reasoning split out of an assistant reply.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThinkingBlock {
    /// The reasoning text.
    pub content: String,
    /// Whether the UI should display it.
    pub visible: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Metadata
// ─────────────────────────────────────────────────────────────────────────────

/// Token counts reported by the model for one reply.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    /// Prompt tokens evaluated.
    pub input_tokens: u64,
    /// Tokens generated.
    pub output_tokens: u64,
}

/// Lifecycle and branching information attached to every message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessageMetadata {
    /// Stream the message was assembled from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<StreamId>,
    /// Order within the stream.
    pub chunk_index: usize,
    /// Whether the message is still partial.
    pub is_streaming: bool,
    /// Lifecycle stage.
    pub source: MessageSource,
    /// True once at least one context has branched from this message.
    pub branch_point: bool,
    /// Number of contexts branched from this message.
    pub child_count: usize,
    /// Position within the owning context at insertion time. Never recomputed.
    pub depth: usize,
    /// User-defined name for a thread starting here.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_title: Option<String>,
    /// Why the model stopped, on streamed replies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub done_reason: Option<String>,
    /// Token counts, on streamed replies that reported them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl MessageMetadata {
    /// Metadata with only the source set.
    #[must_use]
    pub fn with_source(source: MessageSource) -> Self {
        Self {
            source,
            ..Self::default()
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Message
// ─────────────────────────────────────────────────────────────────────────────

/// One turn of conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique identity.
    pub id: MessageId,
    /// Previous message in the same context, if any.
    pub parent_id: Option<MessageId>,
    /// Owning context. Set by the context tree on insertion.
    pub context_id: Option<ContextId>,
    /// Who produced the message.
    pub role: Role,
    /// Text content.
    pub content: String,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Tool calls requested by the assistant.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Tool that produced this message (tool and tool-progress roles).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Lifecycle and branching metadata.
    #[serde(default)]
    pub metadata: MessageMetadata,
    /// Reasoning split out of the content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ThinkingBlock>,
}

impl Message {
    /// Build a final message with a fresh ID and the current time.
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            parent_id: None,
            context_id: None,
            role,
            content: content.into(),
            timestamp: Utc::now(),
            tool_calls: Vec::new(),
            tool_name: None,
            metadata: MessageMetadata::default(),
            thinking: None,
        }
    }

    /// User message. Surrounding whitespace is trimmed.
    #[must_use]
    pub fn user(content: &str) -> Self {
        Self::new(Role::User, content.trim())
    }

    /// Assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// System message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Error message.
    #[must_use]
    pub fn error(content: impl Into<String>) -> Self {
        Self::new(Role::Error, content)
    }

    /// Assistant message carrying tool calls and no text.
    #[must_use]
    pub fn assistant_with_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::new(Role::Assistant, "")
        }
    }

    /// Result of a tool invocation.
    #[must_use]
    pub fn tool_result(tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_name: Some(tool_name.into()),
            ..Self::new(Role::Tool, content)
        }
    }

    /// Progress line for a running tool, rendered as `name(command)`.
    ///
    /// Commands longer than 50 characters are cut to 47 plus `...`.
    #[must_use]
    pub fn tool_progress(tool_name: &str, command: &str) -> Self {
        let shown = if command.chars().count() > PROGRESS_COMMAND_MAX {
            let head: String = command.chars().take(PROGRESS_COMMAND_KEEP).collect();
            format!("{head}...")
        } else {
            command.to_owned()
        };
        Self {
            tool_name: Some(tool_name.to_owned()),
            metadata: MessageMetadata::with_source(MessageSource::Optimistic),
            ..Self::new(Role::ToolProgress, format!("{tool_name}({shown})"))
        }
    }

    /// User message tagged with a lifecycle source.
    #[must_use]
    pub fn user_with_source(content: &str, source: MessageSource) -> Self {
        Self {
            metadata: MessageMetadata::with_source(source),
            ..Self::user(content)
        }
    }

    /// User message shown before the backend confirmed it.
    #[must_use]
    pub fn optimistic_user(content: &str) -> Self {
        Self::user_with_source(content, MessageSource::Optimistic)
    }

    /// Partial message from an in-flight stream.
    #[must_use]
    pub fn streaming(
        role: Role,
        content: impl Into<String>,
        stream_id: StreamId,
        chunk_index: usize,
    ) -> Self {
        Self {
            metadata: MessageMetadata {
                stream_id: Some(stream_id),
                chunk_index,
                is_streaming: true,
                source: MessageSource::Streaming,
                ..MessageMetadata::default()
            },
            ..Self::new(role, content)
        }
    }

    /// Message pre-assigned to a context.
    #[must_use]
    pub fn in_context(role: Role, content: impl Into<String>, context_id: ContextId) -> Self {
        Self {
            context_id: Some(context_id),
            ..Self::new(role, content)
        }
    }

    /// First message of a new branch, pointing back at its source message.
    #[must_use]
    pub fn branch(
        role: Role,
        content: impl Into<String>,
        source_message_id: MessageId,
        context_id: ContextId,
    ) -> Self {
        Self {
            parent_id: Some(source_message_id),
            context_id: Some(context_id),
            ..Self::new(role, content)
        }
    }

    // ── Predicates ──────────────────────────────────────────────────────

    /// Role is user.
    #[must_use]
    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }

    /// Role is assistant.
    #[must_use]
    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }

    /// Role is system.
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }

    /// Role is error.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.role == Role::Error
    }

    /// Role is tool.
    #[must_use]
    pub fn is_tool(&self) -> bool {
        self.role == Role::Tool
    }

    /// The assistant requested at least one tool call.
    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Content is empty or whitespace only.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty()
    }

    /// Lifecycle source.
    #[must_use]
    pub fn source(&self) -> MessageSource {
        self.metadata.source
    }

    /// Produced optimistically by the UI.
    #[must_use]
    pub fn is_optimistic(&self) -> bool {
        self.metadata.source == MessageSource::Optimistic
    }

    /// Still partial.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.metadata.is_streaming
    }

    /// Stream the message came from.
    #[must_use]
    pub fn stream_id(&self) -> Option<&StreamId> {
        self.metadata.stream_id.as_ref()
    }

    /// Has a thinking block attached.
    #[must_use]
    pub fn has_thinking(&self) -> bool {
        self.thinking.is_some()
    }

    /// Has a thinking block the UI should display.
    #[must_use]
    pub fn is_thinking_visible(&self) -> bool {
        self.thinking.as_ref().is_some_and(|t| t.visible)
    }

    // ── Builders ────────────────────────────────────────────────────────

    /// Copy with a different timestamp.
    #[must_use]
    pub fn with_timestamp(&self, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            ..self.clone()
        }
    }

    /// Copy with replaced metadata.
    #[must_use]
    pub fn with_metadata(&self, metadata: MessageMetadata) -> Self {
        Self {
            metadata,
            ..self.clone()
        }
    }

    /// Copy with a different lifecycle source.
    #[must_use]
    pub fn with_source(&self, source: MessageSource) -> Self {
        let mut metadata = self.metadata.clone();
        metadata.source = source;
        self.with_metadata(metadata)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn user_trims_content() {
        let msg = Message::user("  hello \n");
        assert_eq!(msg.content, "hello");
        assert!(msg.is_user());
        assert_eq!(msg.source(), MessageSource::Final);
        assert!(msg.parent_id.is_none());
        assert!(msg.context_id.is_none());
    }

    #[test]
    fn assistant_keeps_whitespace() {
        let msg = Message::assistant("  spaced  ");
        assert_eq!(msg.content, "  spaced  ");
        assert!(msg.is_assistant());
    }

    #[test]
    fn constructors_set_roles() {
        assert!(Message::system("s").is_system());
        assert!(Message::error("e").is_error());
        assert!(Message::tool_result("bash", "ok").is_tool());
        assert_eq!(
            Message::tool_result("bash", "ok").tool_name.as_deref(),
            Some("bash")
        );
    }

    #[test]
    fn ids_are_distinct() {
        assert_ne!(Message::user("a").id, Message::user("a").id);
    }

    #[test]
    fn tool_calls_message() {
        let msg = Message::assistant_with_tool_calls(vec![ToolCall::new("read", Map::new())]);
        assert!(msg.has_tool_calls());
        assert!(msg.is_empty());
    }

    #[test]
    fn tool_progress_short_command() {
        let msg = Message::tool_progress("bash", "ls -la");
        assert_eq!(msg.content, "bash(ls -la)");
        assert_eq!(msg.role, Role::ToolProgress);
        assert!(msg.is_optimistic());
    }

    #[test]
    fn tool_progress_truncates_long_command() {
        let command = "x".repeat(60);
        let msg = Message::tool_progress("bash", &command);
        assert_eq!(msg.content, format!("bash({}...)", "x".repeat(47)));
    }

    #[test]
    fn tool_progress_exactly_fifty_not_truncated() {
        let command = "y".repeat(50);
        let msg = Message::tool_progress("bash", &command);
        assert_eq!(msg.content, format!("bash({command})"));
    }

    #[test]
    fn streaming_message_metadata() {
        let stream = StreamId::from("s1");
        let msg = Message::streaming(Role::Assistant, "par", stream.clone(), 3);
        assert!(msg.is_streaming());
        assert_eq!(msg.stream_id(), Some(&stream));
        assert_eq!(msg.metadata.chunk_index, 3);
        assert_eq!(msg.source(), MessageSource::Streaming);
    }

    #[test]
    fn optimistic_user() {
        let msg = Message::optimistic_user("hi");
        assert!(msg.is_optimistic());
        assert!(msg.is_user());
    }

    #[test]
    fn branch_message_presets_parent_and_context() {
        let source = MessageId::from("m1");
        let ctx = ContextId::from("c1");
        let msg = Message::branch(Role::User, "fork", source.clone(), ctx.clone());
        assert_eq!(msg.parent_id, Some(source));
        assert_eq!(msg.context_id, Some(ctx));
        assert_eq!(msg.metadata.depth, 0);
    }

    #[test]
    fn in_context_sets_context() {
        let ctx = ContextId::from("c9");
        let msg = Message::in_context(Role::Assistant, "x", ctx.clone());
        assert_eq!(msg.context_id, Some(ctx));
    }

    #[test]
    fn is_empty_whitespace() {
        assert!(Message::assistant(" \n\t").is_empty());
        assert!(!Message::assistant("a").is_empty());
    }

    #[test]
    fn with_source_does_not_touch_original() {
        let original = Message::user("hi");
        let changed = original.with_source(MessageSource::Optimistic);
        assert_eq!(original.source(), MessageSource::Final);
        assert_eq!(changed.source(), MessageSource::Optimistic);
        assert_eq!(changed.id, original.id);
    }

    #[test]
    fn with_timestamp_copies() {
        let original = Message::user("hi");
        let later = original.timestamp + Duration::seconds(10);
        let moved = original.with_timestamp(later);
        assert_eq!(moved.timestamp, later);
        assert_ne!(original.timestamp, later);
    }

    #[test]
    fn thinking_visibility() {
        let mut msg = Message::assistant("answer");
        assert!(!msg.has_thinking());
        msg.thinking = Some(ThinkingBlock {
            content: "why".into(),
            visible: false,
        });
        assert!(msg.has_thinking());
        assert!(!msg.is_thinking_visible());
    }

    #[test]
    fn role_serde_snake_case() {
        let json = serde_json::to_string(&Role::ToolProgress).unwrap();
        assert_eq!(json, "\"tool_progress\"");
        assert_eq!(Role::ToolProgress.to_string(), "tool_progress");
    }

    #[test]
    fn message_serde_roundtrip() {
        let msg = Message::tool_result("grep", "3 matches");
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("toolName").is_some());
        assert!(json.get("toolCalls").is_none());
        let back: Message = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn usage_serializes_only_when_reported() {
        let mut meta = MessageMetadata::default();
        let json = serde_json::to_value(&meta).unwrap();
        assert!(json.get("usage").is_none());
        assert!(json.get("doneReason").is_none());

        meta.usage = Some(TokenUsage {
            input_tokens: 7,
            output_tokens: 3,
        });
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["usage"]["inputTokens"], 7);
        assert_eq!(json["usage"]["outputTokens"], 3);
    }
}
