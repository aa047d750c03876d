//! Streamed content fragments.

use chrono::{DateTime, Utc};
use loom_core::{Role, StreamId, ToolCall};

use crate::errors::StreamError;

/// One incremental piece of a streamed model response.
///
/// Aggregate metadata (tool calls, token counts, done reason) is only
/// meaningful on the terminal fragment.
#[derive(Clone, Debug, PartialEq)]
pub struct Fragment {
    /// Unique fragment identifier, `<stream>-<index>` by convention.
    pub id: String,
    /// Stream this fragment belongs to.
    pub stream_id: StreamId,
    /// Incremental text.
    pub content: String,
    /// Terminal flag.
    pub done: bool,
    /// Receive time.
    pub timestamp: DateTime<Utc>,
    /// Model that produced the fragment.
    pub model: String,
    /// Role of the message being produced.
    pub role: Role,
    /// Tool calls requested by the model.
    pub tool_calls: Vec<ToolCall>,
    /// Failure carried instead of content.
    pub error: Option<StreamError>,
    /// Why the model stopped.
    pub done_reason: Option<String>,
    /// Prompt tokens evaluated.
    pub prompt_eval_count: u64,
    /// Completion tokens generated.
    pub eval_count: u64,
}

impl Fragment {
    /// Text fragment from an assistant stream.
    #[must_use]
    pub fn text(stream_id: StreamId, index: usize, content: impl Into<String>) -> Self {
        Self {
            id: format!("{stream_id}-{index}"),
            stream_id,
            content: content.into(),
            done: false,
            timestamp: Utc::now(),
            model: String::new(),
            role: Role::Assistant,
            tool_calls: Vec::new(),
            error: None,
            done_reason: None,
            prompt_eval_count: 0,
            eval_count: 0,
        }
    }

    /// Terminal fragment.
    #[must_use]
    pub fn done(stream_id: StreamId, index: usize, content: impl Into<String>) -> Self {
        Self {
            done: true,
            done_reason: Some("stop".to_owned()),
            ..Self::text(stream_id, index, content)
        }
    }

    /// Fragment carrying an error and no content.
    #[must_use]
    pub fn failed(stream_id: StreamId, error: StreamError) -> Self {
        Self {
            id: format!("{stream_id}-{}", error.category()),
            error: Some(error),
            ..Self::text(stream_id, 0, "")
        }
    }

    /// Terminal cancellation marker.
    #[must_use]
    pub fn cancelled(stream_id: StreamId) -> Self {
        Self {
            done: true,
            ..Self::failed(stream_id, StreamError::Cancelled)
        }
    }

    /// Set the model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the role.
    #[must_use]
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// Set the tool calls.
    #[must_use]
    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    /// Set the receive time.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Set the token counts.
    #[must_use]
    pub fn with_counts(mut self, prompt_eval_count: u64, eval_count: u64) -> Self {
        self.prompt_eval_count = prompt_eval_count;
        self.eval_count = eval_count;
        self
    }

    /// Carries an error.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
