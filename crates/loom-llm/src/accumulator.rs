//! Fragment accumulation.
//!
//! [`MessageAccumulator`] folds the fragments of each in-flight stream into
//! one [`Message`]. Per stream the lifecycle is
//! absent → active → complete, with removal reachable from either state
//! through [`MessageAccumulator::finalize_message`] or
//! [`MessageAccumulator::cleanup_stream`].
//!
//! All state sits behind one mutex, so a producer task can feed fragments
//! while a UI task reads snapshots through a shared `Arc`.

use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};
use loom_core::{Message, MessageMetadata, MessageSource, Role, StreamId, TokenUsage};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::errors::{Result, StreamError};
use crate::fragment::Fragment;

/// Snapshot of one in-flight stream.
#[derive(Clone, Debug, PartialEq)]
pub struct AccumulatingMessage {
    /// Stream identifier.
    pub stream_id: StreamId,
    /// Text accumulated so far.
    pub content: String,
    /// Fragments folded in.
    pub chunk_count: usize,
    /// Timestamp of the first fragment.
    pub start_time: DateTime<Utc>,
    /// Timestamp of the latest fragment (including error fragments).
    pub last_update: DateTime<Utc>,
    /// Model reported by the first fragment.
    pub model: String,
    /// Role reported by the first fragment.
    pub role: Role,
    /// A terminal fragment has arrived.
    pub is_complete: bool,
    /// Latest non-error fragment.
    pub last_fragment: Fragment,
}

impl AccumulatingMessage {
    fn start(fragment: &Fragment) -> Self {
        Self {
            stream_id: fragment.stream_id.clone(),
            content: String::new(),
            chunk_count: 0,
            start_time: fragment.timestamp,
            last_update: fragment.timestamp,
            model: fragment.model.clone(),
            role: fragment.role,
            is_complete: false,
            last_fragment: fragment.clone(),
        }
    }

    fn to_message(&self) -> Message {
        let last = &self.last_fragment;
        let usage = (last.prompt_eval_count > 0 || last.eval_count > 0).then_some(TokenUsage {
            input_tokens: last.prompt_eval_count,
            output_tokens: last.eval_count,
        });
        Message {
            timestamp: self.last_update,
            tool_calls: last.tool_calls.clone(),
            metadata: MessageMetadata {
                stream_id: Some(self.stream_id.clone()),
                chunk_index: self.chunk_count,
                source: MessageSource::Final,
                done_reason: last.done_reason.clone(),
                usage,
                ..MessageMetadata::default()
            },
            ..Message::new(self.role, self.content.clone())
        }
    }
}

/// Statistics about one stream.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamStats {
    /// Stream identifier.
    pub stream_id: StreamId,
    /// Fragments folded in.
    pub chunk_count: usize,
    /// Accumulated length in bytes.
    pub content_length: usize,
    /// Whitespace-separated words accumulated.
    pub word_count: usize,
    /// First fragment time.
    pub start_time: DateTime<Utc>,
    /// Latest fragment time.
    pub last_update: DateTime<Utc>,
    /// `last_update - start_time`.
    pub duration: TimeDelta,
    /// A terminal fragment has arrived.
    pub is_complete: bool,
}

impl StreamStats {
    /// Generation speed in words per minute. Zero for an instantaneous stream.
    #[allow(clippy::cast_precision_loss)]
    pub fn words_per_minute(&self) -> f64 {
        let millis = self.duration.num_milliseconds();
        if millis <= 0 {
            return 0.0;
        }
        self.word_count as f64 / (millis as f64 / 60_000.0)
    }
}

/// Thread-safe per-stream fragment accumulator.
#[derive(Debug, Default)]
pub struct MessageAccumulator {
    active: Mutex<HashMap<StreamId, AccumulatingMessage>>,
}

impl MessageAccumulator {
    /// Empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one fragment into its stream.
    ///
    /// Error fragments only bump `last_update` of an existing entry; the
    /// partial content is kept.
    pub fn add_chunk(&self, fragment: &Fragment) {
        let mut active = self.active.lock();

        if let Some(error) = &fragment.error {
            if let Some(entry) = active.get_mut(&fragment.stream_id) {
                entry.last_update = fragment.timestamp;
            }
            warn!(
                stream_id = %fragment.stream_id,
                category = error.category(),
                error = %error,
                "error fragment recorded, keeping partial content"
            );
            return;
        }

        let entry = active
            .entry(fragment.stream_id.clone())
            .or_insert_with(|| AccumulatingMessage::start(fragment));

        entry.content.push_str(&fragment.content);
        entry.chunk_count += 1;
        entry.last_update = fragment.timestamp;
        entry.last_fragment = fragment.clone();

        if fragment.done {
            entry.is_complete = true;
            debug!(
                stream_id = %fragment.stream_id,
                chunks = entry.chunk_count,
                "stream complete"
            );
        }
    }

    /// Accumulated text, or empty if the stream is unknown.
    pub fn current_content(&self, stream_id: &StreamId) -> String {
        self.active
            .lock()
            .get(stream_id)
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }

    /// Snapshot of the in-flight entry.
    pub fn get_message(&self, stream_id: &StreamId) -> Option<AccumulatingMessage> {
        self.active.lock().get(stream_id).cloned()
    }

    /// The stream exists and has received its terminal fragment.
    pub fn is_complete(&self, stream_id: &StreamId) -> bool {
        self.active
            .lock()
            .get(stream_id)
            .is_some_and(|m| m.is_complete)
    }

    /// Build the completed message without removing the entry.
    pub fn complete_message(&self, stream_id: &StreamId) -> Result<Message> {
        let active = self.active.lock();
        let entry = active
            .get(stream_id)
            .ok_or_else(|| StreamError::NotFound(stream_id.clone()))?;
        if !entry.is_complete {
            return Err(StreamError::NotComplete(stream_id.clone()));
        }
        Ok(entry.to_message())
    }

    /// Build the message from whatever has accumulated and remove the entry.
    ///
    /// Completion is not required.
    pub fn finalize_message(&self, stream_id: &StreamId) -> Result<Message> {
        let entry = self
            .active
            .lock()
            .remove(stream_id)
            .ok_or_else(|| StreamError::NotFound(stream_id.clone()))?;
        Ok(entry.to_message())
    }

    /// Remove the entry unconditionally. Returns whether one existed.
    pub fn cleanup_stream(&self, stream_id: &StreamId) -> bool {
        let removed = self.active.lock().remove(stream_id).is_some();
        if removed {
            debug!(stream_id = %stream_id, "stream cleaned up");
        }
        removed
    }

    /// IDs of every tracked stream, sorted.
    pub fn active_streams(&self) -> Vec<StreamId> {
        let mut ids: Vec<StreamId> = self.active.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Statistics for a tracked stream.
    pub fn stream_stats(&self, stream_id: &StreamId) -> Option<StreamStats> {
        self.active.lock().get(stream_id).map(|m| StreamStats {
            stream_id: stream_id.clone(),
            chunk_count: m.chunk_count,
            content_length: m.content.len(),
            word_count: m.content.split_whitespace().count(),
            start_time: m.start_time,
            last_update: m.last_update,
            duration: m.last_update - m.start_time,
            is_complete: m.is_complete,
        })
    }

    /// Number of tracked streams.
    pub fn len(&self) -> usize {
        self.active.lock().len()
    }

    /// No streams tracked.
    pub fn is_empty(&self) -> bool {
        self.active.lock().is_empty()
    }
}

/// Strip trailing spaces and tabs that accumulate at fragment boundaries.
pub fn sanitize_stream_content(content: &str) -> String {
    content.trim_end_matches([' ', '\t']).to_owned()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use assert_matches::assert_matches;
    use loom_core::ToolCall;
    use proptest::prelude::*;

    fn sid(s: &str) -> StreamId {
        StreamId::from(s)
    }

    fn feed(acc: &MessageAccumulator, stream: &str, parts: &[&str]) {
        for (i, part) in parts.iter().enumerate() {
            acc.add_chunk(&Fragment::text(sid(stream), i, *part));
        }
        acc.add_chunk(&Fragment::done(sid(stream), parts.len(), ""));
    }

    #[test]
    fn folds_fragments_in_order() {
        let acc = MessageAccumulator::new();
        feed(&acc, "s", &["A", "B", "C"]);

        let msg = acc.complete_message(&sid("s")).unwrap();
        assert_eq!(msg.content, "ABC");
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.metadata.chunk_index, 4);
        assert_eq!(msg.stream_id(), Some(&sid("s")));
    }

    #[test]
    fn complete_message_is_non_destructive() {
        let acc = MessageAccumulator::new();
        feed(&acc, "s", &["x"]);
        let a = acc.complete_message(&sid("s")).unwrap();
        let b = acc.complete_message(&sid("s")).unwrap();
        assert_eq!(a.content, b.content);
        assert_eq!(acc.len(), 1);
    }

    #[test]
    fn complete_message_requires_completion() {
        let acc = MessageAccumulator::new();
        acc.add_chunk(&Fragment::text(sid("s"), 0, "partial"));
        assert_matches!(
            acc.complete_message(&sid("s")),
            Err(StreamError::NotComplete(id)) if id == sid("s")
        );
        assert!(!acc.is_complete(&sid("s")));
    }

    #[test]
    fn unknown_stream_is_not_found() {
        let acc = MessageAccumulator::new();
        assert_matches!(
            acc.complete_message(&sid("nope")),
            Err(StreamError::NotFound(_))
        );
        assert_matches!(
            acc.finalize_message(&sid("nope")),
            Err(StreamError::NotFound(_))
        );
        assert_eq!(acc.current_content(&sid("nope")), "");
    }

    #[test]
    fn finalize_removes_entry() {
        let acc = MessageAccumulator::new();
        feed(&acc, "s", &["A", "B", "C"]);
        let msg = acc.finalize_message(&sid("s")).unwrap();
        assert_eq!(msg.content, "ABC");
        assert!(acc.get_message(&sid("s")).is_none());
        assert!(acc.is_empty());
    }

    #[test]
    fn finalize_does_not_require_completion() {
        let acc = MessageAccumulator::new();
        acc.add_chunk(&Fragment::text(sid("s"), 0, "half"));
        let msg = acc.finalize_message(&sid("s")).unwrap();
        assert_eq!(msg.content, "half");
    }

    #[test]
    fn error_fragment_keeps_partial_content() {
        let acc = MessageAccumulator::new();
        acc.add_chunk(&Fragment::text(sid("s"), 0, "kept"));
        let later = Utc::now() + TimeDelta::seconds(5);
        acc.add_chunk(
            &Fragment::failed(sid("s"), StreamError::Transport("reset".into()))
                .with_timestamp(later),
        );

        let entry = acc.get_message(&sid("s")).unwrap();
        assert_eq!(entry.content, "kept");
        assert_eq!(entry.chunk_count, 1);
        assert_eq!(entry.last_update, later);
        assert!(!entry.is_complete);
    }

    #[test]
    fn error_fragment_for_unknown_stream_creates_nothing() {
        let (logs, _guard) = loom_core::logging::capture_logs();
        let acc = MessageAccumulator::new();
        acc.add_chunk(&Fragment::cancelled(sid("ghost")));
        assert!(acc.is_empty());
        assert!(logs.has_field("category", "cancelled"));
    }

    #[test]
    fn tool_calls_come_from_terminal_fragment() {
        let acc = MessageAccumulator::new();
        acc.add_chunk(&Fragment::text(sid("s"), 0, ""));
        let call = ToolCall::new("read_file", serde_json::Map::new());
        acc.add_chunk(&Fragment::done(sid("s"), 1, "").with_tool_calls(vec![call.clone()]));
        let msg = acc.complete_message(&sid("s")).unwrap();
        assert_eq!(msg.tool_calls, vec![call]);
    }

    #[test]
    fn usage_and_done_reason_come_from_terminal_fragment() {
        let acc = MessageAccumulator::new();
        acc.add_chunk(&Fragment::text(sid("s"), 0, "hi"));
        acc.add_chunk(&Fragment::done(sid("s"), 1, "").with_counts(12, 30));
        let msg = acc.finalize_message(&sid("s")).unwrap();
        assert_eq!(msg.metadata.done_reason.as_deref(), Some("stop"));
        assert_eq!(
            msg.metadata.usage,
            Some(TokenUsage {
                input_tokens: 12,
                output_tokens: 30,
            })
        );

        acc.add_chunk(&Fragment::text(sid("p"), 0, "partial"));
        let partial = acc.finalize_message(&sid("p")).unwrap();
        assert!(partial.metadata.done_reason.is_none());
        assert!(partial.metadata.usage.is_none());
    }

    #[test]
    fn role_and_model_from_first_fragment() {
        let acc = MessageAccumulator::new();
        acc.add_chunk(
            &Fragment::text(sid("s"), 0, "a")
                .with_model("qwen3")
                .with_role(Role::Tool),
        );
        acc.add_chunk(&Fragment::done(sid("s"), 1, "b").with_model("other"));
        let entry = acc.get_message(&sid("s")).unwrap();
        assert_eq!(entry.model, "qwen3");
        assert_eq!(acc.complete_message(&sid("s")).unwrap().role, Role::Tool);
    }

    #[test]
    fn cleanup_removes_incomplete() {
        let acc = MessageAccumulator::new();
        acc.add_chunk(&Fragment::text(sid("s"), 0, "a"));
        assert!(acc.cleanup_stream(&sid("s")));
        assert!(!acc.cleanup_stream(&sid("s")));
        assert!(acc.active_streams().is_empty());
    }

    #[test]
    fn streams_are_independent() {
        let acc = MessageAccumulator::new();
        acc.add_chunk(&Fragment::text(sid("b"), 0, "bee"));
        acc.add_chunk(&Fragment::text(sid("a"), 0, "ay"));
        assert_eq!(acc.active_streams(), vec![sid("a"), sid("b")]);
        assert_eq!(acc.current_content(&sid("a")), "ay");
        assert_eq!(acc.current_content(&sid("b")), "bee");
    }

    #[test]
    fn stats_and_words_per_minute() {
        let acc = MessageAccumulator::new();
        let start = Utc::now();
        acc.add_chunk(&Fragment::text(sid("s"), 0, "one two ").with_timestamp(start));
        acc.add_chunk(
            &Fragment::done(sid("s"), 1, "three four")
                .with_timestamp(start + TimeDelta::seconds(30)),
        );

        let stats = acc.stream_stats(&sid("s")).unwrap();
        assert_eq!(stats.chunk_count, 2);
        assert_eq!(stats.word_count, 4);
        assert_eq!(stats.content_length, "one two three four".len());
        assert_eq!(stats.duration, TimeDelta::seconds(30));
        assert!(stats.is_complete);
        assert!((stats.words_per_minute() - 8.0).abs() < 1e-9);
    }

    #[test]
    fn zero_duration_wpm_is_zero() {
        let acc = MessageAccumulator::new();
        let now = Utc::now();
        acc.add_chunk(&Fragment::text(sid("s"), 0, "word").with_timestamp(now));
        let stats = acc.stream_stats(&sid("s")).unwrap();
        assert!(stats.words_per_minute().abs() < f64::EPSILON);
    }

    #[test]
    fn sanitize_trims_trailing_blanks_only() {
        assert_eq!(sanitize_stream_content("hi \t "), "hi");
        assert_eq!(sanitize_stream_content("hi\n"), "hi\n");
        assert_eq!(sanitize_stream_content("  lead"), "  lead");
    }

    #[test]
    fn concurrent_producer_and_reader() {
        let acc = Arc::new(MessageAccumulator::new());
        let producer = {
            let acc = Arc::clone(&acc);
            std::thread::spawn(move || {
                for i in 0..200 {
                    acc.add_chunk(&Fragment::text(sid("s"), i, "x"));
                }
                acc.add_chunk(&Fragment::done(sid("s"), 200, ""));
            })
        };
        let reader = {
            let acc = Arc::clone(&acc);
            std::thread::spawn(move || {
                for _ in 0..200 {
                    let len = acc.current_content(&sid("s")).len();
                    assert!(len <= 200);
                }
            })
        };
        producer.join().unwrap();
        reader.join().unwrap();
        assert_eq!(acc.complete_message(&sid("s")).unwrap().content.len(), 200);
    }

    proptest! {
        #[test]
        fn content_is_concatenation(parts in prop::collection::vec("[a-z ]{0,8}", 0..20)) {
            let acc = MessageAccumulator::new();
            let refs: Vec<&str> = parts.iter().map(String::as_str).collect();
            feed(&acc, "p", &refs);
            let msg = acc.finalize_message(&sid("p")).unwrap();
            prop_assert_eq!(msg.content, parts.concat());
            prop_assert!(acc.is_empty());
        }
    }
}
