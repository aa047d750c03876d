//! Driving a fragment stream into the accumulator.
//!
//! [`consume_stream`] is the single consumer loop for one model reply. The
//! accumulator entry for the stream is always removed when the loop exits,
//! whether it finished, failed, was cancelled, or the future was dropped.

use futures::StreamExt;
use loom_core::{Message, StreamId};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::accumulator::MessageAccumulator;
use crate::errors::{Result, StreamError};
use crate::fragment::Fragment;
use crate::thinking::update_message_with_thinking;
use crate::transport::{ChatRequest, FragmentStream, LanguageModel};

/// Removes the stream's accumulator entry on drop.
struct CleanupGuard<'a> {
    accumulator: &'a MessageAccumulator,
    stream_id: Option<StreamId>,
}

impl Drop for CleanupGuard<'_> {
    fn drop(&mut self) {
        if let Some(stream_id) = self.stream_id.take() {
            let _ = self.accumulator.cleanup_stream(&stream_id);
        }
    }
}

/// Fold `stream` into `accumulator` until a terminal fragment arrives.
///
/// The stream id is taken from the first fragment. Non-terminal error
/// fragments are recorded and skipped. A terminal error fragment ends the
/// loop with that error. If the stream ends without a terminal fragment the
/// partial content is returned.
///
/// On cancellation a terminal cancellation fragment is fed to the
/// accumulator and [`StreamError::Cancelled`] is returned.
pub async fn consume_stream(
    accumulator: &MessageAccumulator,
    mut stream: FragmentStream,
    cancel: &CancellationToken,
) -> Result<Message> {
    let mut guard = CleanupGuard {
        accumulator,
        stream_id: None,
    };

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                if let Some(stream_id) = &guard.stream_id {
                    accumulator.add_chunk(&Fragment::cancelled(stream_id.clone()));
                }
                debug!(stream_id = ?guard.stream_id, "stream cancelled");
                return Err(StreamError::Cancelled);
            }
            next = stream.next() => next,
        };

        let Some(fragment) = next else {
            break;
        };

        if guard.stream_id.is_none() {
            guard.stream_id = Some(fragment.stream_id.clone());
        }
        accumulator.add_chunk(&fragment);

        if fragment.done {
            if let Some(error) = fragment.error {
                return Err(error);
            }
            break;
        }
    }

    let Some(stream_id) = guard.stream_id.clone() else {
        return Err(StreamError::Transport("stream ended without fragments".to_owned()));
    };
    if !accumulator.is_complete(&stream_id) {
        warn!(stream_id = %stream_id, "stream ended without a terminal fragment");
    }
    accumulator.finalize_message(&stream_id)
}

/// Stream a reply from `model` and return it with any thinking split off.
pub async fn stream_reply(
    model: &dyn LanguageModel,
    request: &ChatRequest,
    accumulator: &MessageAccumulator,
    cancel: &CancellationToken,
    show_thinking: bool,
) -> Result<Message> {
    let request = request.clone().streaming();
    let stream = model.stream(&request).await?;
    let message = consume_stream(accumulator, stream, cancel).await?;
    Ok(update_message_with_thinking(&message, show_thinking))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
