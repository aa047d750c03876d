//! Thinking-block parsing.
//!
//! Reasoning models wrap their internal monologue in `<think>…</think>` or
//! `<thinking>…</thinking>`. These helpers split that span from the
//! user-visible answer. Tags match case-insensitively and may span lines.

use std::sync::LazyLock;

use loom_core::{Message, MessageMetadata, MessageSource, Role, ThinkingBlock};
use regex::Regex;

static THINK_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<think(?:ing)?>(.*?)</think(?:ing)?>").expect("valid think-block regex")
});

static EXCESS_NEWLINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid newline regex"));

/// Content split into reasoning and answer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParsedThinking {
    /// Non-empty block bodies, trimmed, joined by a blank line.
    pub thinking: String,
    /// Content with every block removed, trimmed.
    pub response: String,
    /// At least one block had non-whitespace content.
    pub has_thinking: bool,
}

/// Split `content` into thinking and response.
///
/// A present but whitespace-only block yields `has_thinking == false`.
pub fn parse_thinking(content: &str) -> ParsedThinking {
    let parts: Vec<&str> = THINK_BLOCK
        .captures_iter(content)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .collect();

    ParsedThinking {
        thinking: parts.join("\n\n"),
        response: THINK_BLOCK.replace_all(content, "").trim().to_owned(),
        has_thinking: !parts.is_empty(),
    }
}

/// The response half of [`parse_thinking`].
pub fn extract_response_content(content: &str) -> String {
    parse_thinking(content).response
}

/// Remove every block and collapse runs of three or more newlines to two.
pub fn remove_thinking_blocks(content: &str) -> String {
    let stripped = THINK_BLOCK.replace_all(content, "");
    EXCESS_NEWLINES
        .replace_all(stripped.trim(), "\n\n")
        .into_owned()
}

/// Build a final message from raw model output, splitting off any thinking.
pub fn parse_message_with_thinking(content: &str, role: Role, show_thinking: bool) -> Message {
    let parsed = parse_thinking(content);
    Message {
        metadata: MessageMetadata::with_source(MessageSource::Final),
        thinking: parsed.has_thinking.then(|| ThinkingBlock {
            content: parsed.thinking,
            visible: show_thinking,
        }),
        ..Message::new(role, parsed.response)
    }
}

/// Re-parse an existing message's content. Empty content is returned as is.
///
/// An existing thinking block is kept when the content has none.
pub fn update_message_with_thinking(message: &Message, show_thinking: bool) -> Message {
    if message.content.is_empty() {
        return message.clone();
    }
    let parsed = parse_thinking(&message.content);
    let mut updated = message.clone();
    updated.content = parsed.response;
    if parsed.has_thinking {
        updated.thinking = Some(ThinkingBlock {
            content: parsed.thinking,
            visible: show_thinking,
        });
    }
    updated
}

/// Display text: visible thinking re-wrapped in `<think>` tags ahead of the content.
pub fn effective_content(message: &Message) -> String {
    match &message.thinking {
        Some(block) if block.visible => {
            if message.content.is_empty() {
                format!("<think>{}</think>", block.content)
            } else {
                format!("<think>{}</think>\n\n{}", block.content, message.content)
            }
        }
        _ => message.content.clone(),
    }
}
