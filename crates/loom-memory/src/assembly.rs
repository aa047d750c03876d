//! Scoring, merging, and budget-bounded assembly of model context.
//!
//! Assembly is greedy: system messages go in first and count against the
//! budget, then candidates are taken in score order until the first one
//! that does not fit. Nothing after that candidate is considered.

use std::collections::HashSet;

use loom_core::{Message, Role};
use loom_settings::HybridMemorySettings;

/// Relative weight of semantic relevance and recency in a message's score.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScoreWeights {
    /// Weight of semantic relevance.
    pub semantic: f32,
    /// Weight of recency.
    pub recency: f32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            semantic: 0.7,
            recency: 0.3,
        }
    }
}

impl ScoreWeights {
    /// Weights from the hybrid settings section.
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_settings(s: &HybridMemorySettings) -> Self {
        Self {
            semantic: s.semantic_weight as f32,
            recency: s.recency_weight as f32,
        }
    }
}

/// A candidate message with its score. Only lives during assembly.
#[derive(Clone, Debug, PartialEq)]
pub struct ScoredMessage {
    /// The candidate.
    pub message: Message,
    /// Combined relevance score.
    pub score: f32,
    /// Came from the recent buffer or conversation path rather than search.
    pub is_recent: bool,
}

/// Score recent messages and search hits, best first.
///
/// A recent message scores `recency + semantic * 0.8` when it contains the
/// query (case-insensitive) and `recency + semantic * 0.3` otherwise. A
/// search hit scores `semantic * 0.9 + recency * 0.2`. Ties keep input
/// order, recent messages first.
pub fn score_messages(
    recent: &[Message],
    relevant: &[Message],
    query: &str,
    weights: ScoreWeights,
) -> Vec<ScoredMessage> {
    let query = query.to_lowercase();

    let mut scored: Vec<ScoredMessage> = recent
        .iter()
        .map(|message| {
            let semantic = if message.content.to_lowercase().contains(&query) {
                0.8
            } else {
                0.3
            };
            ScoredMessage {
                message: message.clone(),
                score: weights.recency + weights.semantic * semantic,
                is_recent: true,
            }
        })
        .collect();

    let hit_score = weights.semantic * 0.9 + weights.recency * 0.2;
    scored.extend(relevant.iter().map(|message| ScoredMessage {
        message: message.clone(),
        score: hit_score,
        is_recent: false,
    }));

    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored
}

/// Coarse token estimate: four bytes per token.
pub fn estimate_tokens(content: &str) -> usize {
    content.len() / 4
}

/// Pack scored candidates into `max_tokens`.
///
/// System messages are always included and counted first. The rest are
/// accepted in score order until one would overflow the budget. The result
/// holds system messages first, then accepted messages in acceptance order,
/// or sorted by timestamp when `chronological` is set.
pub fn assemble_context(
    scored: &[ScoredMessage],
    max_tokens: usize,
    chronological: bool,
) -> Vec<Message> {
    let (system, rest): (Vec<&ScoredMessage>, Vec<&ScoredMessage>) = scored
        .iter()
        .partition(|candidate| candidate.message.role == Role::System);

    let mut used: usize = system
        .iter()
        .map(|candidate| estimate_tokens(&candidate.message.content))
        .sum();

    let mut accepted = Vec::new();
    for candidate in rest {
        let cost = estimate_tokens(&candidate.message.content);
        if used + cost > max_tokens {
            break;
        }
        used += cost;
        accepted.push(candidate.message.clone());
    }

    if chronological {
        accepted.sort_by_key(|message| message.timestamp);
    }

    system
        .into_iter()
        .map(|candidate| candidate.message.clone())
        .chain(accepted)
        .collect()
}

/// Drop candidates whose content equals that of one of the last `window`
/// recent messages. Exact byte comparison.
pub fn deduplicate_by_content(
    recent: &[Message],
    candidates: Vec<Message>,
    window: usize,
) -> Vec<Message> {
    let start = recent.len().saturating_sub(window);
    let seen: HashSet<&str> = recent[start..]
        .iter()
        .map(|message| message.content.as_str())
        .collect();
    if seen.is_empty() {
        return candidates;
    }
    candidates
        .into_iter()
        .filter(|message| !seen.contains(message.content.as_str()))
        .collect()
}

/// Concatenate `primary` and `secondary`, keeping the first occurrence of
/// each message id.
pub fn merge_unique(primary: Vec<Message>, secondary: Vec<Message>) -> Vec<Message> {
    let mut seen = HashSet::new();
    primary
        .into_iter()
        .chain(secondary)
        .filter(|message| seen.insert(message.id.clone()))
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
