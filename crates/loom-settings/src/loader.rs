//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`LoomSettings::default()`]
//! 2. If `~/.loom/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `LOOM_*` environment overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use loom_core::LogFormat;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::{LoomSettings, PathTruncationSetting};

/// Resolve the settings file path (`~/.loom/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_owned());
    PathBuf::from(home).join(".loom").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<LoomSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from `path` with env var overrides, then validate.
///
/// A missing file yields defaults. Invalid JSON or out-of-range values are
/// errors.
pub fn load_settings_from_path(path: &Path) -> Result<LoomSettings> {
    load_with(path, |name| std::env::var(name).ok())
}

fn load_with(path: &Path, lookup: impl Fn(&str) -> Option<String>) -> Result<LoomSettings> {
    let defaults = serde_json::to_value(LoomSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: LoomSettings = serde_json::from_value(merged)?;
    apply_overrides(&mut settings, lookup);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `LOOM_*` environment overrides from the process environment.
pub fn apply_env_overrides(settings: &mut LoomSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Invalid values are ignored with a warning and leave the file/default
/// value in place.
pub fn apply_overrides(settings: &mut LoomSettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = EnvReader { lookup };

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("LOOM_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.parsed("LOOM_LOG_FORMAT", parse_log_format) {
        settings.logging.format = v;
    }

    // ── Hybrid memory ───────────────────────────────────────────────
    let hybrid = &mut settings.memory.hybrid;
    if let Some(v) = env.parsed("LOOM_WORKING_MEMORY_SIZE", |s| parse_usize_range(s, 1, 10_000)) {
        hybrid.working_memory_size = v;
    }
    if let Some(v) = env.parsed("LOOM_MAX_CONTEXT_TOKENS", |s| {
        parse_usize_range(s, 1, 10_000_000)
    }) {
        hybrid.max_context_tokens = v;
    }
    if let Some(v) = env.parsed("LOOM_SEMANTIC_WEIGHT", parse_unit_f64) {
        hybrid.semantic_weight = v;
    }
    if let Some(v) = env.parsed("LOOM_RECENCY_WEIGHT", parse_unit_f64) {
        hybrid.recency_weight = v;
    }
    if let Some(v) = env.parsed("LOOM_DEDUP_WINDOW", |s| parse_usize_range(s, 0, 1000)) {
        hybrid.deduplication_window = v;
    }
    if let Some(v) = env.parsed("LOOM_TOOL_INDEXING", parse_bool) {
        hybrid.enable_tool_indexing = v;
    }
    if let Some(v) = env.parsed("LOOM_CHRONOLOGICAL", parse_bool) {
        hybrid.chronological = v;
    }

    // ── Graph memory ────────────────────────────────────────────────
    let graph = &mut settings.memory.graph;
    if let Some(v) = env.parsed("LOOM_GRAPH_MAX_RETRIEVED", |s| parse_usize_range(s, 1, 10_000)) {
        graph.max_retrieved = v;
    }
    if let Some(v) = env.parsed("LOOM_INCLUDE_PATH", parse_bool) {
        graph.include_path = v;
    }
    if let Some(v) = env.parsed("LOOM_PATH_TRUNCATION", parse_path_truncation) {
        graph.path_truncation = v;
    }

    // ── Semantic index ──────────────────────────────────────────────
    let index = &mut settings.memory.index;
    if let Some(v) = env.parsed("LOOM_INDEX_MAX_RETRIEVED", |s| parse_usize_range(s, 1, 10_000)) {
        index.max_retrieved = v;
    }
    if let Some(v) = env.parsed("LOOM_INDEX_SCORE_THRESHOLD", parse_unit_f64) {
        index.score_threshold = v;
    }
    if let Some(v) = env.parsed("LOOM_CROSS_SEARCH", parse_bool) {
        index.enable_cross_search = v;
    }
    if let Some(v) = env.parsed("LOOM_EMBEDDING_DIMENSIONS", |s| parse_usize_range(s, 1, 8192)) {
        index.embedding_dimensions = v;
    }
    if let Some(v) = env.string("LOOM_INDEX_DB") {
        index.database_path = Some(v);
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `usize` within an inclusive range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

/// Parse a string as an `f64` within `[0, 1]`.
pub fn parse_unit_f64(val: &str) -> Option<f64> {
    let n: f64 = val.parse().ok()?;
    (0.0..=1.0).contains(&n).then_some(n)
}

/// Parse `compact` or `json`.
pub fn parse_log_format(val: &str) -> Option<LogFormat> {
    match val.to_lowercase().as_str() {
        "compact" => Some(LogFormat::Compact),
        "json" => Some(LogFormat::Json),
        _ => None,
    }
}

/// Parse `full` or `at_branch_point` (also `atBranchPoint`).
pub fn parse_path_truncation(val: &str) -> Option<PathTruncationSetting> {
    match val.to_lowercase().replace('_', "").as_str() {
        "full" => Some(PathTruncationSetting::Full),
        "atbranchpoint" => Some(PathTruncationSetting::AtBranchPoint),
        _ => None,
    }
}

// ── Env readers ─────────────────────────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let val = (self.lookup)(name)?;
        let result = parse(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid env var, ignoring");
        }
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
