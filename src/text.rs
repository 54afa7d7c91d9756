//! Text normalization, prompt-injection sanitization and content hashing.

use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

/// Phrases that try to steer the model. Matched case-insensitively.
const SUSPICIOUS_PATTERNS: &[&str] = &[
    r"ignore\s+(?:all\s+)?previous",
    r"system\s+prompt",
    r"developer\s+message",
    r"you\s+are\s+chatgpt",
    r"act\s+as",
    r"follow\s+these\s+instructions",
    r"do\s+not\s+follow",
];

/// Each pattern compiled twice: once to drop the whole sentence carrying it, once
/// to catch a bare match left behind (e.g. without sentence punctuation).
static SANITIZERS: LazyLock<Vec<(Regex, Regex)>> = LazyLock::new(|| {
    SUSPICIOUS_PATTERNS
        .iter()
        .filter_map(|p| {
            let sentence = Regex::new(&format!(r"(?i)[^.?!]*{p}[^.?!]*[.?!]?")).ok()?;
            let bare = Regex::new(&format!("(?i){p}")).ok()?;
            Some((sentence, bare))
        })
        .collect()
});

pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cut `text` to at most `max_chars` characters without splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Remove prompt-injection phrases, collapse whitespace and cap the length.
pub fn sanitize_raw_text(text: &str, max_chars: usize) -> String {
    let mut cleaned = text.to_string();
    for (sentence, bare) in SANITIZERS.iter() {
        cleaned = sentence.replace_all(&cleaned, " ").into_owned();
        cleaned = bare.replace_all(&cleaned, " ").into_owned();
    }
    let cleaned = normalize_text(&cleaned);
    truncate_chars(&cleaned, max_chars).to_string()
}

/// SHA-256 over the normalized parts joined with `|`, hex encoded.
pub fn compute_content_hash(parts: &[&str]) -> String {
    let payload = parts
        .iter()
        .map(|p| normalize_text(p))
        .collect::<Vec<_>>()
        .join("|");
    hex::encode(Sha256::digest(payload.as_bytes()))
}

pub fn compute_draft_hash(
    project_id: i64,
    source_item_id: i64,
    template_id: Option<&str>,
    raw_text: &str,
) -> String {
    compute_content_hash(&[
        &project_id.to_string(),
        &source_item_id.to_string(),
        template_id.unwrap_or(""),
        raw_text,
    ])
}
