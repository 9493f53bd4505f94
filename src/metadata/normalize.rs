use regex::Regex;
use std::sync::OnceLock;

/// Longest description kept from a metadata source, in characters.
pub const MAX_DESCRIPTION_CHARS: usize = 500;

/// Most subject tags kept from a metadata source.
pub const MAX_TAGS: usize = 5;

/// Strip hyphens and whitespace: `978-0-441-01359-3` -> `9780441013593`.
pub fn normalize_isbn(isbn: &str) -> String {
    isbn.chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .collect()
}

/// ISBN-10 (check digit may be `X`) or ISBN-13 after normalization.
pub fn is_valid_isbn(isbn: &str) -> bool {
    static ISBN: OnceLock<Regex> = OnceLock::new();
    let re = ISBN.get_or_init(|| Regex::new(r"^(?:\d{9}[\dXx]|\d{13})$").expect("valid regex"));
    re.is_match(&normalize_isbn(isbn))
}

/// Cut `text` to at most `max` characters, ending in `...` when shortened.
pub fn truncate(text: &str, max: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

/// First `MAX_TAGS` non-blank subjects, trimmed.
pub fn subject_tags(subjects: &[String]) -> Vec<String> {
    subjects
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .take(MAX_TAGS)
        .map(String::from)
        .collect()
}
