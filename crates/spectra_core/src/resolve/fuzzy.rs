//! Approximate matching for the last step of species resolution.
//!
//! Scores are token-sort ratios on a 0-100 scale: both strings are split
//! into lower-cased alphanumeric tokens, sorted, re-joined and compared
//! with normalized Levenshtein similarity.

use strsim::normalized_levenshtein;

/// Canonical token-sorted form of `text`.
pub fn token_sort_key(text: &str) -> String {
    let mut tokens: Vec<String> = text
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect();
    tokens.sort();
    tokens.join(" ")
}

/// Token-sort similarity of two strings, `0.0..=100.0`.
pub fn token_sort_ratio(left: &str, right: &str) -> f64 {
    let left = token_sort_key(left);
    let right = token_sort_key(right);
    if left.is_empty() && right.is_empty() {
        return 0.0;
    }
    normalized_levenshtein(&left, &right) * 100.0
}

/// Case-insensitive substring test used to keep obvious partial hits.
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    let needle = needle.trim().to_lowercase();
    !needle.is_empty() && haystack.to_lowercase().contains(&needle)
}
