//! Formula token handling for the reversed-order fallback.

use once_cell::sync::Lazy;
use regex::Regex;

static FORMULA_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<body>(?:[A-Z][a-z]?\d*)+)(?P<charge>[+-]\d*)?$").expect("valid formula regex")
});
static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Z][a-z]?\d*").expect("valid formula token regex"));

/// Splits a formula into element tokens with their counts, e.g. `H2O` ->
/// `["H2", "O"]`. Returns `None` for text that is not a plain formula.
pub fn formula_tokens(formula: &str) -> Option<(Vec<&str>, &str)> {
    let captures = FORMULA_RE.captures(formula.trim())?;
    let body = captures.name("body")?.as_str();
    let charge = captures.name("charge").map_or("", |m| m.as_str());
    let tokens = TOKEN_RE.find_iter(body).map(|m| m.as_str()).collect();
    Some((tokens, charge))
}

/// Reverses the element token order of a formula, keeping any trailing
/// charge: `HF` -> `FH`, `DH+` -> `HD+`, `HfO` -> `OHf`.
///
/// Returns `None` when there is nothing to reverse (single token, names,
/// palindromic token order).
pub fn reverse_formula_tokens(formula: &str) -> Option<String> {
    let (tokens, charge) = formula_tokens(formula)?;
    if tokens.len() < 2 {
        return None;
    }
    let mut reversed: String = tokens.iter().rev().copied().collect();
    reversed.push_str(charge);
    if reversed == formula.trim() {
        return None;
    }
    Some(reversed)
}
