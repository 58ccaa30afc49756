//! Cell-level parsing shared by the source normalizers.
//!
//! # Responsibility
//! - Turn table cell text into numbers, suffixes, level triplets and
//!   reference code lists.
//!
//! # Invariants
//! - Parsing never panics and never guesses: text that is not cleanly a
//!   number (optionally with a short letter qualifier) stays text.

use once_cell::sync::Lazy;
use regex::Regex;

static FLOAT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[-+]?\d+(?:\.\d+)?(?:[eE][-+]?\d+)?").expect("valid float regex")
});

static LEADING_FLOAT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[-+]?\d+(?:\.(\d+))?(?:[eE][-+]?\d+)?").expect("valid leading float regex")
});

static UNSIGNED_FLOAT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d+(?:\.\d+)?(?:[eE][-+]?\d+)?").expect("valid unsigned float regex")
});

static REF_SPLIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*,\s*").expect("valid reference split regex"));

const MAX_SUFFIX_CHARS: usize = 3;

/// Collapses whitespace (including no-break spaces) and trims.
pub fn clean_text(raw: &str) -> String {
    raw.split(|ch: char| ch.is_whitespace() || ch == '\u{a0}')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Cleaned text, or `None` when blank.
pub fn non_blank(raw: &str) -> Option<String> {
    let cleaned = clean_text(raw);
    (!cleaned.is_empty()).then_some(cleaned)
}

/// Extracts the first float in a cell, ignoring brackets, commas and spaces.
pub fn parse_float(raw: &str) -> Option<f64> {
    let compact = strip_decorations(raw);
    FLOAT_RE
        .find(&compact)
        .and_then(|found| found.as_str().parse::<f64>().ok())
}

/// Parses an angular momentum quantum number, including fractions (`3/2`).
pub fn parse_quantum_number(raw: &str) -> Option<f64> {
    let compact = strip_decorations(raw);
    if let Some((num, den)) = compact.split_once('/') {
        let num = num.parse::<f64>().ok()?;
        let den = den.parse::<f64>().ok()?;
        if den == 0.0 {
            return None;
        }
        return Some(num / den);
    }
    parse_float(&compact)
}

/// Splits a packed `Ei - Ek` cell into lower and upper energies.
pub fn parse_energy_pair(raw: &str) -> (Option<f64>, Option<f64>) {
    let compact = strip_decorations(raw);
    let mut values = UNSIGNED_FLOAT_RE
        .find_iter(&compact)
        .filter_map(|found| found.as_str().parse::<f64>().ok());
    (values.next(), values.next())
}

fn strip_decorations(raw: &str) -> String {
    raw.chars()
        .filter(|ch| !ch.is_whitespace() && !matches!(ch, '\u{a0}' | ',' | '[' | ']' | '(' | ')'))
        .collect()
}

/// Configuration, term and J of a level cell such as `3d6.4s a 6D 9/2`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LevelTriplet {
    pub configuration: Option<String>,
    pub term: Option<String>,
    pub j: Option<String>,
}

/// First token is the configuration, the last the J value, and whatever sits
/// between is the term (terms may contain spaces).
pub fn split_level_triplet(raw: &str) -> Option<LevelTriplet> {
    let cleaned = clean_text(raw);
    let tokens: Vec<&str> = cleaned.split(' ').filter(|t| !t.is_empty()).collect();
    match tokens.as_slice() {
        [] => None,
        [configuration] => Some(LevelTriplet {
            configuration: Some((*configuration).to_string()),
            ..LevelTriplet::default()
        }),
        [configuration, term] => Some(LevelTriplet {
            configuration: Some((*configuration).to_string()),
            term: Some((*term).to_string()),
            j: None,
        }),
        [configuration, middle @ .., j] => Some(LevelTriplet {
            configuration: Some((*configuration).to_string()),
            term: Some(middle.join(" ")),
            j: Some((*j).to_string()),
        }),
    }
}

/// Splits a comma separated reference cell, keeping first-seen order.
pub fn split_ref_codes(raw: &str) -> Vec<String> {
    let cleaned = clean_text(raw);
    let mut codes: Vec<String> = Vec::new();
    for code in REF_SPLIT_RE.split(&cleaned) {
        let code = code.trim();
        if !code.is_empty() && !codes.iter().any(|seen| seen == code) {
            codes.push(code.to_string());
        }
    }
    codes
}

/// Classified content of a value cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Number { value: f64, suffix: Option<String> },
    Text(String),
}

/// A value cell with the flags observed while parsing it.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCell {
    pub value: CellValue,
    pub cleaned: String,
    /// The value was wrapped in `()` or `[]`.
    pub bracketed: bool,
    /// Digits after the decimal point in the numeric token.
    pub decimals: Option<usize>,
    pub token: Option<String>,
}

/// Classifies a cell as a number (with optional letter qualifier), text, or empty.
///
/// `2169.81358 Z` is a number with suffix `Z`; `see note` or `1s2 2s2` stay text.
pub fn parse_value_cell(raw: &str) -> ParsedCell {
    let cleaned = clean_text(raw);
    let bracketed = cleaned.contains(['(', ')', '[', ']']);
    let mut parsed = ParsedCell {
        value: CellValue::Empty,
        cleaned: cleaned.clone(),
        bracketed,
        decimals: None,
        token: None,
    };
    if cleaned.is_empty() {
        return parsed;
    }

    let compact = strip_decorations(&cleaned);
    let Some(caps) = LEADING_FLOAT_RE.captures(&compact) else {
        parsed.value = CellValue::Text(cleaned);
        return parsed;
    };
    let Some(whole) = caps.get(0) else {
        parsed.value = CellValue::Text(cleaned);
        return parsed;
    };
    let Ok(value) = whole.as_str().parse::<f64>() else {
        parsed.value = CellValue::Text(cleaned);
        return parsed;
    };

    let remainder = &compact[whole.end()..];
    let suffix = if remainder.is_empty() {
        None
    } else if remainder.chars().count() <= MAX_SUFFIX_CHARS
        && remainder.chars().all(|ch| ch.is_ascii_alphabetic())
    {
        Some(remainder.to_string())
    } else {
        parsed.value = CellValue::Text(cleaned);
        return parsed;
    };

    parsed.decimals = Some(caps.get(1).map_or(0, |digits| digits.as_str().len()));
    parsed.token = Some(whole.as_str().to_string());
    parsed.value = CellValue::Number { value, suffix };
    parsed
}

/// Splits a trailing single qualifier letter off free text (`A-X R` -> `A-X`, `R`).
pub fn split_trailing_letter(raw: &str) -> (String, Option<String>) {
    let cleaned = clean_text(raw);
    if let Some((head, tail)) = cleaned.rsplit_once(' ') {
        if tail.len() == 1 && tail.chars().all(|ch| ch.is_ascii_alphabetic()) {
            return (head.to_string(), Some(tail.to_string()));
        }
    }
    (cleaned, None)
}

#[cfg(test)]
mod tests {
    use super::{
        clean_text, parse_energy_pair, parse_float, parse_quantum_number, parse_value_cell,
        split_level_triplet, split_ref_codes, split_trailing_letter, CellValue,
    };

    #[test]
    fn clean_text_collapses_whitespace() {
        assert_eq!(clean_text("  a\u{a0}\u{a0}b \n c "), "a b c");
    }

    #[test]
    fn floats_ignore_brackets_and_spaces() {
        assert_eq!(parse_float("[112 994.097]"), Some(112994.097));
        assert_eq!(parse_float("(1.2e-3)"), Some(0.0012));
        assert_eq!(parse_float("--"), None);
    }

    #[test]
    fn quantum_numbers_accept_fractions() {
        assert_eq!(parse_quantum_number("9/2"), Some(4.5));
        assert_eq!(parse_quantum_number("2"), Some(2.0));
        assert_eq!(parse_quantum_number("1/0"), None);
    }

    #[test]
    fn packed_energy_cell_splits_into_pair() {
        assert_eq!(
            parse_energy_pair("1872.5998 - 112 994.097"),
            (Some(1872.5998), Some(112994.097))
        );
        assert_eq!(parse_energy_pair("0.000"), (Some(0.0), None));
    }

    #[test]
    fn level_triplet_keeps_multi_word_term() {
        let triplet = split_level_triplet("3d6.(5D).4s  a 6D  9/2").unwrap();
        assert_eq!(triplet.configuration.as_deref(), Some("3d6.(5D).4s"));
        assert_eq!(triplet.term.as_deref(), Some("a 6D"));
        assert_eq!(triplet.j.as_deref(), Some("9/2"));
        assert_eq!(split_level_triplet("   "), None);
    }

    #[test]
    fn ref_codes_keep_order_and_drop_duplicates() {
        assert_eq!(
            split_ref_codes("T6892c83 , T7771, T6892c83,"),
            vec!["T6892c83".to_string(), "T7771".to_string()]
        );
    }

    #[test]
    fn value_cell_splits_letter_suffix() {
        let cell = parse_value_cell("2169.81358 Z");
        assert_eq!(
            cell.value,
            CellValue::Number {
                value: 2169.81358,
                suffix: Some("Z".to_string())
            }
        );
        assert_eq!(cell.decimals, Some(5));
    }

    #[test]
    fn value_cell_flags_brackets() {
        let cell = parse_value_cell("(13.29)");
        assert!(cell.bracketed);
        assert_eq!(
            cell.value,
            CellValue::Number {
                value: 13.29,
                suffix: None
            }
        );
    }

    #[test]
    fn descriptive_cells_stay_text() {
        assert_eq!(
            parse_value_cell("see note").value,
            CellValue::Text("see note".to_string())
        );
        assert_eq!(
            parse_value_cell("1s2 2s2").value,
            CellValue::Text("1s2 2s2".to_string())
        );
        assert_eq!(parse_value_cell(" ").value, CellValue::Empty);
    }

    #[test]
    fn trailing_letter_is_split_from_text() {
        assert_eq!(
            split_trailing_letter("A <-> X R"),
            ("A <-> X".to_string(), Some("R".to_string()))
        );
        assert_eq!(split_trailing_letter("B-X"), ("B-X".to_string(), None));
    }
}
