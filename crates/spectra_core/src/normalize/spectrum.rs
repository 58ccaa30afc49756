//! Spectroscopic notation for atomic spectra (`Fe II`, `Ar 15+`).

use once_cell::sync::Lazy;
use regex::Regex;

static SPECTRUM_LABEL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z]{1,3})\s+(?:([IVXLCDMivxlcdm]+)|(\d+)\s*\+)\s*$")
        .expect("valid spectrum label regex")
});

/// Element and ion charge of a spectrum label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpectrumLabel {
    pub element: String,
    pub charge: i32,
}

impl SpectrumLabel {
    /// Canonical label with a Roman numeral stage, e.g. `Fe II`.
    pub fn canonical(&self) -> String {
        format!("{} {}", self.element, int_to_roman(self.charge.max(0) as u32 + 1))
    }
}

/// Parses `Fe II` (stage = charge + 1) or `Ar 15+` (explicit charge).
///
/// Returns `None` for anything that is not a spectrum label, including a
/// bare element symbol.
pub fn parse_spectrum_label(label: &str) -> Option<SpectrumLabel> {
    let caps = SPECTRUM_LABEL_RE.captures(label)?;
    let element = normalize_element(caps.get(1)?.as_str());

    let charge = if let Some(stage) = caps.get(2) {
        let stage = roman_to_int(stage.as_str())?;
        i32::try_from(stage).ok()? - 1
    } else {
        caps.get(3)?.as_str().parse::<i32>().ok()?
    };

    Some(SpectrumLabel { element, charge })
}

fn normalize_element(symbol: &str) -> String {
    let mut chars = symbol.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// Converts a Roman numeral with subtractive notation. Zero is not a stage.
pub fn roman_to_int(numeral: &str) -> Option<u32> {
    let mut total: u32 = 0;
    let mut previous: u32 = 0;
    for ch in numeral.trim().chars().rev() {
        let value = match ch.to_ascii_uppercase() {
            'I' => 1,
            'V' => 5,
            'X' => 10,
            'L' => 50,
            'C' => 100,
            'D' => 500,
            'M' => 1000,
            _ => return None,
        };
        if value < previous {
            total = total.checked_sub(value)?;
        } else {
            total += value;
            previous = value;
        }
    }
    (total > 0).then_some(total)
}

pub fn int_to_roman(mut value: u32) -> String {
    const TABLE: [(u32, &str); 13] = [
        (1000, "M"),
        (900, "CM"),
        (500, "D"),
        (400, "CD"),
        (100, "C"),
        (90, "XC"),
        (50, "L"),
        (40, "XL"),
        (10, "X"),
        (9, "IX"),
        (5, "V"),
        (4, "IV"),
        (1, "I"),
    ];
    let mut out = String::new();
    for (weight, symbol) in TABLE {
        while value >= weight {
            out.push_str(symbol);
            value -= weight;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{int_to_roman, parse_spectrum_label, roman_to_int, SpectrumLabel};

    #[test]
    fn roman_stage_maps_to_charge() {
        assert_eq!(
            parse_spectrum_label("Fe II"),
            Some(SpectrumLabel {
                element: "Fe".to_string(),
                charge: 1
            })
        );
        assert_eq!(parse_spectrum_label("fe i").map(|l| l.charge), Some(0));
        assert_eq!(parse_spectrum_label("Po LXVII").map(|l| l.charge), Some(66));
    }

    #[test]
    fn explicit_charge_form_is_accepted() {
        let label = parse_spectrum_label("Ar 15+").unwrap();
        assert_eq!(label.element, "Ar");
        assert_eq!(label.charge, 15);
        assert_eq!(label.canonical(), "Ar XVI");
    }

    #[test]
    fn formulas_and_names_are_not_labels() {
        assert_eq!(parse_spectrum_label("HF"), None);
        assert_eq!(parse_spectrum_label("Fe"), None);
        assert_eq!(parse_spectrum_label("Hydrogen fluoride"), None);
    }

    #[test]
    fn roman_numerals_use_subtractive_notation() {
        assert_eq!(roman_to_int("XIV"), Some(14));
        assert_eq!(roman_to_int("XLIX"), Some(49));
        assert_eq!(roman_to_int(""), None);
        assert_eq!(int_to_roman(67), "LXVII");
    }
}
