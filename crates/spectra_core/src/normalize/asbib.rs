//! NIST ASBib reference links for atomic reference keys.

use crate::ids::RefKind;
use once_cell::sync::Lazy;
use regex::Regex;

const ASBIB_BASE_URL: &str = "https://physics.nist.gov/cgi-bin/ASBib1/get_ASBib_ref.cgi";

static REF_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<kind>[ELT]):(?P<code>.+)$").expect("valid ref key regex"));

static REF_CODE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z]+(?P<db_id>\d+)(?P<comment>[A-Za-z]\d+)?$").expect("valid ref code regex")
});

/// Splits a kind-qualified key such as `L:L18361c138`.
pub fn parse_ref_key(key: &str) -> Option<(RefKind, &str)> {
    let caps = REF_KEY_RE.captures(key.trim())?;
    let kind = caps.name("kind")?.as_str().chars().next().and_then(RefKind::from_code)?;
    Some((kind, caps.name("code")?.as_str().trim()))
}

/// Rebuilds the ASBib popup URL for a reference key when the page did not
/// carry one. Empty query parameters are omitted.
pub fn reconstruct_asbib_url(key: &str, element: Option<&str>, charge: Option<i32>) -> Option<String> {
    let (kind, code) = parse_ref_key(key)?;
    let caps = REF_CODE_RE.captures(code)?;
    let db_id = caps.name("db_id")?.as_str();
    let comment = caps.name("comment").map_or("", |m| m.as_str());
    let charge = charge.map(|value| value.to_string()).unwrap_or_default();
    let kind_code = kind.code().to_string();

    let params = [
        ("db", "el"),
        ("db_id", db_id),
        ("comment_code", comment),
        ("element", element.unwrap_or("")),
        ("spectr_charge", charge.as_str()),
        ("type", kind_code.as_str()),
    ];
    let query = params
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("&");
    Some(format!("{ASBIB_BASE_URL}?{query}"))
}

#[cfg(test)]
mod tests {
    use super::{parse_ref_key, reconstruct_asbib_url};
    use crate::ids::RefKind;

    #[test]
    fn url_includes_comment_code_and_kind() {
        let url = reconstruct_asbib_url("L:L18361c138", Some("Fe"), Some(1)).unwrap();
        assert_eq!(
            url,
            "https://physics.nist.gov/cgi-bin/ASBib1/get_ASBib_ref.cgi?db=el&db_id=18361&comment_code=c138&element=Fe&spectr_charge=1&type=L"
        );
    }

    #[test]
    fn empty_params_are_omitted() {
        let url = reconstruct_asbib_url("E:L18349", None, None).unwrap();
        assert!(url.ends_with("?db=el&db_id=18349&type=E"));
    }

    #[test]
    fn malformed_keys_have_no_url() {
        assert_eq!(reconstruct_asbib_url("X:L1", None, None), None);
        assert_eq!(reconstruct_asbib_url("T:unknown", None, None), None);
        assert_eq!(
            parse_ref_key("T:T6892c83"),
            Some((RefKind::TransitionProbability, "T6892c83"))
        );
    }
}
