//! Core utilities and shared types for the audit console crates.

pub mod validate;

use std::borrow::Cow;
use std::cmp::Ordering;

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Newest-first order for optional RFC 3339 stamps, comparing instants so
/// `+02:00` and `Z` forms order chronologically rather than textually.
/// Missing and unparseable values sort last, as equals.
pub fn rfc3339_desc(a: Option<&str>, b: Option<&str>) -> Ordering {
    let parse = |raw: Option<&str>| raw.and_then(|r| OffsetDateTime::parse(r, &Rfc3339).ok());
    parse(b).cmp(&parse(a))
}

/// Clamp a score to the displayable 0..=100 range. Report documents may
/// carry values outside it; the console never shows them raw.
pub fn clamp_score(score: i64) -> u8 {
    score.clamp(0, 100) as u8
}

/// Pretty-print a raw JSON string with stable indentation. Input that is
/// not valid JSON comes back unchanged.
pub fn pretty_json(raw: &str) -> Cow<'_, str> {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) => match serde_json::to_string_pretty(&value) {
            Ok(pretty) => Cow::Owned(pretty),
            Err(_) => Cow::Borrowed(raw),
        },
        Err(_) => Cow::Borrowed(raw),
    }
}

/// Shorten a report token for display in logs and footers. Short or
/// malformed tokens collapse to a fixed mask so no full value ever leaks.
pub fn abbrev_token(token: &str) -> String {
    if token.len() > 8 {
        if let (Some(head), Some(tail)) = (token.get(..4), token.get(token.len() - 4..)) {
            return format!("{head}…{tail}");
        }
    }
    "****".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!version().is_empty());
    }

    #[test]
    fn clamp_score_bounds() {
        assert_eq!(clamp_score(137), 100);
        assert_eq!(clamp_score(-5), 0);
        assert_eq!(clamp_score(0), 0);
        assert_eq!(clamp_score(100), 100);
        assert_eq!(clamp_score(72), 72);
    }

    #[test]
    fn rfc3339_desc_compares_instants_not_strings() {
        // 08:00+02:00 is 06:00 UTC, so the 07:00Z stamp is the newer one
        // even though it compares smaller as a string.
        let offset = Some("2025-08-21T08:00:00+02:00");
        let utc = Some("2025-08-21T07:00:00Z");
        assert_eq!(rfc3339_desc(utc, offset), Ordering::Less);
        assert_eq!(rfc3339_desc(offset, utc), Ordering::Greater);
    }

    #[test]
    fn rfc3339_desc_sorts_missing_and_malformed_last() {
        let dated = Some("2025-08-21T07:00:00Z");
        assert_eq!(rfc3339_desc(dated, None), Ordering::Less);
        assert_eq!(rfc3339_desc(None, dated), Ordering::Greater);
        assert_eq!(rfc3339_desc(dated, Some("yesterday-ish")), Ordering::Less);
        assert_eq!(rfc3339_desc(None, Some("yesterday-ish")), Ordering::Equal);
    }

    #[test]
    fn pretty_json_formats_and_is_idempotent() {
        let raw = r#"{"b":1,"a":[1,2]}"#;
        let once = pretty_json(raw).into_owned();
        assert!(once.contains("\n"));
        let twice = pretty_json(&once).into_owned();
        assert_eq!(once, twice);
    }

    #[test]
    fn pretty_json_passes_invalid_input_through() {
        assert_eq!(pretty_json("not json {"), "not json {");
        assert_eq!(pretty_json(""), "");
    }

    #[test]
    fn abbrev_token_masks_short_values() {
        assert_eq!(abbrev_token(""), "****");
        assert_eq!(abbrev_token("abcd1234"), "****");
    }

    #[test]
    fn abbrev_token_keeps_head_and_tail() {
        assert_eq!(abbrev_token("abcd12345wxyz"), "abcd…wxyz");
    }

    #[test]
    fn abbrev_token_survives_multibyte_input() {
        // Not a valid token shape, but it must not panic on char boundaries.
        assert_eq!(abbrev_token("日本語のトークン値"), "****");
    }
}
