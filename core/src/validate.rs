//! Client-side URL validation for audit submissions.
//!
//! Accepts an absolute http(s) URL or a bare domain, optionally followed
//! by a path. This is a usability gate, not a security boundary: the
//! backend normalizes and re-validates whatever it receives.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UrlError {
    #[error("url is empty")]
    Empty,
    #[error("unsupported scheme `{0}`, only http and https are analyzed")]
    Scheme(String),
    #[error("`{0}` is not an absolute url or a bare domain")]
    Invalid(String),
}

/// A submission string that passed the client-side checks. The value is
/// kept exactly as typed; normalization belongs to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckedUrl(String);

impl CheckedUrl {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CheckedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn bare_domain_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?)+(/\S*)?$",
        )
        .expect("bare domain pattern")
    })
}

/// Validate a raw submission. Whitespace around the input is ignored.
pub fn check_url(input: &str) -> Result<CheckedUrl, UrlError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }
    if let Some((scheme, _)) = trimmed.split_once("://") {
        if !scheme.eq_ignore_ascii_case("http") && !scheme.eq_ignore_ascii_case("https") {
            return Err(UrlError::Scheme(scheme.to_string()));
        }
        return match Url::parse(trimmed) {
            Ok(url) if url.host_str().is_some() => Ok(CheckedUrl(trimmed.to_string())),
            _ => Err(UrlError::Invalid(trimmed.to_string())),
        };
    }
    if bare_domain_re().is_match(trimmed) {
        Ok(CheckedUrl(trimmed.to_string()))
    } else {
        Err(UrlError::Invalid(trimmed.to_string()))
    }
}
