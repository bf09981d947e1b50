//! URL handling module for Civic-Collector
//!
//! This module provides link resolution, filename derivation, query-parameter
//! lookup and the predicate matching used by discovery and classification.

mod matcher;

pub use matcher::CompiledPredicate;

use crate::{UrlError, UrlResult};
use url::Url;

/// Parses a URL and requires an http(s) scheme and a host
///
/// # Examples
///
/// ```
/// use civic_collector::url::parse_http_url;
///
/// assert!(parse_http_url("https://example.com/a").is_ok());
/// assert!(parse_http_url("mailto:clerk@example.com").is_err());
/// ```
pub fn parse_http_url(raw: &str) -> UrlResult<Url> {
    let url = Url::parse(raw.trim()).map_err(|e| UrlError::Parse(format!("{}: {}", raw, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    if url.host_str().is_none() {
        return Err(UrlError::MissingHost(raw.to_string()));
    }

    Ok(url)
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - fragment-only anchors
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
pub fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
        || lower.starts_with("data:")
    {
        return None;
    }

    if href.starts_with('#') {
        return None;
    }

    match base_url.join(href) {
        Ok(absolute_url) => {
            if absolute_url.scheme() == "http" || absolute_url.scheme() == "https" {
                Some(absolute_url)
            } else {
                None
            }
        }
        Err(_) => None,
    }
}

/// Last non-empty path segment of the url, or `"document"`
///
/// ```
/// use civic_collector::url::filename_from_url;
/// use url::Url;
///
/// let url = Url::parse("https://example.com/docs/agenda.pdf?x=1").unwrap();
/// assert_eq!(filename_from_url(&url), "agenda.pdf");
/// ```
pub fn filename_from_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "document".to_string())
}

/// Value of the first query parameter called `name` (name compared ASCII
/// case-insensitively)
pub fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.into_owned())
}

/// Lowercased host of a url string
pub fn host_of(raw: &str) -> Option<String> {
    Url::parse(raw)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
}
