//! `Cookie` request header parsing.
//!
//! A `Cookie` header is a `;`-separated list of `name=value` pairs. Only the
//! first `=` of each pair separates name from value, so values may contain
//! `=` themselves. Surrounding whitespace is trimmed from both halves and the
//! last occurrence of a duplicated name wins.
//!
//! Segments that carry no `=` (or whose name is empty) are malformed. The
//! lenient [`parse_cookies`] skips them and counts them in
//! [`CookieMap::rejected`]; the strict [`try_parse_cookies`] fails on the
//! first one. Neither panics.

use std::collections::HashMap;
use thiserror::Error;

/// Error returned by [`try_parse_cookies`] for a malformed segment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CookieParseError {
    #[error("cookie segment '{0}' has no '=' separator")]
    MissingSeparator(String),
    #[error("cookie segment '{0}' has an empty name")]
    EmptyName(String),
}

/// Cookies parsed out of a single `Cookie` header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieMap {
    entries: HashMap<String, String>,
    rejected: usize,
}

impl CookieMap {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of malformed segments skipped while parsing.
    pub fn rejected(&self) -> usize {
        self.rejected
    }
}

/// Parse a `Cookie` header, skipping malformed segments.
///
/// Absent, empty and whitespace-only headers yield an empty map.
pub fn parse_cookies(header: Option<&str>) -> CookieMap {
    let mut cookies = CookieMap::default();
    for segment in segments(header) {
        match split_segment(segment) {
            Ok((name, value)) => {
                cookies.entries.insert(name.to_string(), value.to_string());
            }
            Err(_) => cookies.rejected += 1,
        }
    }
    cookies
}

/// Parse a `Cookie` header, failing on the first malformed segment.
pub fn try_parse_cookies(header: Option<&str>) -> Result<CookieMap, CookieParseError> {
    let mut cookies = CookieMap::default();
    for segment in segments(header) {
        let (name, value) = split_segment(segment)?;
        cookies.entries.insert(name.to_string(), value.to_string());
    }
    Ok(cookies)
}

fn segments<'a>(header: Option<&'a str>) -> impl Iterator<Item = &'a str> {
    header
        .into_iter()
        .flat_map(|h| h.split(';'))
        .filter(|segment| !segment.trim().is_empty())
}

fn split_segment(segment: &str) -> Result<(&str, &str), CookieParseError> {
    let (name, value) = segment
        .split_once('=')
        .ok_or_else(|| CookieParseError::MissingSeparator(segment.trim().to_string()))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(CookieParseError::EmptyName(segment.trim().to_string()));
    }
    Ok((name, value.trim()))
}
