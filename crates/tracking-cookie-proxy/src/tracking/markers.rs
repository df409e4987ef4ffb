//! Query-parameter protocol spoken by the test harness.
//!
//! Tracked traffic carries `sessionId` plus one of the `pto_read_cookie` /
//! `pto_write_cookie` flags in the URL query string. Everything else is plain
//! passthrough traffic.

use hyper::Uri;
use std::collections::HashMap;

pub const SESSION_ID_PARAM: &str = "sessionId";
pub const READ_COOKIE_PARAM: &str = "pto_read_cookie";
pub const WRITE_COOKIE_PARAM: &str = "pto_write_cookie";

/// Name of the cookie injected on tagged responses.
pub const TRACKING_COOKIE_NAME: &str = "pto_cookie";

/// Markers extracted from a request URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackingMarkers {
    session_id: Option<String>,
    pub read_cookie: bool,
    pub write_cookie: bool,
}

impl TrackingMarkers {
    pub fn from_uri(uri: &Uri) -> Self {
        Self::from_query(uri.query())
    }

    pub fn from_query(query: Option<&str>) -> Self {
        let params = parse_query_string(query);
        Self {
            session_id: params.get(SESSION_ID_PARAM).cloned(),
            read_cookie: is_true_flag(params.get(READ_COOKIE_PARAM)),
            write_cookie: is_true_flag(params.get(WRITE_COOKIE_PARAM)),
        }
    }

    /// The session identifier, if present and non-empty.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref().filter(|id| !id.is_empty())
    }

    pub fn is_tagged(&self) -> bool {
        self.read_cookie || self.write_cookie
    }
}

// Only the literal "true" switches a flag on.
fn is_true_flag(value: Option<&String>) -> bool {
    value.is_some_and(|v| v == "true")
}

/// Parse a URL query string into a map of decoded parameters.
///
/// The first occurrence of a repeated name wins. `+` decodes to a space, as
/// in `application/x-www-form-urlencoded`.
pub fn parse_query_string(query: Option<&str>) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let Some(query) = query else {
        return params;
    };
    for pair in query.split('&').filter(|pair| !pair.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        params
            .entry(decode_component(key))
            .or_insert_with(|| decode_component(value));
    }
    params
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

/// Lowercase hostname of an absolute URL, without port.
pub fn hostname(uri: &Uri) -> Option<String> {
    uri.host()
        .filter(|host| !host.is_empty())
        .map(|host| host.to_ascii_lowercase())
}
