use super::diagnostics::{self, Diagnostic};
use super::markers::{TrackingMarkers, TRACKING_COOKIE_NAME};
use super::pending::PendingRequestIndex;
use crate::metrics;
use crate::transport::RequestId;
use hyper::header::{HeaderValue, SET_COOKIE};
use hyper::HeaderMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Lifetime of the injected tracking cookie.
pub const TRACKING_COOKIE_MAX_AGE_SECS: u64 = 3600;

/// `Set-Cookie` value for a session's tracking cookie.
///
/// `SameSite=None` (which in turn requires `Secure`) lets browsers send the
/// cookie on cross-site requests.
pub fn tracking_set_cookie(session_id: &str) -> String {
    format!(
        "{TRACKING_COOKIE_NAME}={session_id}; max-age={TRACKING_COOKIE_MAX_AGE_SECS}; Secure; SameSite=None"
    )
}

/// Attaches the tracking cookie to responses whose request was tagged with
/// `pto_write_cookie=true`.
pub struct ResponseInjector {
    pending: Arc<PendingRequestIndex>,
    diagnostics: bool,
}

impl ResponseInjector {
    pub fn new(pending: Arc<PendingRequestIndex>, diagnostics: bool) -> Self {
        Self {
            pending,
            diagnostics,
        }
    }

    /// Inspect a response before it is relayed to the client.
    ///
    /// Returns the patched header set, or `None` to pass the response through
    /// untouched.
    pub fn on_response(&self, response_id: RequestId, headers: &HeaderMap) -> Option<HeaderMap> {
        let Some(url) = self.pending.take(response_id) else {
            warn!(
                response_id,
                "response has no pending request (never indexed or already evicted); passing through unmodified"
            );
            metrics::record_orphan_response();
            return None;
        };
        debug!(response_id, url = %url, headers = ?headers, "response observed");

        let markers = TrackingMarkers::from_uri(&url);
        if !markers.write_cookie {
            return None;
        }
        let session_id = markers.session_id()?;

        let set_cookie = tracking_set_cookie(session_id);
        let value = match HeaderValue::from_str(&set_cookie) {
            Ok(value) => value,
            Err(e) => {
                warn!(response_id, session_id, "session id is not a valid header value: {e}");
                return None;
            }
        };

        let mut patched = headers.clone();
        patched.insert(SET_COOKIE, value);
        metrics::record_cookie_injected();

        if self.diagnostics {
            let url = url.to_string();
            diagnostics::emit(&Diagnostic::Write {
                time: diagnostics::timestamp(),
                url: &url,
                session_id,
                write_cookie: markers.write_cookie,
                set_cookie_header: &set_cookie,
            });
        }

        Some(patched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::CONTENT_TYPE;
    use hyper::Uri;
    use std::time::Duration;
    use tracing_test::traced_test;

    fn setup() -> (ResponseInjector, Arc<PendingRequestIndex>) {
        let pending = Arc::new(PendingRequestIndex::new(Duration::from_secs(60), 1024));
        (ResponseInjector::new(Arc::clone(&pending), false), pending)
    }

    fn uri(s: &str) -> Uri {
        s.parse().unwrap()
    }

    fn upstream_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/html"));
        headers
    }

    #[test]
    fn test_set_cookie_format() {
        assert_eq!(
            tracking_set_cookie("S123"),
            "pto_cookie=S123; max-age=3600; Secure; SameSite=None"
        );
    }

    #[test]
    fn test_tagged_response_gets_cookie() {
        let (injector, pending) = setup();
        pending.insert(1, uri("https://a.test/?pto_write_cookie=true&sessionId=S123"));

        let patched = injector.on_response(1, &upstream_headers()).unwrap();
        assert_eq!(
            patched.get(SET_COOKIE).unwrap(),
            "pto_cookie=S123; max-age=3600; Secure; SameSite=None"
        );
        assert_eq!(patched.get(CONTENT_TYPE).unwrap(), "text/html");
        assert!(pending.is_empty());
    }

    #[test]
    fn test_existing_set_cookie_is_replaced() {
        let (injector, pending) = setup();
        pending.insert(1, uri("https://a.test/?sessionId=S1&pto_write_cookie=true"));

        let mut headers = upstream_headers();
        headers.append(SET_COOKIE, HeaderValue::from_static("a=1"));
        headers.append(SET_COOKIE, HeaderValue::from_static("b=2"));

        let patched = injector.on_response(1, &headers).unwrap();
        let values: Vec<_> = patched.get_all(SET_COOKIE).iter().collect();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0], "pto_cookie=S1; max-age=3600; Secure; SameSite=None");
    }

    #[test]
    fn test_untagged_response_unchanged() {
        let (injector, pending) = setup();
        pending.insert(1, uri("https://a.test/?sessionId=S123"));
        assert_eq!(injector.on_response(1, &upstream_headers()), None);
        // The entry is consumed even when nothing is injected.
        assert!(pending.is_empty());
    }

    #[test]
    fn test_write_without_session_unchanged() {
        let (injector, pending) = setup();
        pending.insert(1, uri("https://a.test/?pto_write_cookie=true"));
        pending.insert(2, uri("https://a.test/?pto_write_cookie=true&sessionId="));
        assert_eq!(injector.on_response(1, &upstream_headers()), None);
        assert_eq!(injector.on_response(2, &upstream_headers()), None);
    }

    #[test]
    fn test_unencodable_session_id_unchanged() {
        let (injector, pending) = setup();
        pending.insert(1, uri("https://a.test/?pto_write_cookie=true&sessionId=bad%0Aid"));
        assert_eq!(injector.on_response(1, &upstream_headers()), None);
    }

    #[test]
    #[traced_test]
    fn test_orphan_response_passes_through() {
        let (injector, _) = setup();
        assert_eq!(injector.on_response(99, &upstream_headers()), None);
        assert!(logs_contain("no pending request"));
    }

    #[test]
    #[traced_test]
    fn test_diagnostics_emitted_for_injection() {
        let pending = Arc::new(PendingRequestIndex::new(Duration::from_secs(60), 16));
        let injector = ResponseInjector::new(Arc::clone(&pending), true);
        pending.insert(5, uri("https://a.test/?pto_write_cookie=true&sessionId=S5"));
        injector.on_response(5, &upstream_headers()).unwrap();
        assert!(logs_contain("\"kind\":\"write\""));
        assert!(logs_contain("pto_cookie=S5"));
    }
}
