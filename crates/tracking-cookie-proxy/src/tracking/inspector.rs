use super::diagnostics::{self, Diagnostic};
use super::leak_store::SessionLeakStore;
use super::markers::{hostname, TrackingMarkers, TRACKING_COOKIE_NAME};
use super::pending::PendingRequestIndex;
use crate::cookies::parse_cookies;
use crate::metrics;
use crate::transport::RequestId;
use hyper::Uri;
use std::sync::Arc;
use tracing::{debug, info};

/// What the inspector concluded about one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The request was not tagged with `pto_read_cookie=true`.
    Untagged,
    /// Tagged, but the tracking cookie was absent or did not match the session.
    NoMatch,
    /// The session's tracking cookie came back to this host.
    Leak { newly_recorded: bool },
}

/// Detects tracking cookies echoed back to a host other than the one that
/// set them.
pub struct RequestInspector {
    pending: Arc<PendingRequestIndex>,
    leaks: Arc<SessionLeakStore>,
    diagnostics: bool,
}

impl RequestInspector {
    pub fn new(
        pending: Arc<PendingRequestIndex>,
        leaks: Arc<SessionLeakStore>,
        diagnostics: bool,
    ) -> Self {
        Self {
            pending,
            leaks,
            diagnostics,
        }
    }

    /// Inspect a request before it is forwarded upstream.
    ///
    /// Every request is indexed for the response hook, tagged or not.
    pub fn on_request(
        &self,
        request_id: RequestId,
        url: &Uri,
        cookie_header: Option<&str>,
    ) -> ReadOutcome {
        let markers = TrackingMarkers::from_uri(url);
        self.pending.insert(request_id, url.clone());
        metrics::record_inspection(markers.read_cookie);

        if !markers.read_cookie {
            return ReadOutcome::Untagged;
        }

        let cookies = parse_cookies(cookie_header);
        if cookies.rejected() > 0 {
            debug!(
                request_id,
                rejected = cookies.rejected(),
                "skipped malformed cookie segments"
            );
        }
        let observed = cookies.get(TRACKING_COOKIE_NAME);

        let outcome = match (markers.session_id(), observed) {
            (Some(session_id), Some(cookie)) if session_id == cookie => match hostname(url) {
                Some(host) => {
                    let newly_recorded = self.leaks.record_leak(session_id, &host);
                    if newly_recorded {
                        info!(session_id, host = %host, "tracking cookie leaked cross-site");
                        metrics::record_leak();
                    }
                    ReadOutcome::Leak { newly_recorded }
                }
                None => {
                    debug!(request_id, url = %url, "matching cookie on a URL without host");
                    ReadOutcome::NoMatch
                }
            },
            _ => ReadOutcome::NoMatch,
        };

        if self.diagnostics {
            let url = url.to_string();
            diagnostics::emit(&Diagnostic::Read {
                time: diagnostics::timestamp(),
                url: &url,
                read_cookie: markers.read_cookie,
                session_id: markers.session_id(),
                pto_cookie: observed,
                leak: matches!(outcome, ReadOutcome::Leak { .. }),
            });
        }

        outcome
    }
}
