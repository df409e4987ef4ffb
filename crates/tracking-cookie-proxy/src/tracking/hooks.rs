use super::injector::ResponseInjector;
use super::inspector::RequestInspector;
use super::leak_store::SessionLeakStore;
use super::pending::PendingRequestIndex;
use crate::transport::{InterceptHooks, InterceptedRequest, InterceptedResponse, RequestId};
use hyper::HeaderMap;
use std::sync::Arc;
use tracing::debug;

/// Composes the inspector and injector over shared leak and pending state.
pub struct TrackingHooks {
    inspector: RequestInspector,
    injector: ResponseInjector,
    pending: Arc<PendingRequestIndex>,
}

impl TrackingHooks {
    pub fn new(
        leaks: Arc<SessionLeakStore>,
        pending: Arc<PendingRequestIndex>,
        diagnostics: bool,
    ) -> Self {
        Self {
            inspector: RequestInspector::new(Arc::clone(&pending), leaks, diagnostics),
            injector: ResponseInjector::new(Arc::clone(&pending), diagnostics),
            pending,
        }
    }
}

impl InterceptHooks for TrackingHooks {
    fn before_request(&self, request: &InterceptedRequest) {
        let cookie_header = request.cookie_header();
        let outcome = self
            .inspector
            .on_request(request.id, &request.uri, cookie_header.as_deref());
        debug!(request_id = request.id, method = %request.method, ?outcome, "request inspected");
    }

    fn before_response(&self, response: &InterceptedResponse) -> Option<HeaderMap> {
        self.injector.on_response(response.id, &response.headers)
    }

    fn request_failed(&self, id: RequestId) {
        if self.pending.take(id).is_some() {
            debug!(request_id = id, "dropped pending entry for failed exchange");
        }
    }
}
