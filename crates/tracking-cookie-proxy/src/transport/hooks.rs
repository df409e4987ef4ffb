//! Hook points the transport exposes to interception logic.

use hyper::header::COOKIE;
use hyper::{HeaderMap, Method, StatusCode, Uri};

/// Per-exchange identifier assigned by the transport.
///
/// Monotonically increasing for the lifetime of a server; shared by a request
/// and the response it produced.
pub type RequestId = u64;

/// Request metadata handed to [`InterceptHooks::before_request`].
///
/// `uri` is always absolute (`scheme://authority/path?query`), including for
/// requests read from inside a CONNECT tunnel.
#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    pub id: RequestId,
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
}

impl InterceptedRequest {
    /// The request's cookies as a single header line.
    ///
    /// HTTP/1.1 clients send one `Cookie` header, but repeated headers are
    /// joined with `; ` rather than dropped.
    pub fn cookie_header(&self) -> Option<String> {
        let values: Vec<&str> = self
            .headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values.join("; "))
        }
    }
}

/// Response metadata handed to [`InterceptHooks::before_response`].
#[derive(Debug, Clone)]
pub struct InterceptedResponse {
    pub id: RequestId,
    pub status: StatusCode,
    pub headers: HeaderMap,
}

/// Synchronous interception callbacks.
///
/// Called concurrently from many connection tasks. Implementations must not
/// block or perform I/O.
pub trait InterceptHooks: Send + Sync + 'static {
    /// Observe a request before it is forwarded upstream.
    fn before_request(&self, request: &InterceptedRequest);

    /// Observe a response before it is relayed to the client. Returning
    /// `Some` replaces the response headers.
    fn before_response(&self, response: &InterceptedResponse) -> Option<HeaderMap>;

    /// The upstream exchange for `id` failed; no response will follow.
    fn request_failed(&self, _id: RequestId) {}
}
