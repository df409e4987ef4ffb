//! Interception and upstream forwarding of a single exchange.

use super::body::{full, ProxyBody};
use super::context::ProxyState;
use super::headers::strip_hop_by_hop;
use super::hooks::{InterceptedRequest, InterceptedResponse};
use crate::metrics;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode, Uri};
use std::time::Instant;
use tracing::{debug, error};

/// Helper function to create an error response.
pub fn error_response(status: StatusCode, message: &str) -> Response<ProxyBody> {
    let body = serde_json::json!({ "error": message }).to_string();
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(full(body))
        .unwrap()
}

/// Run the request hook, forward to `uri`, run the response hook.
///
/// `uri` must be absolute. Bodies stream through in both directions; only
/// headers are ever rewritten.
pub async fn intercept_and_forward(
    state: &ProxyState,
    req: Request<Incoming>,
    uri: Uri,
) -> Response<ProxyBody> {
    let id = state.next_request_id();
    let (mut parts, body) = req.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    parts.uri = uri;

    let intercepted = InterceptedRequest {
        id,
        method: parts.method.clone(),
        uri: parts.uri.clone(),
        headers: parts.headers.clone(),
    };
    state.hooks.before_request(&intercepted);

    debug!(request_id = id, "Forwarding {} {}", parts.method, parts.uri);
    let scheme = parts.uri.scheme_str().unwrap_or("http").to_string();
    let method = parts.method.clone();
    let upstream_req = Request::from_parts(parts, body.boxed());

    let start = Instant::now();
    match state.client.request(upstream_req).await {
        Ok(upstream_response) => {
            let (mut parts, body) = upstream_response.into_parts();
            metrics::record_upstream_duration(
                method.as_str(),
                parts.status.as_u16(),
                start.elapsed().as_secs_f64() * 1000.0,
            );
            strip_hop_by_hop(&mut parts.headers);

            let intercepted = InterceptedResponse {
                id,
                status: parts.status,
                headers: parts.headers.clone(),
            };
            if let Some(headers) = state.hooks.before_response(&intercepted) {
                parts.headers = headers;
            }
            Response::from_parts(parts, body.boxed())
        }
        Err(e) => {
            error!(request_id = id, "Failed to forward request to upstream: {e}");
            metrics::record_upstream_failure(&scheme);
            state.hooks.request_failed(id);
            error_response(StatusCode::BAD_GATEWAY, "Bad Gateway")
        }
    }
}
