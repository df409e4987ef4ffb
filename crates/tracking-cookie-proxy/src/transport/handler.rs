//! Request dispatch for the proxy listener.

use super::body::ProxyBody;
use super::context::ProxyState;
use super::forwarding::{error_response, intercept_and_forward};
use super::tunnel::handle_connect;
use hyper::body::Incoming;
use hyper::header::HOST;
use hyper::{Method, Request, Response, StatusCode};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::debug;

/// Handle a request read from a client connection.
///
/// - `CONNECT host:port` is intercepted as a TLS tunnel.
/// - Absolute-form requests are forwarded, except to the certificate host.
/// - Origin-form requests are only answered for the certificate host.
pub async fn handle_request(
    state: Arc<ProxyState>,
    req: Request<Incoming>,
) -> Result<Response<ProxyBody>, Infallible> {
    debug!("Received request: {} {}", req.method(), req.uri());

    if req.method() == Method::CONNECT {
        return Ok(handle_connect(state, req));
    }

    if let Some(host) = req.uri().host() {
        if state.routes.matches_host(host) {
            return Ok(state.routes.respond(req.method(), req.uri().path()));
        }
        let uri = req.uri().clone();
        return Ok(intercept_and_forward(&state, req, uri).await);
    }

    let host_header = req
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    match host_header {
        Some(host) if state.routes.matches_host(&host) => {
            Ok(state.routes.respond(req.method(), req.uri().path()))
        }
        _ => Ok(error_response(
            StatusCode::BAD_REQUEST,
            "Proxy requests must use absolute-form or CONNECT",
        )),
    }
}
