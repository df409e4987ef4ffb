//! CONNECT interception.
//!
//! The client's tunnel is terminated locally with a leaf certificate for the
//! requested host, and the decrypted HTTP/1.1 requests are intercepted and
//! forwarded like plain proxy traffic.

use super::body::{empty, ProxyBody};
use super::context::ProxyState;
use super::forwarding::{error_response, intercept_and_forward};
use hyper::body::Incoming;
use hyper::http::uri::{Authority, Scheme};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode, Uri};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, warn};

/// Answer a CONNECT request and take over the upgraded connection.
pub fn handle_connect(state: Arc<ProxyState>, req: Request<Incoming>) -> Response<ProxyBody> {
    let Some(authority) = req.uri().authority().cloned() else {
        warn!("CONNECT without authority: {}", req.uri());
        return error_response(StatusCode::BAD_REQUEST, "CONNECT target must be host:port");
    };

    let server_config = match state.ca.server_config_for_host(authority.host()) {
        Ok(config) => config,
        Err(e) => {
            warn!(host = authority.host(), "Cannot intercept tunnel: {e}");
            return error_response(StatusCode::BAD_GATEWAY, "Certificate issuance failed");
        }
    };

    let mut shutdown = state.shutdown_signal();
    let tasks_state = Arc::clone(&state);
    tasks_state.tasks.spawn(async move {
        let upgraded = match hyper::upgrade::on(req).await {
            Ok(upgraded) => upgraded,
            Err(e) => {
                warn!(authority = %authority, "upgrade error: {e}");
                return;
            }
        };

        let acceptor = TlsAcceptor::from(server_config);
        let tls_stream = match acceptor.accept(TokioIo::new(upgraded)).await {
            Ok(stream) => stream,
            Err(e) => {
                debug!(authority = %authority, "TLS handshake inside tunnel failed: {e}");
                return;
            }
        };

        let io = TokioIo::new(tls_stream);
        let service_state = Arc::clone(&state);
        let service_authority = authority.clone();
        let service = service_fn(move |req| {
            let state = Arc::clone(&service_state);
            let authority = service_authority.clone();
            async move { Ok::<_, Infallible>(handle_tunneled(&state, &authority, req).await) }
        });

        let conn = http1::Builder::new().serve_connection(io, service);
        tokio::pin!(conn);
        tokio::select! {
            result = conn.as_mut() => {
                if let Err(e) = result {
                    debug!(authority = %authority, "Tunnel connection ended: {e}");
                }
            }
            _ = shutdown.recv() => {
                conn.as_mut().graceful_shutdown();
                let _ = conn.await;
            }
        }
    });

    Response::new(empty())
}

async fn handle_tunneled(
    state: &ProxyState,
    authority: &Authority,
    req: Request<Incoming>,
) -> Response<ProxyBody> {
    if state.routes.matches_host(authority.host()) {
        return state.routes.respond(req.method(), req.uri().path());
    }

    match tunneled_uri(authority, req.uri()) {
        Ok(uri) => intercept_and_forward(state, req, uri).await,
        Err(e) => {
            warn!(authority = %authority, "Invalid tunneled request target: {e}");
            error_response(StatusCode::BAD_REQUEST, "Invalid request target")
        }
    }
}

/// Absolute `https://` URI for a request read from inside a tunnel to
/// `authority`.
pub(crate) fn tunneled_uri(authority: &Authority, uri: &Uri) -> Result<Uri, hyper::http::Error> {
    if uri.scheme().is_some() && uri.authority().is_some() {
        return Ok(uri.clone());
    }
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let authority = match authority.port_u16() {
        Some(443) => authority.host().to_string(),
        _ => authority.as_str().to_string(),
    };
    Ok(Uri::builder()
        .scheme(Scheme::HTTPS)
        .authority(authority)
        .path_and_query(path_and_query)
        .build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tunneled_uri_from_origin_form() {
        let authority: Authority = "b.test:443".parse().unwrap();
        let uri: Uri = "/?sessionId=S1&pto_read_cookie=true".parse().unwrap();
        assert_eq!(
            tunneled_uri(&authority, &uri).unwrap().to_string(),
            "https://b.test/?sessionId=S1&pto_read_cookie=true"
        );
    }

    #[test]
    fn test_tunneled_uri_keeps_non_default_port() {
        let authority: Authority = "b.test:8443".parse().unwrap();
        let uri: Uri = "/x".parse().unwrap();
        assert_eq!(
            tunneled_uri(&authority, &uri).unwrap().to_string(),
            "https://b.test:8443/x"
        );
    }

    #[test]
    fn test_tunneled_uri_keeps_absolute_form() {
        let authority: Authority = "b.test:443".parse().unwrap();
        let uri: Uri = "https://c.test/y".parse().unwrap();
        assert_eq!(tunneled_uri(&authority, &uri).unwrap(), uri);
    }
}
