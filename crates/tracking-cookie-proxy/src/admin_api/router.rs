//! Route dispatch logic for the Admin API.

use crate::admin_api::handlers::{sessions, system};
use crate::admin_api::types::{error_response, method_not_allowed, not_found};
use crate::controller::ProxyController;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Method, Request, Response, StatusCode};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::debug;

/// Parsed route for session-specific endpoints
#[derive(Debug, PartialEq, Eq)]
enum SessionRoute {
    /// DELETE /sessions/:id
    Root(String),
    /// GET /sessions/:id/leaky-hosts
    LeakyHosts(String),
}

impl SessionRoute {
    /// Parse route from the path after `/sessions/`
    fn parse(rest: &str) -> Option<Self> {
        let segments: Vec<&str> = rest.split('/').collect();
        let (id, route) = match segments.as_slice() {
            [id] => (*id, None),
            [id, "leaky-hosts"] => (*id, Some("leaky-hosts")),
            _ => return None,
        };
        if id.is_empty() {
            return None;
        }
        let id = urlencoding::decode(id).ok()?.into_owned();
        Some(match route {
            None => SessionRoute::Root(id),
            Some(_) => SessionRoute::LeakyHosts(id),
        })
    }
}

/// Main request router
pub async fn route_request<B>(
    req: Request<B>,
    controller: Arc<ProxyController>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    debug!("Admin API: {} {}", method, path);

    Ok(route_by_path(&method, &path, &controller))
}

/// Route based on path
fn route_by_path(
    method: &Method,
    path: &str,
    controller: &ProxyController,
) -> Response<Full<Bytes>> {
    match (method, path) {
        (&Method::GET, "/health") => return system::handle_health(controller),
        (&Method::GET, "/metrics") => return system::handle_metrics(),
        (&Method::GET, "/sessions") => return sessions::handle_list(controller),
        (&Method::DELETE, "/sessions") => return sessions::handle_reset_all(controller),
        (_, "/health") | (_, "/metrics") | (_, "/sessions") => return method_not_allowed(),
        _ => {}
    }

    let Some(rest) = path.strip_prefix("/sessions/") else {
        return not_found();
    };
    let Some(route) = SessionRoute::parse(rest) else {
        return if rest.is_empty() {
            error_response(StatusCode::BAD_REQUEST, "Missing session id")
        } else {
            not_found()
        };
    };

    match (method, route) {
        (&Method::GET, SessionRoute::LeakyHosts(id)) => {
            sessions::handle_leaky_hosts(controller, &id)
        }
        (&Method::DELETE, SessionRoute::Root(id)) => sessions::handle_reset(controller, &id),
        _ => method_not_allowed(),
    }
}
