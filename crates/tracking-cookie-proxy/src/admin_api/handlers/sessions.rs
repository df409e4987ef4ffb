//! Session handlers: list, leaky hosts, reset.

use crate::admin_api::types::*;
use crate::controller::ProxyController;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use tracing::info;

/// GET /sessions - Sessions with at least one recorded leak
pub fn handle_list(controller: &ProxyController) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &SessionsResponse {
            sessions: controller.leak_store().sessions(),
        },
    )
}

/// GET /sessions/:id/leaky-hosts
///
/// Unknown sessions answer with an empty host list.
pub fn handle_leaky_hosts(controller: &ProxyController, session_id: &str) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &LeakyHostsResponse {
            session_id: session_id.to_string(),
            hosts: controller.leaky_hosts(session_id).unwrap_or_default(),
        },
    )
}

/// DELETE /sessions/:id
pub fn handle_reset(controller: &ProxyController, session_id: &str) -> Response<Full<Bytes>> {
    if controller.leak_store().reset_session(session_id) {
        info!(session_id, "Session leak record reset");
        empty_response(StatusCode::NO_CONTENT)
    } else {
        not_found()
    }
}

/// DELETE /sessions - Forget every session
pub fn handle_reset_all(controller: &ProxyController) -> Response<Full<Bytes>> {
    controller.leak_store().clear();
    info!("All session leak records reset");
    empty_response(StatusCode::NO_CONTENT)
}
