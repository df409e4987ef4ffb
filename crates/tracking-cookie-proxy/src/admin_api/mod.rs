//! Admin REST API for querying leak results.
//!
//! - `GET /health` - liveness and whether the proxy is running
//! - `GET /sessions` - sessions with recorded leaks
//! - `GET /sessions/:id/leaky-hosts` - hosts that echoed the session cookie
//! - `DELETE /sessions/:id`, `DELETE /sessions` - reset leak records
//! - `GET /metrics` - Prometheus exposition
//!
//! The API listens on a configurable port (default: 9091).

mod handlers;
mod router;
mod server;
mod types;

pub use router::route_request;
pub use server::AdminApiServer;
