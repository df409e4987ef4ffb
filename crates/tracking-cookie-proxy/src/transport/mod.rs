//! Intercepting HTTP/1.1 proxy transport.
//!
//! # Module Structure
//!
//! - `hooks` - the interception contract ([`InterceptHooks`])
//! - `server` - listener and accept loop
//! - `handler` - dispatch of proxy, CONNECT and certificate-host requests
//! - `tunnel` - TLS termination of CONNECT tunnels
//! - `forwarding` - hook invocation around the upstream exchange
//! - `client` - upstream HTTP client
//! - `tls` - root CA loading and leaf minting
//! - `cert_routes` - root certificate download pages

pub mod body;
mod cert_routes;
mod client;
mod context;
mod forwarding;
mod handler;
mod headers;
mod hooks;
mod network;
mod server;
pub mod tls;
mod tunnel;

pub use cert_routes::{CertificateRoutes, CA_CONTENT_DISPOSITION, CA_CONTENT_TYPE};
pub use client::{create_http_client, HttpClient};
pub use context::{ProxyState, RequestIds};
pub use forwarding::error_response;
pub use hooks::{InterceptHooks, InterceptedRequest, InterceptedResponse, RequestId};
pub use server::ProxyServer;
pub use tls::{CaError, CaPaths, CertificateAuthority};
