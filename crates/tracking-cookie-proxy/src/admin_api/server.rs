//! Admin API server.

use crate::admin_api::router::route_request;
use crate::controller::ProxyController;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Admin API server exposing leak results over HTTP
pub struct AdminApiServer {
    listener: TcpListener,
    controller: Arc<ProxyController>,
}

impl AdminApiServer {
    /// Bind the admin API listener
    pub async fn bind(
        addr: SocketAddr,
        controller: Arc<ProxyController>,
    ) -> Result<Self, anyhow::Error> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            controller,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the admin API server until `shutdown` fires
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> Result<(), anyhow::Error> {
        info!("Admin API listening on http://{}", self.local_addr()?);

        loop {
            let (stream, _) = tokio::select! {
                accepted = self.listener.accept() => accepted?,
                _ = shutdown.recv() => {
                    info!("Admin API shutting down");
                    return Ok(());
                }
            };
            let io = TokioIo::new(stream);
            let controller = Arc::clone(&self.controller);

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let controller = Arc::clone(&controller);
                    async move { route_request(req, controller).await }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!("Admin API connection error: {}", e);
                }
            });
        }
    }
}
