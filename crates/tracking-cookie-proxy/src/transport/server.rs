//! ProxyServer struct and main accept loop.

use super::context::ProxyState;
use super::handler::handle_request;
use super::network::create_listener;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

/// A bound proxy listener, not yet accepting.
pub struct ProxyServer {
    listener: TcpListener,
    state: Arc<ProxyState>,
    shutdown_grace: Duration,
}

impl ProxyServer {
    /// Bind `addr`. Must be called from within a tokio runtime.
    pub fn bind(addr: SocketAddr, state: Arc<ProxyState>) -> std::io::Result<Self> {
        let listener = create_listener(addr)?;
        Ok(Self {
            listener,
            state,
            shutdown_grace: Duration::from_secs(10),
        })
    }

    /// How long open connections may keep working after shutdown before
    /// they are aborted.
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` fires. Open connections are
    /// asked to finish their in-flight exchange and close; this returns only
    /// once every connection and tunnel task has ended.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if let Ok(addr) = self.listener.local_addr() {
            info!("Proxy listening on http://{}", addr);
        }

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, remote_addr) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                            continue;
                        }
                    };
                    let state = Arc::clone(&self.state);
                    let conn_shutdown = self.state.shutdown_signal();
                    self.state
                        .tasks
                        .spawn(serve_connection(state, stream, remote_addr, conn_shutdown));
                }
                _ = shutdown.recv() => {
                    info!("Proxy listener shutting down");
                    break;
                }
            }
        }

        drop(self.listener);
        let aborted = self.state.tasks.drain(self.shutdown_grace).await;
        debug!(aborted, "Proxy connections drained");
    }
}

async fn serve_connection(
    state: Arc<ProxyState>,
    stream: tokio::net::TcpStream,
    remote_addr: SocketAddr,
    mut shutdown: broadcast::Receiver<()>,
) {
    let io = TokioIo::new(stream);
    let service_state = Arc::clone(&state);
    let service = service_fn(move |req| handle_request(Arc::clone(&service_state), req));

    let conn = http1::Builder::new()
        .serve_connection(io, service)
        .with_upgrades();
    tokio::pin!(conn);

    tokio::select! {
        result = conn.as_mut() => {
            if let Err(err) = result {
                debug!("Connection from {} ended: {}", remote_addr, err);
            }
        }
        _ = shutdown.recv() => {
            conn.as_mut().graceful_shutdown();
            if let Err(err) = conn.await {
                debug!("Connection from {} closed during shutdown: {}", remote_addr, err);
            }
        }
    }
}
