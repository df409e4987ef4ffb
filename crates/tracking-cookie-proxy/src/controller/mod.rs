//! Proxy lifecycle: CA loading, listener, hooks, and pending-index sweeper.

use crate::config::Config;
use crate::tracking::{spawn_sweeper, PendingRequestIndex, SessionLeakStore, TrackingHooks};
use crate::transport::{
    create_http_client, CaError, CertificateAuthority, InterceptHooks, ProxyServer, ProxyState,
    RequestIds,
};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("proxy is already running")]
    AlreadyRunning,

    #[error("proxy is not running")]
    NotRunning,

    #[error("certificate authority unavailable: {0}")]
    CertificateAuthority(#[from] CaError),

    #[error("failed to bind proxy listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create upstream client: {0}")]
    UpstreamClient(#[source] std::io::Error),

    #[error("proxy task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

struct RunningProxy {
    local_addr: SocketAddr,
    shutdown: broadcast::Sender<()>,
    server: JoinHandle<()>,
    sweeper: JoinHandle<()>,
}

/// Owns the leak store and pending index, and starts/stops the intercepting
/// proxy around them.
pub struct ProxyController {
    config: Config,
    leaks: Arc<SessionLeakStore>,
    pending: Arc<PendingRequestIndex>,
    request_ids: Arc<RequestIds>,
    running: Mutex<Option<RunningProxy>>,
}

impl ProxyController {
    pub fn new(config: Config) -> Self {
        let pending = Arc::new(PendingRequestIndex::new(
            config.pending.ttl(),
            config.pending.max_entries,
        ));
        Self {
            config,
            leaks: Arc::new(SessionLeakStore::new()),
            pending,
            request_ids: Arc::new(RequestIds::new()),
            running: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Start intercepting on `port` (0 = ephemeral) and return the bound
    /// address.
    ///
    /// Must be called from within a tokio runtime. Nothing is left running
    /// when an error is returned.
    pub fn start(&self, port: u16) -> Result<SocketAddr, ControllerError> {
        let mut running = self.running.lock();
        if running.is_some() {
            return Err(ControllerError::AlreadyRunning);
        }

        let ca = Arc::new(CertificateAuthority::load(
            &self.config.certificate_authority,
        )?);
        let client =
            create_http_client(&self.config.upstream).map_err(ControllerError::UpstreamClient)?;

        let (shutdown, _) = broadcast::channel(1);
        let hooks: Arc<dyn InterceptHooks> = Arc::new(TrackingHooks::new(
            Arc::clone(&self.leaks),
            Arc::clone(&self.pending),
            self.config.debug,
        ));
        let state = Arc::new(ProxyState::new(
            hooks,
            ca,
            client,
            &self.config.cert_host,
            shutdown.clone(),
            Arc::clone(&self.request_ids),
        ));

        let addr = self.config.listen.socket_addr(port);
        let bind_err = |source| ControllerError::Bind { addr, source };
        let server = ProxyServer::bind(addr, state)
            .map_err(bind_err)?
            .with_shutdown_grace(self.config.listen.shutdown_grace());
        let local_addr = server.local_addr().map_err(bind_err)?;

        let server = tokio::spawn(server.run(shutdown.subscribe()));
        let sweeper = spawn_sweeper(
            Arc::clone(&self.pending),
            self.config.pending.sweep_interval(),
            shutdown.subscribe(),
        );

        info!(
            "Tracking cookie proxy started on {} (certificate host: {})",
            local_addr, self.config.cert_host
        );
        *running = Some(RunningProxy {
            local_addr,
            shutdown,
            server,
            sweeper,
        });
        Ok(local_addr)
    }

    /// Stop accepting, let in-flight exchanges finish (aborting them after
    /// the shutdown grace period), wait for the sweeper, and drop all pending
    /// entries. No hook runs once this returns. Recorded leaks stay
    /// queryable.
    pub async fn stop(&self) -> Result<(), ControllerError> {
        let running = self
            .running
            .lock()
            .take()
            .ok_or(ControllerError::NotRunning)?;

        let _ = running.shutdown.send(());
        let server = running.server.await;
        let sweeper = running.sweeper.await;
        self.pending.clear();
        info!("Tracking cookie proxy on {} stopped", running.local_addr);

        server?;
        sweeper?;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().as_ref().map(|r| r.local_addr)
    }

    /// Hosts that echoed the tracking cookie of `session_id`.
    pub fn leaky_hosts(&self, session_id: &str) -> Option<BTreeSet<String>> {
        self.leaks.leaky_hosts(session_id)
    }

    pub fn leak_store(&self) -> Arc<SessionLeakStore> {
        Arc::clone(&self.leaks)
    }

    pub fn pending_index(&self) -> Arc<PendingRequestIndex> {
        Arc::clone(&self.pending)
    }
}

impl Drop for ProxyController {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            warn!("Proxy controller dropped while running; signalling shutdown");
            let _ = running.shutdown.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::tls::test_ca;
    use crate::transport::CaPaths;

    fn config_with_ca(dir: &std::path::Path) -> Config {
        let (cert_pem, key_pem) = test_ca::generate();
        let paths = CaPaths::in_dir(dir);
        std::fs::write(&paths.cert, cert_pem).unwrap();
        std::fs::write(&paths.key, key_pem).unwrap();

        let mut config = Config::default();
        config.certificate_authority.ca_root = Some(dir.to_path_buf());
        // No native root store in minimal test environments.
        config.upstream.tls_skip_verify = true;
        config
    }

    #[tokio::test]
    async fn test_start_binds_ephemeral_port() {
        let dir = tempfile::tempdir().unwrap();
        let controller = ProxyController::new(config_with_ca(dir.path()));

        assert_eq!(controller.config().cert_host, "p.test");
        let addr = controller.start(0).unwrap();
        assert_ne!(addr.port(), 0);
        assert!(controller.is_running());
        assert_eq!(controller.local_addr(), Some(addr));

        controller.stop().await.unwrap();
        assert!(!controller.is_running());
        assert_eq!(controller.local_addr(), None);
    }

    #[tokio::test]
    async fn test_double_start_fails() {
        let dir = tempfile::tempdir().unwrap();
        let controller = ProxyController::new(config_with_ca(dir.path()));

        controller.start(0).unwrap();
        assert!(matches!(
            controller.start(0),
            Err(ControllerError::AlreadyRunning)
        ));
        controller.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_without_start_fails() {
        let controller = ProxyController::new(Config::default());
        assert!(matches!(
            controller.stop().await,
            Err(ControllerError::NotRunning)
        ));
    }

    #[tokio::test]
    async fn test_missing_ca_prevents_start() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.certificate_authority.ca_root = Some(dir.path().to_path_buf());
        let controller = ProxyController::new(config);

        assert!(matches!(
            controller.start(0),
            Err(ControllerError::CertificateAuthority(_))
        ));
        assert!(!controller.is_running());
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let dir = tempfile::tempdir().unwrap();
        let controller = ProxyController::new(config_with_ca(dir.path()));

        controller.start(0).unwrap();
        controller.stop().await.unwrap();
        controller.start(0).unwrap();
        assert!(controller.is_running());
        controller.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_leaks_survive_stop_and_pending_is_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let controller = ProxyController::new(config_with_ca(dir.path()));
        controller.start(0).unwrap();

        controller.leak_store().record_leak("S1", "b.test");
        controller
            .pending_index()
            .insert(1, "https://a.test/".parse().unwrap());

        controller.stop().await.unwrap();
        assert!(controller.pending_index().is_empty());
        assert!(controller.leaky_hosts("S1").unwrap().contains("b.test"));
    }
}
