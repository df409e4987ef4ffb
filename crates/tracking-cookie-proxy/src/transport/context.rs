use super::cert_routes::CertificateRoutes;
use super::client::HttpClient;
use super::hooks::{InterceptHooks, RequestId};
use super::tls::CertificateAuthority;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Monotonic request ids.
///
/// Outlives any single run of the proxy so ids are never reused across a
/// stop and restart.
#[derive(Debug)]
pub struct RequestIds(AtomicU64);

impl RequestIds {
    pub fn new() -> Self {
        Self(AtomicU64::new(1))
    }

    pub fn next(&self) -> RequestId {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for RequestIds {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct TasksInner {
    set: JoinSet<()>,
    closed: bool,
}

/// Connection and tunnel tasks of one running proxy.
#[derive(Default)]
pub(crate) struct ConnectionTasks {
    inner: Mutex<TasksInner>,
}

impl ConnectionTasks {
    /// Spawn `task` unless the set has been drained already.
    pub(crate) fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut inner = self.inner.lock();
        if inner.closed {
            debug!("proxy stopped; dropping connection task");
            return;
        }
        while inner.set.try_join_next().is_some() {}
        inner.set.spawn(task);
    }

    /// Wait up to `grace` for every task (including ones spawned meanwhile)
    /// to finish, then abort the rest. Returns how many were aborted.
    ///
    /// No task is accepted once this returns.
    pub(crate) async fn drain(&self, grace: Duration) -> usize {
        let deadline = tokio::time::Instant::now() + grace;
        loop {
            let mut set = {
                let mut inner = self.inner.lock();
                if inner.set.is_empty() {
                    inner.closed = true;
                    return 0;
                }
                std::mem::take(&mut inner.set)
            };

            let finished = tokio::time::timeout_at(deadline, async {
                while set.join_next().await.is_some() {}
            })
            .await
            .is_ok();
            if finished {
                continue;
            }

            let late = {
                let mut inner = self.inner.lock();
                inner.closed = true;
                std::mem::take(&mut inner.set)
            };
            let aborted = set.len() + late.len();
            warn!(aborted, "in-flight connections outlived the shutdown grace period");
            for mut set in [set, late] {
                set.abort_all();
                while set.join_next().await.is_some() {}
            }
            return aborted;
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.inner.lock().set.len()
    }
}

/// State shared by every connection of one running proxy.
pub struct ProxyState {
    pub(crate) hooks: Arc<dyn InterceptHooks>,
    pub(crate) ca: Arc<CertificateAuthority>,
    pub(crate) client: HttpClient,
    pub(crate) routes: CertificateRoutes,
    pub(crate) tasks: ConnectionTasks,
    shutdown: broadcast::Sender<()>,
    ids: Arc<RequestIds>,
}

impl ProxyState {
    pub fn new(
        hooks: Arc<dyn InterceptHooks>,
        ca: Arc<CertificateAuthority>,
        client: HttpClient,
        cert_host: &str,
        shutdown: broadcast::Sender<()>,
        ids: Arc<RequestIds>,
    ) -> Self {
        let routes = CertificateRoutes::new(cert_host, ca.cert_pem().to_string());
        Self {
            hooks,
            ca,
            client,
            routes,
            tasks: ConnectionTasks::default(),
            shutdown,
            ids,
        }
    }

    pub(crate) fn next_request_id(&self) -> RequestId {
        self.ids.next()
    }

    pub(crate) fn shutdown_signal(&self) -> broadcast::Receiver<()> {
        self.shutdown.subscribe()
    }
}
