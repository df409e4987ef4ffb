use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};

/// Session id to the set of hostnames that echoed that session's tracking
/// cookie.
///
/// Sets only grow while the process runs; callers reset them explicitly.
#[derive(Debug, Default)]
pub struct SessionLeakStore {
    sessions: RwLock<HashMap<String, BTreeSet<String>>>,
}

impl SessionLeakStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `hostname` to the leak set of `session_id`.
    ///
    /// Returns `true` if the host was not already recorded for the session.
    pub fn record_leak(&self, session_id: &str, hostname: &str) -> bool {
        let mut sessions = self.sessions.write();
        sessions
            .entry(session_id.to_string())
            .or_default()
            .insert(hostname.to_string())
    }

    /// Hosts recorded for `session_id`, or `None` if the session never leaked.
    pub fn leaky_hosts(&self, session_id: &str) -> Option<BTreeSet<String>> {
        self.sessions.read().get(session_id).cloned()
    }

    /// All session ids with at least one recorded leak, sorted.
    pub fn sessions(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    /// Forget everything recorded for `session_id`.
    pub fn reset_session(&self, session_id: &str) -> bool {
        self.sessions.write().remove(session_id).is_some()
    }

    pub fn clear(&self) {
        self.sessions.write().clear();
    }

    /// Number of sessions with recorded leaks.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}
