//! Request-id to URL index bridging request and response hooks.
//!
//! The transport hands responses to the hooks without their originating URL,
//! so every observed request is indexed by its id until the matching response
//! takes it back out. Requests that never see a response (client aborts,
//! upstream resets) would stay forever; two bounds keep the index finite:
//!
//! - a TTL, enforced by [`PendingRequestIndex::sweep_expired`] (run
//!   periodically by [`spawn_sweeper`]);
//! - a hard capacity, enforced on insert by evicting the oldest entry.

use crate::metrics;
use crate::transport::RequestId;
use hyper::Uri;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;

struct PendingEntry {
    url: Uri,
    inserted_at: Instant,
    seq: u64,
}

#[derive(Default)]
struct PendingInner {
    entries: HashMap<RequestId, PendingEntry>,
    // Insertion sequence -> request id, oldest first.
    by_age: BTreeMap<u64, RequestId>,
    next_seq: u64,
}

impl PendingInner {
    fn remove(&mut self, id: RequestId) -> Option<PendingEntry> {
        let entry = self.entries.remove(&id)?;
        self.by_age.remove(&entry.seq);
        Some(entry)
    }
}

pub struct PendingRequestIndex {
    inner: Mutex<PendingInner>,
    ttl: Duration,
    max_entries: usize,
}

impl PendingRequestIndex {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(PendingInner::default()),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    /// Index `url` under `id`, replacing any previous entry for that id.
    ///
    /// Returns the id of the entry evicted to make room, if the index was
    /// full.
    pub fn insert(&self, id: RequestId, url: Uri) -> Option<RequestId> {
        let mut inner = self.inner.lock();
        inner.remove(id);

        let evicted = if inner.entries.len() >= self.max_entries {
            let oldest = inner.by_age.pop_first().map(|(_, oldest)| oldest);
            if let Some(oldest) = oldest {
                inner.entries.remove(&oldest);
            }
            oldest
        } else {
            None
        };

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.by_age.insert(seq, id);
        inner.entries.insert(
            id,
            PendingEntry {
                url,
                inserted_at: Instant::now(),
                seq,
            },
        );
        let len = inner.entries.len();
        drop(inner);

        if let Some(oldest) = evicted {
            debug!(request_id = oldest, "pending index full, evicted oldest entry");
            metrics::record_pending_eviction("capacity", 1);
        }
        metrics::set_pending_entries(len);
        evicted
    }

    /// Remove and return the URL indexed under `id`.
    pub fn take(&self, id: RequestId) -> Option<Uri> {
        let mut inner = self.inner.lock();
        let entry = inner.remove(id);
        metrics::set_pending_entries(inner.entries.len());
        entry.map(|e| e.url)
    }

    /// Evict entries older than the TTL. Returns how many were evicted.
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Instant::now())
    }

    pub(crate) fn sweep_expired_at(&self, now: Instant) -> usize {
        let mut inner = self.inner.lock();
        let mut evicted = 0;
        // Sequence order is insertion order, so the scan stops at the first
        // entry still within its TTL.
        while let Some((&seq, &id)) = inner.by_age.first_key_value() {
            let expired = inner
                .entries
                .get(&id)
                .is_none_or(|entry| now.saturating_duration_since(entry.inserted_at) >= self.ttl);
            if !expired {
                break;
            }
            inner.by_age.remove(&seq);
            inner.entries.remove(&id);
            evicted += 1;
        }
        let len = inner.entries.len();
        drop(inner);

        if evicted > 0 {
            debug!(evicted, remaining = len, "evicted orphaned pending requests");
            metrics::record_pending_eviction("ttl", evicted);
        }
        metrics::set_pending_entries(len);
        evicted
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.by_age.clear();
        metrics::set_pending_entries(0);
    }
}

/// Run [`PendingRequestIndex::sweep_expired`] every `interval` until a
/// shutdown signal arrives.
pub fn spawn_sweeper(
    index: Arc<PendingRequestIndex>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    index.sweep_expired();
                }
                _ = shutdown.recv() => {
                    debug!("pending index sweeper stopping");
                    break;
                }
            }
        }
    })
}
