//! Pending request index bounds.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PendingConfig {
    /// Entries older than this are considered orphaned
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Hard bound; the oldest entry is evicted when full
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl PendingConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.ttl_secs == 0 {
            anyhow::bail!("pending.ttl_secs must be greater than 0");
        }
        if self.sweep_interval_secs == 0 {
            anyhow::bail!("pending.sweep_interval_secs must be greater than 0");
        }
        if self.max_entries == 0 {
            anyhow::bail!("pending.max_entries must be greater than 0");
        }
        Ok(())
    }
}

impl Default for PendingConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            max_entries: default_max_entries(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    300
}

fn default_sweep_interval_secs() -> u64 {
    30
}

fn default_max_entries() -> usize {
    65_536
}
