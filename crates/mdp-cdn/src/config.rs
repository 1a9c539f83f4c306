//! Cache invalidation engine configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default probe bound
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 10;

/// Default purge wait bound
pub const DEFAULT_PURGE_TIMEOUT_SECS: u64 = 300;

/// Default purge poll cadence
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Timing knobs for the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CdnConfig {
    /// Upper bound on a single probe
    pub probe_timeout_secs: u64,
    /// Upper bound on waiting for a purge
    pub purge_timeout_secs: u64,
    /// Delay between purge status polls
    pub purge_poll_interval_secs: u64,
}

impl Default for CdnConfig {
    fn default() -> Self {
        Self {
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
            purge_timeout_secs: DEFAULT_PURGE_TIMEOUT_SECS,
            purge_poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
        }
    }
}

impl CdnConfig {
    /// Create with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set probe timeout
    #[inline]
    #[must_use]
    pub fn with_probe_timeout_secs(mut self, secs: u64) -> Self {
        self.probe_timeout_secs = secs;
        self
    }

    /// Set purge wait timeout
    #[inline]
    #[must_use]
    pub fn with_purge_timeout_secs(mut self, secs: u64) -> Self {
        self.purge_timeout_secs = secs;
        self
    }

    /// Set purge poll interval
    #[inline]
    #[must_use]
    pub fn with_poll_interval_secs(mut self, secs: u64) -> Self {
        self.purge_poll_interval_secs = secs;
        self
    }

    /// Probe bound as a duration
    #[must_use]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Purge wait bound as a duration
    #[must_use]
    pub fn purge_timeout(&self) -> Duration {
        Duration::from_secs(self.purge_timeout_secs)
    }

    /// Poll cadence as a duration
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.purge_poll_interval_secs)
    }
}
