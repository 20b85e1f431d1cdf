//! Access-control configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings for permission caching and invitation housekeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Upper bound on the age of a cached permission decision, in seconds.
    ///
    /// A fresh cache is built for every request, so this only bounds
    /// unusually long-running operations.
    #[serde(default = "default_cache_ttl")]
    pub permission_cache_ttl_seconds: u64,
    /// Interval between expired-invitation sweeps, in seconds.
    #[serde(default = "default_sweep_interval")]
    pub invitation_sweep_interval_seconds: u64,
}

impl AccessConfig {
    /// Permission cache TTL as a [`Duration`].
    pub fn permission_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.permission_cache_ttl_seconds)
    }

    /// Sweep interval as a [`Duration`].
    pub fn invitation_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.invitation_sweep_interval_seconds)
    }
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            permission_cache_ttl_seconds: default_cache_ttl(),
            invitation_sweep_interval_seconds: default_sweep_interval(),
        }
    }
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_sweep_interval() -> u64 {
    3600
}
