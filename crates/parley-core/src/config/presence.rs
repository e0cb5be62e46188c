//! Presence tracker configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Presence sweep settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// How often stale presence records are swept.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
    /// Inactivity after which a record is considered an ungraceful drop.
    #[serde(default = "default_stale_after")]
    pub stale_after_seconds: u64,
    /// Offline users whose last-seen time is kept before trimming.
    #[serde(default = "default_last_seen_capacity")]
    pub last_seen_capacity: usize,
    /// Size the last-seen map is trimmed down to, oldest first.
    #[serde(default = "default_last_seen_low_watermark")]
    pub last_seen_low_watermark: usize,
}

impl PresenceConfig {
    /// Sweep interval as a [`Duration`].
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }

    /// Staleness threshold as a [`chrono::Duration`].
    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.stale_after_seconds as i64)
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            sweep_interval_seconds: default_sweep_interval(),
            stale_after_seconds: default_stale_after(),
            last_seen_capacity: default_last_seen_capacity(),
            last_seen_low_watermark: default_last_seen_low_watermark(),
        }
    }
}

fn default_sweep_interval() -> u64 {
    300
}

fn default_stale_after() -> u64 {
    1800
}

fn default_last_seen_capacity() -> usize {
    100_000
}

fn default_last_seen_low_watermark() -> usize {
    50_000
}
