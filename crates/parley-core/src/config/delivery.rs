//! Delivery tracker configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Delivery retry and read-receipt bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// How often pending deliveries are swept.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
    /// Age after which an unconfirmed entry is retried.
    #[serde(default = "default_retry_after")]
    pub retry_after_seconds: u64,
    /// Attempt ceiling; an entry reaching it is dropped as failed.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Messages with read receipts kept in memory before trimming.
    #[serde(default = "default_receipt_capacity")]
    pub receipt_capacity: usize,
    /// Size the receipt store is trimmed down to once over capacity.
    #[serde(default = "default_receipt_low_watermark")]
    pub receipt_low_watermark: usize,
}

impl DeliveryConfig {
    /// Sweep interval as a [`Duration`].
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }

    /// Retry threshold as a [`chrono::Duration`].
    pub fn retry_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.retry_after_seconds as i64)
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            sweep_interval_seconds: default_sweep_interval(),
            retry_after_seconds: default_retry_after(),
            max_attempts: default_max_attempts(),
            receipt_capacity: default_receipt_capacity(),
            receipt_low_watermark: default_receipt_low_watermark(),
        }
    }
}

fn default_sweep_interval() -> u64 {
    10
}

fn default_retry_after() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    5
}

fn default_receipt_capacity() -> usize {
    10_000
}

fn default_receipt_low_watermark() -> usize {
    5_000
}
