//! External broker notification configuration.

use serde::{Deserialize, Serialize};

/// Fire-and-forget publication of new messages to an external broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Whether new messages are published at all.
    #[serde(default)]
    pub enabled: bool,
    /// `"memory"` or `"redis"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Broker URL (Redis only).
    #[serde(default)]
    pub url: String,
    /// Prefix for published topic names.
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
    /// Buffer size of in-memory topics.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_provider(),
            url: String::new(),
            topic_prefix: default_topic_prefix(),
            buffer_size: default_buffer_size(),
        }
    }
}

fn default_provider() -> String {
    "memory".to_string()
}

fn default_topic_prefix() -> String {
    "parley".to_string()
}

fn default_buffer_size() -> usize {
    1024
}
