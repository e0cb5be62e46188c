//! Message dispatch rules.

use serde::{Deserialize, Serialize};

/// Content limits and time windows for message actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagingConfig {
    /// Maximum characters in a text message.
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,
    /// Seconds after creation during which the sender may recall.
    #[serde(default = "default_recall_window")]
    pub recall_window_seconds: u64,
}

impl MessagingConfig {
    /// Recall window as a [`chrono::Duration`].
    pub fn recall_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.recall_window_seconds as i64)
    }
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            max_text_chars: default_max_text_chars(),
            recall_window_seconds: default_recall_window(),
        }
    }
}

fn default_max_text_chars() -> usize {
    4000
}

fn default_recall_window() -> u64 {
    300
}
