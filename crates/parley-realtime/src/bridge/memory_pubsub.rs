//! In-memory pub/sub for single-node deployments and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::sync::broadcast;

use parley_core::result::AppResult;

use super::publisher::EventPublisher;

/// In-memory pub/sub implementation.
#[derive(Debug)]
pub struct MemoryPubSub {
    /// Topic name → broadcast sender
    topics: RwLock<HashMap<String, broadcast::Sender<String>>>,
    /// Buffer size for topics
    buffer_size: usize,
}

impl MemoryPubSub {
    /// Create a new in-memory pub/sub
    pub fn new(buffer_size: usize) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            buffer_size: buffer_size.max(1),
        }
    }

    /// Subscribe to a topic, returns a receiver
    pub async fn subscribe(&self, topic: &str) -> broadcast::Receiver<String> {
        let mut topics = self.topics.write().await;
        let tx = topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.buffer_size).0);
        tx.subscribe()
    }
}

#[async_trait]
impl EventPublisher for MemoryPubSub {
    async fn publish(&self, topic: &str, payload: &str) -> AppResult<()> {
        let topics = self.topics.read().await;
        if let Some(tx) = topics.get(topic) {
            // No subscribers is not an error.
            let _ = tx.send(payload.to_string());
        }
        Ok(())
    }
}
