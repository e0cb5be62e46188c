//! Read receipt sets, bounded in memory.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet, VecDeque};

use tokio::sync::Mutex;
use tracing::info;

use parley_core::types::{MessageId, UserId};

#[derive(Debug, Default)]
struct ReceiptState {
    readers: HashMap<MessageId, HashSet<UserId>>,
    /// Insertion order of the keys in `readers`.
    order: VecDeque<MessageId>,
}

/// Per-message sets of readers.
///
/// Sets are created lazily on the first read and never expire one by one.
/// Once more than `capacity` messages are tracked, the oldest sets are
/// dropped until `low_watermark` remain.
#[derive(Debug)]
pub struct ReadReceiptStore {
    state: Mutex<ReceiptState>,
    capacity: usize,
    low_watermark: usize,
}

impl ReadReceiptStore {
    /// Create an empty store.
    pub fn new(capacity: usize, low_watermark: usize) -> Self {
        Self {
            state: Mutex::new(ReceiptState::default()),
            capacity,
            low_watermark: low_watermark.min(capacity),
        }
    }

    /// Record that `user_id` read `message_id`. Returns `false` if already recorded.
    pub async fn record(&self, message_id: MessageId, user_id: UserId) -> bool {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let inserted = match state.readers.entry(message_id) {
            Entry::Occupied(mut set) => set.get_mut().insert(user_id),
            Entry::Vacant(slot) => {
                slot.insert(HashSet::from([user_id]));
                state.order.push_back(message_id);
                true
            }
        };

        if state.readers.len() > self.capacity {
            let mut dropped = 0usize;
            while state.readers.len() > self.low_watermark {
                let Some(oldest) = state.order.pop_front() else {
                    break;
                };
                if state.readers.remove(&oldest).is_some() {
                    dropped += 1;
                }
            }
            info!(dropped, remaining = state.readers.len(), "Trimmed read receipts");
        }

        inserted
    }

    /// Whether anyone has read the message.
    pub async fn has_readers(&self, message_id: &MessageId) -> bool {
        self.state
            .lock()
            .await
            .readers
            .get(message_id)
            .is_some_and(|set| !set.is_empty())
    }

    /// Readers of a message.
    pub async fn readers(&self, message_id: &MessageId) -> Vec<UserId> {
        self.state
            .lock()
            .await
            .readers
            .get(message_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Drop the set of a message that no longer exists.
    pub async fn forget(&self, message_id: &MessageId) -> bool {
        let mut state = self.state.lock().await;
        let removed = state.readers.remove(message_id).is_some();
        if removed {
            state.order.retain(|id| id != message_id);
        }
        removed
    }

    /// Number of messages with a receipt set.
    pub async fn tracked_messages(&self) -> usize {
        self.state.lock().await.readers.len()
    }

    /// Total reader entries across all sets.
    pub async fn total_receipts(&self) -> usize {
        self.state
            .lock()
            .await
            .readers
            .values()
            .map(HashSet::len)
            .sum()
    }
}
