//! Delivery tracker, best-effort at-least-once confirmation of messages.
//!
//! An entry is kept per dispatched message until every targeted recipient
//! confirmed it or the attempt ceiling is reached. Each sweep retries
//! entries older than the retry threshold by pushing the message again to
//! recipients that are connected.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use parley_core::config::DeliveryConfig;
use parley_core::result::AppResult;
use parley_core::types::{GroupId, MessageId, UserId};
use parley_database::store::MessageStore;
use parley_entity::MessageStatus;

use crate::connection::manager::ConnectionManager;
use crate::message::types::OutboundEvent;
use crate::metrics::RealtimeMetrics;

use super::receipts::ReadReceiptStore;

/// A message awaiting delivery confirmation.
#[derive(Debug, Clone)]
pub struct DeliveryEntry {
    /// When the entry was created.
    pub enqueued_at: DateTime<Utc>,
    /// Start of the current attempt; reset on every retry.
    pub last_attempt_at: DateTime<Utc>,
    /// Timeouts seen so far.
    pub attempts: u32,
    /// Ceiling after which the entry is dropped as failed.
    pub max_attempts: u32,
    /// Recipients that have not confirmed yet.
    pub recipients: HashSet<UserId>,
}

/// Outcome of one sweep pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Entries retried.
    pub retried: usize,
    /// Entries dropped after reaching the ceiling.
    pub failed: usize,
    /// Connections the message was pushed to again.
    pub repushed: usize,
}

/// Operational view of the tracker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryStats {
    /// Entries awaiting confirmation.
    pub pending: usize,
    /// Mean attempt count of pending entries.
    pub average_attempts: f64,
    /// Reader entries across all receipt sets.
    pub total_read_receipts: usize,
    /// Messages with a receipt set.
    pub tracked_read_messages: usize,
}

/// Tracks pending deliveries and aggregates read receipts.
pub struct DeliveryTracker {
    entries: DashMap<MessageId, DeliveryEntry>,
    receipts: ReadReceiptStore,
    messages: Arc<dyn MessageStore>,
    connections: Arc<ConnectionManager>,
    metrics: Arc<RealtimeMetrics>,
    retry_after: chrono::Duration,
    max_attempts: u32,
}

impl std::fmt::Debug for DeliveryTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryTracker")
            .field("pending", &self.entries.len())
            .field("retry_after", &self.retry_after)
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

impl DeliveryTracker {
    /// Create a new tracker.
    pub fn new(
        config: &DeliveryConfig,
        messages: Arc<dyn MessageStore>,
        connections: Arc<ConnectionManager>,
        metrics: Arc<RealtimeMetrics>,
    ) -> Self {
        Self {
            entries: DashMap::new(),
            receipts: ReadReceiptStore::new(config.receipt_capacity, config.receipt_low_watermark),
            messages,
            connections,
            metrics,
            retry_after: config.retry_after(),
            max_attempts: config.max_attempts.max(1),
        }
    }

    /// Start tracking a dispatched message for the given recipients.
    pub fn enqueue(&self, message_id: MessageId, recipients: impl IntoIterator<Item = UserId>) {
        let recipients: HashSet<UserId> = recipients.into_iter().collect();
        if recipients.is_empty() {
            return;
        }
        let now = Utc::now();
        debug!(message_id = %message_id, recipients = recipients.len(), "Delivery enqueued");
        self.entries.insert(
            message_id,
            DeliveryEntry {
                enqueued_at: now,
                last_attempt_at: now,
                attempts: 0,
                max_attempts: self.max_attempts,
                recipients,
            },
        );
    }

    /// Record that `user_id` received the given messages.
    ///
    /// Persists the `delivered` status, tells each sender privately, and
    /// removes the user from the pending entries. Messages the user sent
    /// are ignored. Returns how many messages were confirmed.
    pub async fn mark_delivered(&self, user_id: UserId, message_ids: &[MessageId]) -> AppResult<usize> {
        if message_ids.is_empty() {
            return Ok(0);
        }

        let found = self.messages.find_by_ids(message_ids).await?;
        let confirmed: Vec<_> = found
            .into_iter()
            .filter(|m| m.sender_id != user_id && !m.is_deleted)
            .collect();
        if confirmed.is_empty() {
            return Ok(0);
        }

        let ids: Vec<MessageId> = confirmed.iter().map(|m| m.id).collect();
        self.messages
            .advance_status(&ids, MessageStatus::Delivered)
            .await?;

        let now = Utc::now();
        for message in &confirmed {
            self.confirm_recipient(message.id, user_id);
            self.connections.send_to_user(
                &message.sender_id,
                &OutboundEvent::MessageDelivered {
                    message_id: message.id,
                    group_id: message.group_id,
                    delivered_to: user_id,
                    delivered_at: now,
                },
            );
        }

        debug!(user_id = %user_id, count = confirmed.len(), "Messages marked delivered");
        Ok(confirmed.len())
    }

    /// Record that `user_id` read the given messages.
    ///
    /// Persists the `read` status, adds the reader to each receipt set,
    /// broadcasts `message_read` to the group, and sends the sender a
    /// private `message_read_by_recipient`. When `group_id` is given, other
    /// groups' messages are skipped. Reading also counts as delivery.
    ///
    /// A sender reading their own message only produces the group
    /// `message_read`. Status and receipts are left alone so the message
    /// can still be recalled.
    pub async fn mark_read(
        &self,
        user_id: UserId,
        message_ids: &[MessageId],
        group_id: Option<GroupId>,
    ) -> AppResult<usize> {
        if message_ids.is_empty() {
            return Ok(0);
        }

        let found = self.messages.find_by_ids(message_ids).await?;
        let read: Vec<_> = found
            .into_iter()
            .filter(|m| !m.is_deleted)
            .filter(|m| group_id.is_none_or(|g| g == m.group_id))
            .collect();
        if read.is_empty() {
            return Ok(0);
        }

        let ids: Vec<MessageId> = read
            .iter()
            .filter(|m| m.sender_id != user_id)
            .map(|m| m.id)
            .collect();
        if !ids.is_empty() {
            self.messages.advance_status(&ids, MessageStatus::Read).await?;
        }

        let now = Utc::now();
        for message in &read {
            let own = message.sender_id == user_id;
            if !own {
                self.receipts.record(message.id, user_id).await;
                self.confirm_recipient(message.id, user_id);
            }

            self.connections.broadcast_to_group(
                &message.group_id,
                &OutboundEvent::MessageRead {
                    message_id: message.id,
                    group_id: message.group_id,
                    read_by: user_id,
                    read_at: now,
                },
                Some(user_id),
            );
            if own {
                continue;
            }
            self.connections.send_to_user(
                &message.sender_id,
                &OutboundEvent::MessageReadByRecipient {
                    message_id: message.id,
                    group_id: message.group_id,
                    read_by: user_id,
                    read_at: now,
                },
            );
        }

        debug!(user_id = %user_id, count = read.len(), "Messages marked read");
        Ok(read.len())
    }

    fn confirm_recipient(&self, message_id: MessageId, user_id: UserId) {
        if let Some(mut entry) = self.entries.get_mut(&message_id) {
            entry.recipients.remove(&user_id);
        }
        if self
            .entries
            .remove_if(&message_id, |_, e| e.recipients.is_empty())
            .is_some()
        {
            debug!(message_id = %message_id, "Delivery complete");
        }
    }

    /// Stop tracking a message (deleted or recalled).
    pub fn cancel(&self, message_id: &MessageId) -> bool {
        self.entries.remove(message_id).is_some()
    }

    /// Whether anyone has read the message.
    pub async fn has_readers(&self, message_id: &MessageId) -> bool {
        self.receipts.has_readers(message_id).await
    }

    /// Drop the receipt set of a message that no longer exists.
    pub async fn forget_receipts(&self, message_id: &MessageId) -> bool {
        self.receipts.forget(message_id).await
    }

    /// Readers of a message.
    pub async fn readers(&self, message_id: &MessageId) -> Vec<UserId> {
        self.receipts.readers(message_id).await
    }

    /// A copy of the pending entry for a message.
    pub fn entry(&self, message_id: &MessageId) -> Option<DeliveryEntry> {
        self.entries.get(message_id).map(|e| e.value().clone())
    }

    /// Number of entries awaiting confirmation.
    pub fn pending_count(&self) -> usize {
        self.entries.len()
    }

    /// Snapshot for introspection.
    pub async fn stats(&self) -> DeliveryStats {
        let (pending, attempts) = self
            .entries
            .iter()
            .fold((0usize, 0u64), |(n, sum), e| (n + 1, sum + e.attempts as u64));
        DeliveryStats {
            pending,
            average_attempts: if pending == 0 {
                0.0
            } else {
                attempts as f64 / pending as f64
            },
            total_read_receipts: self.receipts.total_receipts().await,
            tracked_read_messages: self.receipts.tracked_messages().await,
        }
    }

    /// Run one sweep as of `now`.
    ///
    /// Every entry whose current attempt is older than the retry threshold
    /// counts one more attempt. Entries reaching the ceiling are dropped and
    /// logged as failed; the rest restart their timer and are pushed again.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let mut retry: Vec<(MessageId, Vec<UserId>)> = Vec::new();
        let mut failed: Vec<MessageId> = Vec::new();

        for mut entry in self.entries.iter_mut() {
            if now - entry.last_attempt_at < self.retry_after {
                continue;
            }
            entry.attempts += 1;
            if entry.attempts >= entry.max_attempts {
                failed.push(*entry.key());
            } else {
                entry.last_attempt_at = now;
                retry.push((*entry.key(), entry.recipients.iter().copied().collect()));
            }
        }

        let mut report = SweepReport {
            retried: retry.len(),
            ..SweepReport::default()
        };

        for message_id in failed {
            if let Some((_, entry)) = self.entries.remove(&message_id) {
                warn!(
                    message_id = %message_id,
                    attempts = entry.attempts,
                    undelivered = entry.recipients.len(),
                    "Delivery failed permanently"
                );
                self.metrics.delivery_failed();
                report.failed += 1;
            }
        }

        for (message_id, recipients) in retry {
            report.repushed += self.repush(message_id, &recipients).await;
        }

        report
    }

    async fn repush(&self, message_id: MessageId, recipients: &[UserId]) -> usize {
        let online: Vec<&UserId> = recipients
            .iter()
            .filter(|r| self.connections.is_user_connected(r))
            .collect();
        if online.is_empty() {
            return 0;
        }

        match self.messages.find_by_id(message_id).await {
            Ok(Some(message)) if !message.is_deleted => {
                let event = OutboundEvent::NewMessage { message };
                online
                    .into_iter()
                    .filter(|r| self.connections.send_to_user(r, &event))
                    .count()
            }
            Ok(_) => {
                self.cancel(&message_id);
                0
            }
            Err(e) => {
                error!(message_id = %message_id, error = %e, "Failed to reload message for retry");
                0
            }
        }
    }

    /// Spawn the periodic retry sweep.
    ///
    /// The loop exits without touching state once `shutdown` fires.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        debug!("Delivery sweeper stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        let report = self.sweep_at(Utc::now()).await;
                        if report.retried > 0 || report.failed > 0 {
                            info!(
                                retried = report.retried,
                                failed = report.failed,
                                repushed = report.repushed,
                                "Delivery sweep finished"
                            );
                        }
                    }
                }
            }
        })
    }
}
