//! Presence tracker, the single source of truth for who is online.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use parley_core::error::AppError;
use parley_core::types::{ConnectionId, UserId};
use parley_entity::PresenceStatus;

/// Presence of one online user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PresenceRecord {
    /// Current status.
    pub status: PresenceStatus,
    /// Connection the record is bound to (last writer wins).
    pub connection_id: ConnectionId,
    /// Last inbound activity.
    pub last_activity: DateTime<Utc>,
}

const DEFAULT_LAST_SEEN_CAPACITY: usize = 100_000;
const DEFAULT_LAST_SEEN_LOW_WATERMARK: usize = 50_000;

/// Tracks presence state for all users.
///
/// Users leaving the online set keep a last-seen timestamp, so
/// [`PresenceTracker::get_last_seen`] is only `None` for users never seen
/// or whose timestamp was trimmed. Once more than `last_seen_capacity`
/// offline users are remembered, the oldest are forgotten until
/// `last_seen_low_watermark` remain.
#[derive(Debug)]
pub struct PresenceTracker {
    /// User ID → online record
    online: DashMap<UserId, PresenceRecord>,
    /// User ID → last activity before leaving the online set
    last_seen: DashMap<UserId, DateTime<Utc>>,
    last_seen_capacity: usize,
    last_seen_low_watermark: usize,
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::with_last_seen_limit(DEFAULT_LAST_SEEN_CAPACITY, DEFAULT_LAST_SEEN_LOW_WATERMARK)
    }
}

impl PresenceTracker {
    /// Create a new presence tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tracker with an explicit bound on remembered last-seen times.
    pub fn with_last_seen_limit(capacity: usize, low_watermark: usize) -> Self {
        Self {
            online: DashMap::new(),
            last_seen: DashMap::new(),
            last_seen_capacity: capacity,
            last_seen_low_watermark: low_watermark.min(capacity),
        }
    }

    /// Mark a user online, bound to `connection_id`.
    ///
    /// Idempotent: an existing record keeps its status and is re-bound.
    pub fn set_online(&self, user_id: UserId, connection_id: ConnectionId) -> PresenceRecord {
        let now = Utc::now();
        let record = *self
            .online
            .entry(user_id)
            .and_modify(|r| {
                r.connection_id = connection_id;
                r.last_activity = now;
            })
            .or_insert(PresenceRecord {
                status: PresenceStatus::Online,
                connection_id,
                last_activity: now,
            });
        record
    }

    /// Remove a user from the online set, keeping a last-seen timestamp.
    ///
    /// Returns the removed record; `None` if the user was not tracked.
    pub fn set_offline(&self, user_id: UserId) -> Option<PresenceRecord> {
        let (_, record) = self.online.remove(&user_id)?;
        self.remember_last_seen(user_id, Utc::now());
        Some(record)
    }

    /// Update a user's status.
    pub fn update_status(&self, user_id: UserId, status: &str) -> Result<PresenceRecord, AppError> {
        let status: PresenceStatus = status.parse()?;
        let mut record = self
            .online
            .get_mut(&user_id)
            .ok_or_else(|| AppError::validation("User is not online"))?;
        record.status = status;
        record.last_activity = Utc::now();
        Ok(*record)
    }

    /// Record activity (touch). Returns `false` if the user is not tracked.
    pub fn touch(&self, user_id: UserId) -> bool {
        match self.online.get_mut(&user_id) {
            Some(mut record) => {
                record.last_activity = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Check if a user is online
    pub fn is_online(&self, user_id: UserId) -> bool {
        self.online.contains_key(&user_id)
    }

    /// Get a user's current status; `offline` when not tracked.
    pub fn get_status(&self, user_id: UserId) -> PresenceStatus {
        self.online
            .get(&user_id)
            .map(|r| r.status)
            .unwrap_or(PresenceStatus::Offline)
    }

    /// Last activity of an online user, or last seen of an offline one.
    pub fn get_last_seen(&self, user_id: UserId) -> Option<DateTime<Utc>> {
        if let Some(record) = self.online.get(&user_id) {
            return Some(record.last_activity);
        }
        self.last_seen.get(&user_id).map(|r| *r.value())
    }

    /// The online record of a user.
    pub fn record(&self, user_id: UserId) -> Option<PresenceRecord> {
        self.online.get(&user_id).map(|r| *r.value())
    }

    /// Get online user count
    pub fn online_count(&self) -> usize {
        self.online.len()
    }

    /// Evict records idle for longer than `stale_after` as of `now`.
    ///
    /// Returns the evicted users.
    pub fn sweep_at(&self, now: DateTime<Utc>, stale_after: chrono::Duration) -> Vec<UserId> {
        let stale: Vec<UserId> = self
            .online
            .iter()
            .filter(|r| now - r.last_activity > stale_after)
            .map(|r| *r.key())
            .collect();

        let mut evicted = Vec::with_capacity(stale.len());
        for user_id in stale {
            if let Some((_, record)) = self
                .online
                .remove_if(&user_id, |_, r| now - r.last_activity > stale_after)
            {
                self.remember_last_seen(user_id, record.last_activity);
                evicted.push(user_id);
            }
        }
        evicted
    }

    /// Number of offline users with a remembered last-seen time.
    pub fn last_seen_count(&self) -> usize {
        self.last_seen.len()
    }

    fn remember_last_seen(&self, user_id: UserId, at: DateTime<Utc>) {
        self.last_seen.insert(user_id, at);
        if self.last_seen.len() <= self.last_seen_capacity {
            return;
        }

        let mut by_age: Vec<(UserId, DateTime<Utc>)> =
            self.last_seen.iter().map(|e| (*e.key(), *e.value())).collect();
        by_age.sort_by_key(|(_, seen)| *seen);
        let excess = by_age.len().saturating_sub(self.last_seen_low_watermark);
        for (user_id, seen) in by_age.into_iter().take(excess) {
            self.last_seen.remove_if(&user_id, |_, current| *current == seen);
        }
        info!(remaining = self.last_seen.len(), "Trimmed last-seen times");
    }

    /// Spawn the periodic stale-record sweep.
    ///
    /// The loop exits without touching state once `shutdown` fires.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        stale_after: chrono::Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        debug!("Presence sweeper stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        let evicted = self.sweep_at(Utc::now(), stale_after);
                        if !evicted.is_empty() {
                            info!(evicted = evicted.len(), "Evicted stale presence records");
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::ErrorKind;

    #[test]
    fn test_last_writer_wins() {
        let tracker = PresenceTracker::new();
        let user = UserId::new();
        let (sock_a, sock_b) = (ConnectionId::new(), ConnectionId::new());

        tracker.set_online(user, sock_a);
        tracker.set_online(user, sock_b);
        assert!(tracker.is_online(user));
        assert_eq!(tracker.record(user).unwrap().connection_id, sock_b);

        tracker.set_offline(user);
        assert!(!tracker.is_online(user));
        assert_eq!(tracker.get_status(user), PresenceStatus::Offline);
    }

    #[test]
    fn test_set_offline_unknown_user_is_noop() {
        let tracker = PresenceTracker::new();
        let online = UserId::new();
        tracker.set_online(online, ConnectionId::new());

        assert!(tracker.set_offline(UserId::new()).is_none());
        assert_eq!(tracker.online_count(), 1);
    }

    #[test]
    fn test_reconnect_keeps_status() {
        let tracker = PresenceTracker::new();
        let user = UserId::new();
        tracker.set_online(user, ConnectionId::new());
        tracker.update_status(user, "busy").unwrap();
        tracker.set_online(user, ConnectionId::new());
        assert_eq!(tracker.get_status(user), PresenceStatus::Busy);
    }

    #[test]
    fn test_update_status_errors() {
        let tracker = PresenceTracker::new();
        let user = UserId::new();
        let err = tracker.update_status(user, "away").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);

        tracker.set_online(user, ConnectionId::new());
        assert!(tracker.update_status(user, "sleeping").is_err());
        assert_eq!(tracker.update_status(user, "away").unwrap().status, PresenceStatus::Away);
    }

    #[test]
    fn test_last_seen_retained_after_disconnect() {
        let tracker = PresenceTracker::new();
        let user = UserId::new();
        assert!(tracker.get_last_seen(user).is_none());

        tracker.set_online(user, ConnectionId::new());
        tracker.set_offline(user);
        assert!(tracker.get_last_seen(user).is_some());
    }

    #[test]
    fn test_last_seen_is_trimmed_oldest_first() {
        let tracker = PresenceTracker::with_last_seen_limit(4, 2);
        let users: Vec<UserId> = (0..5).map(|_| UserId::new()).collect();
        let start = Utc::now();

        for (i, user) in users.iter().enumerate() {
            tracker.remember_last_seen(*user, start + chrono::Duration::seconds(i as i64));
            assert!(tracker.last_seen_count() <= 4);
        }

        assert_eq!(tracker.last_seen_count(), 2);
        assert!(tracker.get_last_seen(users[0]).is_none());
        assert!(tracker.get_last_seen(users[2]).is_none());
        assert!(tracker.get_last_seen(users[3]).is_some());
        assert!(tracker.get_last_seen(users[4]).is_some());
    }

    #[test]
    fn test_sweep_evicts_only_stale() {
        let tracker = PresenceTracker::new();
        let (idle, active) = (UserId::new(), UserId::new());
        tracker.set_online(idle, ConnectionId::new());
        tracker.set_online(active, ConnectionId::new());

        // Only `idle` has been quiet for 31 minutes.
        let later = Utc::now() + chrono::Duration::minutes(31);
        tracker.online.get_mut(&active).unwrap().last_activity = later;

        let evicted = tracker.sweep_at(later, chrono::Duration::minutes(30));
        assert_eq!(evicted, vec![idle]);
        assert!(!tracker.is_online(idle));
        assert!(tracker.is_online(active));
        assert!(tracker.get_last_seen(idle).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_stops_on_shutdown() {
        let tracker = Arc::new(PresenceTracker::new());
        let (tx, rx) = broadcast::channel(1);
        let task = tracker.spawn_sweeper(
            Duration::from_secs(300),
            chrono::Duration::minutes(30),
            rx,
        );
        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("sweeper should stop")
            .unwrap();
    }
}
