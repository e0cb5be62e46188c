//! Connection manager, owns the live-connection table and room fan-out.
//!
//! This is the only writer of connection and room state. Every outbound
//! event, whether a group broadcast or a private notice, goes through it.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use parley_core::config::RealtimeConfig;
use parley_core::types::{ConnectionId, GroupId, UserId};
use parley_entity::UserIdentity;

use crate::channel::registry::RoomRegistry;
use crate::message::types::OutboundEvent;
use crate::metrics::RealtimeMetrics;

use super::handle::ConnectionHandle;
use super::pool::ConnectionPool;

/// A deregistered connection plus what the user still has open.
#[derive(Debug)]
pub struct Deregistered {
    /// The connection that was removed.
    pub handle: Arc<ConnectionHandle>,
    /// The user's remaining connections, oldest first.
    pub remaining: Vec<Arc<ConnectionHandle>>,
}

/// Manages all live connections and their room subscriptions.
#[derive(Debug)]
pub struct ConnectionManager {
    pool: ConnectionPool,
    rooms: RoomRegistry,
    metrics: Arc<RealtimeMetrics>,
    config: RealtimeConfig,
}

impl ConnectionManager {
    /// Creates a new connection manager.
    pub fn new(config: RealtimeConfig, metrics: Arc<RealtimeMetrics>) -> Self {
        Self {
            pool: ConnectionPool::new(),
            rooms: RoomRegistry::new(),
            metrics,
            config,
        }
    }

    /// Registers a new authenticated connection.
    ///
    /// Returns the connection handle and a receiver for outbound events. If
    /// the user is at the connection cap, the oldest connection is evicted.
    pub fn register(
        &self,
        user: UserIdentity,
    ) -> (Arc<ConnectionHandle>, mpsc::Receiver<OutboundEvent>) {
        let (tx, rx) = mpsc::channel(self.config.channel_buffer_size.max(1));
        let handle = Arc::new(ConnectionHandle::new(user, tx));
        let user_id = handle.user_id();

        let existing = self.pool.user_connections(&user_id);
        let cap = self.config.max_connections_per_user.max(1);
        if existing.len() >= cap {
            let excess = existing.len() + 1 - cap;
            warn!(
                user_id = %user_id,
                count = existing.len(),
                max = cap,
                "User at max connections, evicting oldest"
            );
            for oldest in existing.iter().take(excess) {
                self.evict(oldest);
            }
        }

        self.pool.add(handle.clone());
        self.metrics.connection_opened();

        info!(
            conn_id = %handle.id,
            user_id = %user_id,
            "Connection registered"
        );

        (handle, rx)
    }

    fn evict(&self, handle: &Arc<ConnectionHandle>) {
        handle.mark_closed();
        if self.pool.remove(&handle.id).is_some() {
            self.rooms.unsubscribe_all(handle.id);
            self.metrics.connection_closed();
            info!(conn_id = %handle.id, user_id = %handle.user_id(), "Connection evicted");
        }
    }

    /// Deregisters a connection and drops its room subscriptions.
    ///
    /// Returns `None` if the connection was unknown (already removed).
    pub fn unregister(&self, conn_id: &ConnectionId) -> Option<Deregistered> {
        let handle = self.pool.remove(conn_id)?;
        handle.mark_closed();
        self.rooms.unsubscribe_all(*conn_id);
        self.metrics.connection_closed();

        info!(
            conn_id = %conn_id,
            user_id = %handle.user_id(),
            "Connection unregistered"
        );

        let remaining = self.pool.user_connections(&handle.user_id());
        Some(Deregistered { handle, remaining })
    }

    /// Subscribes a connection to a group room. Returns `false` if it already was.
    pub fn join_room(&self, conn_id: ConnectionId, group_id: GroupId) -> bool {
        let joined = self.rooms.subscribe(group_id, conn_id);
        if joined {
            debug!(conn_id = %conn_id, group_id = %group_id, "Joined room");
        }
        joined
    }

    /// Unsubscribes a connection from a group room. Returns `false` if it was not subscribed.
    pub fn leave_room(&self, conn_id: ConnectionId, group_id: GroupId) -> bool {
        let left = self.rooms.unsubscribe(group_id, conn_id);
        if left {
            debug!(conn_id = %conn_id, group_id = %group_id, "Left room");
        }
        left
    }

    /// Whether a connection is subscribed to a group room.
    pub fn is_subscribed(&self, conn_id: ConnectionId, group_id: &GroupId) -> bool {
        self.rooms.is_subscribed(group_id, conn_id)
    }

    /// Rooms a connection is subscribed to.
    pub fn rooms_of(&self, conn_id: ConnectionId) -> Vec<GroupId> {
        self.rooms.rooms_of(conn_id)
    }

    /// Sends to every connection in a group room, optionally skipping one user.
    ///
    /// At most once per connection; nothing is queued for absent members.
    /// Returns the number of connections the event was queued on.
    pub fn broadcast_to_group(
        &self,
        group_id: &GroupId,
        event: &OutboundEvent,
        exclude_user: Option<UserId>,
    ) -> usize {
        let mut sent = 0usize;
        for conn_id in self.rooms.subscribers(group_id) {
            let Some(handle) = self.pool.get(&conn_id) else {
                continue;
            };
            if exclude_user == Some(handle.user_id()) {
                continue;
            }
            if handle.send(event.clone()) {
                sent += 1;
            }
        }
        self.metrics.events_sent(sent as u64);
        sent
    }

    /// Sends to every connection of a user.
    ///
    /// Returns whether the user has a live connection that accepted the event.
    pub fn send_to_user(&self, user_id: &UserId, event: &OutboundEvent) -> bool {
        let mut sent = 0u64;
        for handle in self.pool.user_connections(user_id) {
            if handle.send(event.clone()) {
                sent += 1;
            }
        }
        self.metrics.events_sent(sent);
        sent > 0
    }

    /// Sends to a single connection.
    pub fn send_to_connection(&self, conn_id: &ConnectionId, event: OutboundEvent) -> bool {
        let sent = self
            .pool
            .get(conn_id)
            .is_some_and(|handle| handle.send(event));
        if sent {
            self.metrics.events_sent(1);
        }
        sent
    }

    /// Sends to every live connection.
    pub fn broadcast_all(&self, event: &OutboundEvent) -> usize {
        let sent = self
            .pool
            .all_connections()
            .iter()
            .filter(|handle| handle.send(event.clone()))
            .count();
        self.metrics.events_sent(sent as u64);
        sent
    }

    /// Closes and deregisters every connection.
    pub fn close_all(&self) -> usize {
        let all = self.pool.all_connections();
        for handle in &all {
            handle.mark_closed();
            if self.pool.remove(&handle.id).is_some() {
                self.rooms.unsubscribe_all(handle.id);
                self.metrics.connection_closed();
            }
        }
        info!(count = all.len(), "All connections closed");
        all.len()
    }

    /// Gets a connection by ID.
    pub fn get(&self, conn_id: &ConnectionId) -> Option<Arc<ConnectionHandle>> {
        self.pool.get(conn_id)
    }

    /// A user's live connections, oldest first.
    pub fn user_connections(&self, user_id: &UserId) -> Vec<Arc<ConnectionHandle>> {
        self.pool.user_connections(user_id)
    }

    /// Checks if a user has at least one live connection.
    pub fn is_user_connected(&self, user_id: &UserId) -> bool {
        !self.pool.user_connections(user_id).is_empty()
    }

    /// Returns the total connection count.
    pub fn connection_count(&self) -> usize {
        self.pool.connection_count()
    }

    /// Returns the number of unique connected users.
    pub fn user_count(&self) -> usize {
        self.pool.user_count()
    }

    /// Returns the number of non-empty rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.room_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(name: &str) -> UserIdentity {
        UserIdentity {
            id: UserId::new(),
            name: name.to_string(),
            email: format!("{name}@example.com"),
            is_verified: true,
        }
    }

    fn manager(max_per_user: usize) -> ConnectionManager {
        ConnectionManager::new(
            RealtimeConfig {
                max_connections_per_user: max_per_user,
                ..RealtimeConfig::default()
            },
            Arc::new(RealtimeMetrics::new()),
        )
    }

    fn ping() -> OutboundEvent {
        OutboundEvent::Error {
            code: "PING".to_string(),
            message: "ping".to_string(),
        }
    }

    #[tokio::test]
    async fn test_broadcast_excludes_sender() {
        let manager = manager(5);
        let group = GroupId::new();
        let (alice, mut alice_rx) = manager.register(identity("alice"));
        let (bob, mut bob_rx) = manager.register(identity("bob"));
        manager.join_room(alice.id, group);
        manager.join_room(bob.id, group);

        let sent = manager.broadcast_to_group(&group, &ping(), Some(alice.user_id()));
        assert_eq!(sent, 1);
        assert!(bob_rx.try_recv().is_ok());
        assert!(alice_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_to_user_reports_presence_of_connection() {
        let manager = manager(5);
        let (alice, _rx) = manager.register(identity("alice"));
        assert!(manager.send_to_user(&alice.user_id(), &ping()));
        assert!(!manager.send_to_user(&UserId::new(), &ping()));
    }

    #[tokio::test]
    async fn test_oldest_connection_evicted_at_cap() {
        let manager = manager(2);
        let user = identity("alice");
        let (first, _r1) = manager.register(user.clone());
        let (second, _r2) = manager.register(user.clone());
        manager.join_room(first.id, GroupId::new());
        let (third, _r3) = manager.register(user.clone());

        assert!(!first.is_alive());
        assert!(manager.get(&first.id).is_none());
        assert!(manager.rooms_of(first.id).is_empty());
        let ids: Vec<_> = manager
            .user_connections(&user.id)
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![second.id, third.id]);
    }

    #[tokio::test]
    async fn test_unregister_reports_remaining() {
        let manager = manager(5);
        let user = identity("alice");
        let (phone, _r1) = manager.register(user.clone());
        let (laptop, _r2) = manager.register(user.clone());

        let gone = manager.unregister(&phone.id).unwrap();
        assert_eq!(gone.remaining.len(), 1);
        assert_eq!(gone.remaining[0].id, laptop.id);

        assert!(manager.unregister(&phone.id).is_none());
        let gone = manager.unregister(&laptop.id).unwrap();
        assert!(gone.remaining.is_empty());
        assert!(!manager.is_user_connected(&user.id));
    }
}
