//! Subscription tracking, which rooms each connection is subscribed to.

use std::collections::HashSet;

use dashmap::DashMap;

use parley_core::types::{ConnectionId, GroupId};

/// Tracks connection-to-room subscription mappings (reverse index).
#[derive(Debug, Default)]
pub struct SubscriptionTracker {
    /// Connection ID → set of group rooms.
    conn_to_rooms: DashMap<ConnectionId, HashSet<GroupId>>,
}

impl SubscriptionTracker {
    /// Creates a new subscription tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a subscription. Returns `false` if it already existed.
    pub fn add(&self, conn_id: ConnectionId, group_id: GroupId) -> bool {
        self.conn_to_rooms
            .entry(conn_id)
            .or_default()
            .insert(group_id)
    }

    /// Removes a subscription. Returns `false` if there was none.
    pub fn remove(&self, conn_id: ConnectionId, group_id: &GroupId) -> bool {
        let removed = self
            .conn_to_rooms
            .get_mut(&conn_id)
            .map(|mut rooms| rooms.remove(group_id))
            .unwrap_or(false);
        self.conn_to_rooms
            .remove_if(&conn_id, |_, rooms| rooms.is_empty());
        removed
    }

    /// Whether a connection is subscribed to a room.
    pub fn contains(&self, conn_id: ConnectionId, group_id: &GroupId) -> bool {
        self.conn_to_rooms
            .get(&conn_id)
            .is_some_and(|rooms| rooms.contains(group_id))
    }

    /// Gets all rooms a connection is subscribed to.
    pub fn rooms(&self, conn_id: ConnectionId) -> HashSet<GroupId> {
        self.conn_to_rooms
            .get(&conn_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Removes all subscriptions for a connection.
    pub fn remove_all(&self, conn_id: ConnectionId) -> HashSet<GroupId> {
        self.conn_to_rooms
            .remove(&conn_id)
            .map(|(_, rooms)| rooms)
            .unwrap_or_default()
    }
}
