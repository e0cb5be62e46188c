//! Room registry, one room per chat group.

use std::collections::HashSet;

use dashmap::DashMap;

use parley_core::types::{ConnectionId, GroupId};

use super::subscription::SubscriptionTracker;

/// Registry of all non-empty group rooms.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    /// Group ID → subscribed connections.
    rooms: DashMap<GroupId, HashSet<ConnectionId>>,
    /// Reverse index.
    subscriptions: SubscriptionTracker,
}

impl RoomRegistry {
    /// Creates a new room registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes a connection to a room. Returns `false` if already subscribed.
    pub fn subscribe(&self, group_id: GroupId, conn_id: ConnectionId) -> bool {
        self.rooms.entry(group_id).or_default().insert(conn_id);
        self.subscriptions.add(conn_id, group_id)
    }

    /// Unsubscribes a connection from a room. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, group_id: GroupId, conn_id: ConnectionId) -> bool {
        self.leave_room(&group_id, conn_id);
        self.subscriptions.remove(conn_id, &group_id)
    }

    /// Unsubscribes a connection from every room.
    pub fn unsubscribe_all(&self, conn_id: ConnectionId) -> Vec<GroupId> {
        let rooms = self.subscriptions.remove_all(conn_id);
        for group_id in &rooms {
            self.leave_room(group_id, conn_id);
        }
        rooms.into_iter().collect()
    }

    fn leave_room(&self, group_id: &GroupId, conn_id: ConnectionId) {
        if let Some(mut members) = self.rooms.get_mut(group_id) {
            members.remove(&conn_id);
        }
        self.rooms.remove_if(group_id, |_, members| members.is_empty());
    }

    /// Whether a connection is subscribed to a room.
    pub fn is_subscribed(&self, group_id: &GroupId, conn_id: ConnectionId) -> bool {
        self.subscriptions.contains(conn_id, group_id)
    }

    /// Returns all subscriber connection IDs for a room.
    pub fn subscribers(&self, group_id: &GroupId) -> Vec<ConnectionId> {
        self.rooms
            .get(group_id)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Rooms a connection is subscribed to.
    pub fn rooms_of(&self, conn_id: ConnectionId) -> Vec<GroupId> {
        self.subscriptions.rooms(conn_id).into_iter().collect()
    }

    /// Returns total number of non-empty rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
