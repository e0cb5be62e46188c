//! In-memory store for development and tests.
//!
//! Enforces the same invariants as the PostgreSQL adapter: status only
//! moves forward, and soft-deleted messages never change status or content
//! again.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use parley_core::error::AppError;
use parley_core::result::AppResult;
use parley_core::types::{GroupId, MessageId, UserId};
use parley_entity::{
    Group, GroupKind, GroupMembership, Message, MessageStatus, NewMessage, UserIdentity,
};

use crate::store::{MembershipStore, MessageStore, UserDirectory};

#[derive(Debug, Default)]
struct MemoryState {
    users: HashMap<UserId, UserIdentity>,
    groups: HashMap<GroupId, Group>,
    members: HashMap<(GroupId, UserId), GroupMembership>,
    messages: HashMap<MessageId, Message>,
}

/// Process-local implementation of every store interface.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a user.
    pub async fn insert_user(&self, user: UserIdentity) {
        self.state.write().await.users.insert(user.id, user);
    }

    /// Insert or replace a group.
    pub async fn insert_group(&self, group: Group) {
        self.state.write().await.groups.insert(group.id, group);
    }

    /// Insert or replace a membership row.
    pub async fn upsert_membership(&self, membership: GroupMembership) {
        self.state
            .write()
            .await
            .members
            .insert((membership.group_id, membership.user_id), membership);
    }

    /// Flip a group's active flag. Returns `false` if the group is unknown.
    pub async fn set_group_active(&self, group_id: GroupId, active: bool) -> bool {
        match self.state.write().await.groups.get_mut(&group_id) {
            Some(group) => {
                group.is_active = active;
                true
            }
            None => false,
        }
    }

    /// Flip a membership's active flag. Returns `false` if there is no row.
    pub async fn set_membership_active(
        &self,
        group_id: GroupId,
        user_id: UserId,
        active: bool,
    ) -> bool {
        match self.state.write().await.members.get_mut(&(group_id, user_id)) {
            Some(member) => {
                member.is_active = active;
                true
            }
            None => false,
        }
    }

    /// Insert or replace a message row as-is, timestamps included.
    pub async fn insert_message(&self, message: Message) {
        self.state
            .write()
            .await
            .messages
            .insert(message.id, message);
    }

    /// Number of stored messages, deleted ones included.
    pub async fn message_count(&self) -> usize {
        self.state.read().await.messages.len()
    }
}

fn is_active_group(state: &MemoryState, group_id: &GroupId) -> bool {
    state.groups.get(group_id).is_some_and(|g| g.is_active)
}

#[async_trait]
impl MembershipStore for MemoryStore {
    async fn find_group(&self, group_id: GroupId) -> AppResult<Option<Group>> {
        Ok(self.state.read().await.groups.get(&group_id).cloned())
    }

    async fn find_membership(
        &self,
        group_id: GroupId,
        user_id: UserId,
    ) -> AppResult<Option<GroupMembership>> {
        Ok(self
            .state
            .read()
            .await
            .members
            .get(&(group_id, user_id))
            .cloned())
    }

    async fn active_memberships(&self, user_id: UserId) -> AppResult<Vec<GroupMembership>> {
        let state = self.state.read().await;
        Ok(state
            .members
            .values()
            .filter(|m| m.user_id == user_id && m.is_active)
            .filter(|m| is_active_group(&state, &m.group_id))
            .cloned()
            .collect())
    }

    async fn active_members(&self, group_id: GroupId) -> AppResult<Vec<GroupMembership>> {
        let state = self.state.read().await;
        Ok(state
            .members
            .values()
            .filter(|m| m.group_id == group_id && m.is_active)
            .cloned()
            .collect())
    }

    async fn direct_counterparts(&self, user_id: UserId) -> AppResult<Vec<UserId>> {
        let state = self.state.read().await;
        let direct_groups: Vec<GroupId> = state
            .members
            .values()
            .filter(|m| m.user_id == user_id && m.is_active)
            .filter(|m| {
                state
                    .groups
                    .get(&m.group_id)
                    .is_some_and(|g| g.is_active && g.kind == GroupKind::Direct)
            })
            .map(|m| m.group_id)
            .collect();

        let mut counterparts: Vec<UserId> = state
            .members
            .values()
            .filter(|m| direct_groups.contains(&m.group_id) && m.user_id != user_id && m.is_active)
            .map(|m| m.user_id)
            .collect();
        counterparts.sort();
        counterparts.dedup();
        Ok(counterparts)
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn create(&self, new: NewMessage) -> AppResult<Message> {
        let message = Message::from_new(MessageId::new(), new, Utc::now());
        self.state
            .write()
            .await
            .messages
            .insert(message.id, message.clone());
        Ok(message)
    }

    async fn find_by_id(&self, id: MessageId) -> AppResult<Option<Message>> {
        Ok(self.state.read().await.messages.get(&id).cloned())
    }

    async fn find_by_ids(&self, ids: &[MessageId]) -> AppResult<Vec<Message>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.messages.get(id).cloned())
            .collect())
    }

    async fn update_content(
        &self,
        id: MessageId,
        content: &str,
        edited_at: DateTime<Utc>,
    ) -> AppResult<Message> {
        let mut state = self.state.write().await;
        let message = state
            .messages
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("Message not found"))?;
        if !message.is_editable() {
            return Err(AppError::invalid_state("Message can no longer be edited"));
        }
        message.content = Some(content.to_string());
        message.edited_at = Some(edited_at);
        Ok(message.clone())
    }

    async fn soft_delete(&self, id: MessageId, deleted_at: DateTime<Utc>) -> AppResult<Message> {
        let mut state = self.state.write().await;
        let message = state
            .messages
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("Message not found"))?;
        message.soft_delete(deleted_at);
        Ok(message.clone())
    }

    async fn hard_delete(&self, id: MessageId) -> AppResult<bool> {
        Ok(self.state.write().await.messages.remove(&id).is_some())
    }

    async fn advance_status(&self, ids: &[MessageId], status: MessageStatus) -> AppResult<u64> {
        let mut state = self.state.write().await;
        let mut changed = 0;
        for id in ids {
            if let Some(message) = state.messages.get_mut(id) {
                if !message.is_deleted && message.advance_status(status) {
                    changed += 1;
                }
            }
        }
        Ok(changed)
    }

    async fn find_undelivered(
        &self,
        group_ids: &[GroupId],
        recipient: UserId,
    ) -> AppResult<Vec<Message>> {
        let state = self.state.read().await;
        let mut pending: Vec<Message> = state
            .messages
            .values()
            .filter(|m| {
                m.status == MessageStatus::Sent
                    && !m.is_deleted
                    && m.sender_id != recipient
                    && group_ids.contains(&m.group_id)
            })
            .cloned()
            .collect();
        pending.sort_by_key(|m| m.created_at);
        Ok(pending)
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn find_identity(&self, user_id: UserId) -> AppResult<Option<UserIdentity>> {
        Ok(self.state.read().await.users.get(&user_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_entity::{MemberRole, MessageType};

    fn group(kind: GroupKind) -> Group {
        Group {
            id: GroupId::new(),
            name: "team".to_string(),
            kind,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn member(group_id: GroupId, user_id: UserId) -> GroupMembership {
        GroupMembership {
            group_id,
            user_id,
            role: MemberRole::Member,
            is_active: true,
            joined_at: Utc::now(),
        }
    }

    fn text(group_id: GroupId, sender_id: UserId) -> NewMessage {
        NewMessage {
            group_id,
            sender_id,
            message_type: MessageType::Text,
            content: Some("hi".to_string()),
            file: None,
            reply_to_id: None,
        }
    }

    #[tokio::test]
    async fn test_advance_status_is_forward_only() {
        let store = MemoryStore::new();
        let msg = store.create(text(GroupId::new(), UserId::new())).await.unwrap();

        assert_eq!(store.advance_status(&[msg.id], MessageStatus::Read).await.unwrap(), 1);
        assert_eq!(
            store.advance_status(&[msg.id], MessageStatus::Delivered).await.unwrap(),
            0
        );
        let stored = store.find_by_id(msg.id).await.unwrap().unwrap();
        assert_eq!(stored.status, MessageStatus::Read);
    }

    #[tokio::test]
    async fn test_soft_deleted_messages_keep_status() {
        let store = MemoryStore::new();
        let msg = store.create(text(GroupId::new(), UserId::new())).await.unwrap();
        store.soft_delete(msg.id, Utc::now()).await.unwrap();

        assert_eq!(
            store.advance_status(&[msg.id], MessageStatus::Delivered).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_soft_deleted_messages_cannot_be_edited() {
        let store = MemoryStore::new();
        let msg = store.create(text(GroupId::new(), UserId::new())).await.unwrap();
        store.soft_delete(msg.id, Utc::now()).await.unwrap();

        let err = store
            .update_content(msg.id, "resurrected", Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.kind, parley_core::ErrorKind::InvalidState);

        let stored = store.find_by_id(msg.id).await.unwrap().unwrap();
        assert!(stored.is_deleted);
        assert!(stored.content.is_none());
        assert!(stored.edited_at.is_none());
    }

    #[tokio::test]
    async fn test_media_messages_cannot_be_edited() {
        let store = MemoryStore::new();
        let mut new = text(GroupId::new(), UserId::new());
        new.message_type = MessageType::Image;
        let msg = store.create(new).await.unwrap();

        let err = store.update_content(msg.id, "caption", Utc::now()).await.unwrap_err();
        assert_eq!(err.kind, parley_core::ErrorKind::InvalidState);
    }

    #[tokio::test]
    async fn test_find_undelivered_excludes_own_and_other_groups() {
        let store = MemoryStore::new();
        let (alice, bob) = (UserId::new(), UserId::new());
        let g = GroupId::new();

        let from_alice = store.create(text(g, alice)).await.unwrap();
        store.create(text(g, bob)).await.unwrap();
        store.create(text(GroupId::new(), alice)).await.unwrap();

        let pending = store.find_undelivered(&[g], bob).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, from_alice.id);
    }

    #[tokio::test]
    async fn test_active_memberships_skip_inactive_groups() {
        let store = MemoryStore::new();
        let user = UserId::new();
        let live = group(GroupKind::Group);
        let archived = group(GroupKind::Group);
        store.insert_group(live.clone()).await;
        store.insert_group(archived.clone()).await;
        store.upsert_membership(member(live.id, user)).await;
        store.upsert_membership(member(archived.id, user)).await;
        store.set_group_active(archived.id, false).await;

        let memberships = store.active_memberships(user).await.unwrap();
        assert_eq!(memberships.len(), 1);
        assert_eq!(memberships[0].group_id, live.id);
    }

    #[tokio::test]
    async fn test_direct_counterparts() {
        let store = MemoryStore::new();
        let (alice, bob, carol) = (UserId::new(), UserId::new(), UserId::new());
        let dm = group(GroupKind::Direct);
        let room = group(GroupKind::Group);
        store.insert_group(dm.clone()).await;
        store.insert_group(room.clone()).await;
        store.upsert_membership(member(dm.id, alice)).await;
        store.upsert_membership(member(dm.id, bob)).await;
        store.upsert_membership(member(room.id, alice)).await;
        store.upsert_membership(member(room.id, carol)).await;

        assert_eq!(store.direct_counterparts(alice).await.unwrap(), vec![bob]);
        assert!(store.direct_counterparts(carol).await.unwrap().is_empty());
    }
}
