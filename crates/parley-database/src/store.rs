//! Store interfaces consumed by the real-time core.
//!
//! Membership, messages, and users are owned by the persistence layer.
//! The core never caches them beyond a single event.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use parley_core::result::AppResult;
use parley_core::types::{GroupId, MessageId, UserId};
use parley_entity::{Group, GroupMembership, Message, MessageStatus, NewMessage, UserIdentity};

use crate::memory::MemoryStore;

/// Group, membership, role, and active-status lookups.
#[async_trait]
pub trait MembershipStore: Send + Sync + 'static {
    /// Find a group by ID.
    async fn find_group(&self, group_id: GroupId) -> AppResult<Option<Group>>;

    /// Find a user's membership row in a group, active or not.
    async fn find_membership(
        &self,
        group_id: GroupId,
        user_id: UserId,
    ) -> AppResult<Option<GroupMembership>>;

    /// Active memberships of a user in active groups.
    async fn active_memberships(&self, user_id: UserId) -> AppResult<Vec<GroupMembership>>;

    /// Active members of a group.
    async fn active_members(&self, group_id: GroupId) -> AppResult<Vec<GroupMembership>>;

    /// Other members of the active direct groups a user belongs to.
    async fn direct_counterparts(&self, user_id: UserId) -> AppResult<Vec<UserId>>;
}

/// Message CRUD, status transitions, and undelivered queries.
#[async_trait]
pub trait MessageStore: Send + Sync + 'static {
    /// Persist a new message with status `sent`.
    async fn create(&self, new: NewMessage) -> AppResult<Message>;

    /// Find a message by ID (soft-deleted messages included).
    async fn find_by_id(&self, id: MessageId) -> AppResult<Option<Message>>;

    /// Find several messages; unknown IDs are skipped.
    async fn find_by_ids(&self, ids: &[MessageId]) -> AppResult<Vec<Message>>;

    /// Replace the text content and stamp the edit time.
    ///
    /// Fails with `InvalidState` for soft-deleted or non-text messages.
    async fn update_content(
        &self,
        id: MessageId,
        content: &str,
        edited_at: DateTime<Utc>,
    ) -> AppResult<Message>;

    /// Clear content and file fields and mark the message deleted.
    async fn soft_delete(&self, id: MessageId, deleted_at: DateTime<Utc>) -> AppResult<Message>;

    /// Remove the message outright. Returns `true` if a row was removed.
    async fn hard_delete(&self, id: MessageId) -> AppResult<bool>;

    /// Move messages forward to `status`; messages already at or past it,
    /// or soft-deleted, are left alone. Returns the number changed.
    async fn advance_status(&self, ids: &[MessageId], status: MessageStatus) -> AppResult<u64>;

    /// Undeleted messages still at `sent` in the given groups, not authored
    /// by `recipient`, oldest first.
    async fn find_undelivered(
        &self,
        group_ids: &[GroupId],
        recipient: UserId,
    ) -> AppResult<Vec<Message>>;
}

/// External user lookup used during the authentication handshake.
#[async_trait]
pub trait UserDirectory: Send + Sync + 'static {
    /// Resolve a user ID to an identity snapshot.
    async fn find_identity(&self, user_id: UserId) -> AppResult<Option<UserIdentity>>;
}

/// The three store handles the engine is constructed with.
#[derive(Clone)]
pub struct Stores {
    /// Membership lookups.
    pub membership: Arc<dyn MembershipStore>,
    /// Message persistence.
    pub messages: Arc<dyn MessageStore>,
    /// User lookups.
    pub users: Arc<dyn UserDirectory>,
}

impl Stores {
    /// Back all three interfaces with one in-memory store.
    pub fn from_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            membership: store.clone(),
            messages: store.clone(),
            users: store,
        }
    }
}

impl std::fmt::Debug for Stores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stores").finish()
    }
}
