//! Group and membership lookups.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use parley_core::error::{AppError, ErrorKind};
use parley_core::result::AppResult;
use parley_core::types::{GroupId, UserId};
use parley_entity::{Group, GroupMembership};

use crate::store::MembershipStore;

#[derive(Debug, sqlx::FromRow)]
struct GroupRow {
    id: GroupId,
    name: String,
    kind: String,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<GroupRow> for Group {
    type Error = AppError;

    fn try_from(row: GroupRow) -> Result<Self, Self::Error> {
        Ok(Group {
            id: row.id,
            name: row.name,
            kind: row.kind.parse()?,
            is_active: row.is_active,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MemberRow {
    group_id: GroupId,
    user_id: UserId,
    role: String,
    is_active: bool,
    joined_at: DateTime<Utc>,
}

impl TryFrom<MemberRow> for GroupMembership {
    type Error = AppError;

    fn try_from(row: MemberRow) -> Result<Self, Self::Error> {
        Ok(GroupMembership {
            group_id: row.group_id,
            user_id: row.user_id,
            role: row.role.parse()?,
            is_active: row.is_active,
            joined_at: row.joined_at,
        })
    }
}

const MEMBER_COLUMNS: &str = "gm.group_id, gm.user_id, gm.role, gm.is_active, gm.joined_at";

/// Repository for the `groups` and `group_members` tables.
#[derive(Debug, Clone)]
pub struct MembershipRepository {
    pool: PgPool,
}

impl MembershipRepository {
    /// Create a new membership repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MembershipStore for MembershipRepository {
    async fn find_group(&self, group_id: GroupId) -> AppResult<Option<Group>> {
        sqlx::query_as::<_, GroupRow>(
            "SELECT id, name, kind, is_active, created_at FROM groups WHERE id = $1",
        )
        .bind(group_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find group", e))?
        .map(Group::try_from)
        .transpose()
    }

    async fn find_membership(
        &self,
        group_id: GroupId,
        user_id: UserId,
    ) -> AppResult<Option<GroupMembership>> {
        sqlx::query_as::<_, MemberRow>(&format!(
            "SELECT {MEMBER_COLUMNS} FROM group_members gm WHERE gm.group_id = $1 AND gm.user_id = $2"
        ))
        .bind(group_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find membership", e))?
        .map(GroupMembership::try_from)
        .transpose()
    }

    async fn active_memberships(&self, user_id: UserId) -> AppResult<Vec<GroupMembership>> {
        sqlx::query_as::<_, MemberRow>(&format!(
            "SELECT {MEMBER_COLUMNS} FROM group_members gm \
             JOIN groups g ON g.id = gm.group_id \
             WHERE gm.user_id = $1 AND gm.is_active AND g.is_active"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to list user memberships", e)
        })?
        .into_iter()
        .map(GroupMembership::try_from)
        .collect()
    }

    async fn active_members(&self, group_id: GroupId) -> AppResult<Vec<GroupMembership>> {
        sqlx::query_as::<_, MemberRow>(&format!(
            "SELECT {MEMBER_COLUMNS} FROM group_members gm WHERE gm.group_id = $1 AND gm.is_active"
        ))
        .bind(group_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to list group members", e)
        })?
        .into_iter()
        .map(GroupMembership::try_from)
        .collect()
    }

    async fn direct_counterparts(&self, user_id: UserId) -> AppResult<Vec<UserId>> {
        sqlx::query_scalar::<_, UserId>(
            "SELECT DISTINCT other.user_id FROM group_members me \
             JOIN groups g ON g.id = me.group_id AND g.kind = 'direct' AND g.is_active \
             JOIN group_members other ON other.group_id = me.group_id \
               AND other.user_id <> me.user_id AND other.is_active \
             WHERE me.user_id = $1 AND me.is_active",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to list direct counterparts", e)
        })
    }
}
