//! User lookups.

use async_trait::async_trait;
use sqlx::PgPool;

use parley_core::error::{AppError, ErrorKind};
use parley_core::result::AppResult;
use parley_core::types::UserId;
use parley_entity::UserIdentity;

use crate::store::UserDirectory;

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: UserId,
    name: String,
    email: String,
    is_verified: bool,
}

/// Repository for the `users` table.
#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Create a new user repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for UserRepository {
    async fn find_identity(&self, user_id: UserId) -> AppResult<Option<UserIdentity>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, email, is_verified FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find user", e))?;

        Ok(row.map(|r| UserIdentity {
            id: r.id,
            name: r.name,
            email: r.email,
            is_verified: r.is_verified,
        }))
    }
}
