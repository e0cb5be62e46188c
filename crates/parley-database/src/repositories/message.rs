//! Message persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;

use parley_core::error::{AppError, ErrorKind};
use parley_core::result::AppResult;
use parley_core::types::{GroupId, MessageId, UserId};
use parley_entity::{FileRef, Message, MessageStatus, NewMessage};

use crate::store::MessageStore;

#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    id: MessageId,
    group_id: GroupId,
    sender_id: UserId,
    message_type: String,
    content: Option<String>,
    file: Option<Json<FileRef>>,
    reply_to_id: Option<MessageId>,
    status: String,
    is_deleted: bool,
    created_at: DateTime<Utc>,
    edited_at: Option<DateTime<Utc>>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<MessageRow> for Message {
    type Error = AppError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        Ok(Message {
            id: row.id,
            group_id: row.group_id,
            sender_id: row.sender_id,
            message_type: row.message_type.parse()?,
            content: row.content,
            file: row.file.map(|f| f.0),
            reply_to_id: row.reply_to_id,
            status: row.status.parse()?,
            is_deleted: row.is_deleted,
            created_at: row.created_at,
            edited_at: row.edited_at,
            deleted_at: row.deleted_at,
        })
    }
}

const COLUMNS: &str = "id, group_id, sender_id, message_type, content, file, reply_to_id, \
                       status, is_deleted, created_at, edited_at, deleted_at";

/// SQL rank of a status so forward-only updates can be expressed as `<`.
const STATUS_RANK: &str =
    "CASE status WHEN 'sent' THEN 0 WHEN 'delivered' THEN 1 ELSE 2 END";

fn status_rank(status: MessageStatus) -> i32 {
    match status {
        MessageStatus::Sent => 0,
        MessageStatus::Delivered => 1,
        MessageStatus::Read => 2,
    }
}

/// Content edit, guarded so deleted and media rows are never rewritten.
fn edit_query() -> String {
    format!(
        "UPDATE messages SET content = $2, edited_at = $3 \
         WHERE id = $1 AND NOT is_deleted AND message_type = 'text' RETURNING {COLUMNS}"
    )
}

/// Repository for the `messages` table.
#[derive(Debug, Clone)]
pub struct MessageRepository {
    pool: PgPool,
}

impl MessageRepository {
    /// Create a new message repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for MessageRepository {
    async fn create(&self, new: NewMessage) -> AppResult<Message> {
        sqlx::query_as::<_, MessageRow>(&format!(
            "INSERT INTO messages (id, group_id, sender_id, message_type, content, file, reply_to_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {COLUMNS}"
        ))
        .bind(MessageId::new())
        .bind(new.group_id)
        .bind(new.sender_id)
        .bind(new.message_type.as_str())
        .bind(new.content.as_deref())
        .bind(new.file.as_ref().map(Json))
        .bind(new.reply_to_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to create message", e))?
        .try_into()
    }

    async fn find_by_id(&self, id: MessageId) -> AppResult<Option<Message>> {
        sqlx::query_as::<_, MessageRow>(&format!("SELECT {COLUMNS} FROM messages WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find message", e))?
            .map(Message::try_from)
            .transpose()
    }

    async fn find_by_ids(&self, ids: &[MessageId]) -> AppResult<Vec<Message>> {
        sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {COLUMNS} FROM messages WHERE id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find messages", e))?
        .into_iter()
        .map(Message::try_from)
        .collect()
    }

    async fn update_content(
        &self,
        id: MessageId,
        content: &str,
        edited_at: DateTime<Utc>,
    ) -> AppResult<Message> {
        let edited = sqlx::query_as::<_, MessageRow>(&edit_query())
            .bind(id)
            .bind(content)
            .bind(edited_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to edit message", e))?;

        match edited {
            Some(row) => row.try_into(),
            None if self.find_by_id(id).await?.is_some() => {
                Err(AppError::invalid_state("Message can no longer be edited"))
            }
            None => Err(AppError::not_found("Message not found")),
        }
    }

    async fn soft_delete(&self, id: MessageId, deleted_at: DateTime<Utc>) -> AppResult<Message> {
        sqlx::query_as::<_, MessageRow>(&format!(
            "UPDATE messages SET content = NULL, file = NULL, is_deleted = TRUE, deleted_at = $2 \
             WHERE id = $1 RETURNING {COLUMNS}"
        ))
        .bind(id)
        .bind(deleted_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to delete message", e))?
        .ok_or_else(|| AppError::not_found("Message not found"))?
        .try_into()
    }

    async fn hard_delete(&self, id: MessageId) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM messages WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to remove message", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn advance_status(&self, ids: &[MessageId], status: MessageStatus) -> AppResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(&format!(
            "UPDATE messages SET status = $2 \
             WHERE id = ANY($1) AND NOT is_deleted AND {STATUS_RANK} < $3"
        ))
        .bind(ids)
        .bind(status.as_str())
        .bind(status_rank(status))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to update message status", e)
        })?;
        Ok(result.rows_affected())
    }

    async fn find_undelivered(
        &self,
        group_ids: &[GroupId],
        recipient: UserId,
    ) -> AppResult<Vec<Message>> {
        if group_ids.is_empty() {
            return Ok(Vec::new());
        }
        sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {COLUMNS} FROM messages \
             WHERE group_id = ANY($1) AND status = 'sent' AND NOT is_deleted AND sender_id <> $2 \
             ORDER BY created_at ASC"
        ))
        .bind(group_ids)
        .bind(recipient)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to list undelivered messages", e)
        })?
        .into_iter()
        .map(Message::try_from)
        .collect()
    }
}
