//! Chat messages.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use parley_core::AppError;
use parley_core::types::{GroupId, MessageId, UserId};

/// Kind of payload a message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Plain text content.
    Text,
    /// Image file reference.
    Image,
    /// Generic file reference.
    File,
    /// Audio file reference.
    Audio,
    /// Video file reference.
    Video,
}

impl MessageType {
    /// Whether this type carries a file reference instead of text.
    pub fn is_media(&self) -> bool {
        !matches!(self, Self::Text)
    }

    /// Return the type as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::File => "file",
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            "file" => Ok(Self::File),
            "audio" => Ok(Self::Audio),
            "video" => Ok(Self::Video),
            _ => Err(AppError::validation(format!("Invalid message type: '{s}'"))),
        }
    }
}

/// Delivery lifecycle of a message. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Persisted and fanned out.
    Sent,
    /// At least one recipient device confirmed receipt.
    Delivered,
    /// At least one recipient viewed it.
    Read,
}

impl MessageStatus {
    /// Whether moving from `self` to `next` is a forward transition.
    pub fn can_advance_to(&self, next: MessageStatus) -> bool {
        next > *self
    }

    /// Return the status as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
        }
    }
}

impl FromStr for MessageStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(Self::Sent),
            "delivered" => Ok(Self::Delivered),
            "read" => Ok(Self::Read),
            _ => Err(AppError::validation(format!("Invalid message status: '{s}'"))),
        }
    }
}

/// Reference to an uploaded file; storage itself lives elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    /// Where the file can be fetched.
    pub url: String,
    /// Original file name.
    #[serde(default)]
    pub name: Option<String>,
    /// Size in bytes.
    #[serde(default)]
    pub size: Option<u64>,
    /// MIME type.
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// A persisted chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message ID.
    pub id: MessageId,
    /// Group the message was sent to.
    pub group_id: GroupId,
    /// Author.
    pub sender_id: UserId,
    /// Payload kind.
    pub message_type: MessageType,
    /// Text content (text messages, optional caption otherwise).
    pub content: Option<String>,
    /// File reference (media messages).
    pub file: Option<FileRef>,
    /// Message this one replies to.
    pub reply_to_id: Option<MessageId>,
    /// Delivery status.
    pub status: MessageStatus,
    /// Soft-delete flag; terminal.
    pub is_deleted: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last edit time.
    pub edited_at: Option<DateTime<Utc>>,
    /// Soft-delete time.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Build the row for a freshly persisted message.
    pub fn from_new(id: MessageId, new: NewMessage, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            group_id: new.group_id,
            sender_id: new.sender_id,
            message_type: new.message_type,
            content: new.content,
            file: new.file,
            reply_to_id: new.reply_to_id,
            status: MessageStatus::Sent,
            is_deleted: false,
            created_at,
            edited_at: None,
            deleted_at: None,
        }
    }

    /// Only undeleted text messages can be edited.
    pub fn is_editable(&self) -> bool {
        !self.is_deleted && self.message_type == MessageType::Text
    }

    /// Advance the status if `next` is ahead of the current one.
    ///
    /// Returns `true` when the status changed.
    pub fn advance_status(&mut self, next: MessageStatus) -> bool {
        if self.status.can_advance_to(next) {
            self.status = next;
            true
        } else {
            false
        }
    }

    /// Clear content and file fields and mark the message deleted.
    pub fn soft_delete(&mut self, at: DateTime<Utc>) {
        self.content = None;
        self.file = None;
        self.is_deleted = true;
        self.deleted_at = Some(at);
    }
}

/// Validated input for creating a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    /// Target group.
    pub group_id: GroupId,
    /// Author.
    pub sender_id: UserId,
    /// Payload kind.
    pub message_type: MessageType,
    /// Text content.
    pub content: Option<String>,
    /// File reference.
    pub file: Option<FileRef>,
    /// Message being replied to.
    pub reply_to_id: Option<MessageId>,
}
