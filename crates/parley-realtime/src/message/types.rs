//! Inbound and outbound WebSocket event definitions.
//!
//! Every frame is a JSON object tagged by `type`. Inbound frames may carry
//! an `ack` correlation number; the server answers those with an `ack`
//! event once the request has been handled.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use parley_core::error::AppError;
use parley_core::types::{ConnectionId, GroupId, MessageId, UserId};
use parley_entity::{FileRef, Message, MessageType, PresenceStatus};

/// An inbound frame: the event plus its optional correlation number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundFrame {
    /// Correlation number echoed in the `ack` reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<u64>,
    /// The event itself.
    #[serde(flatten)]
    pub event: InboundEvent,
}

/// Events sent by the client to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    /// Send a new message to a group.
    SendMessage(MessageDraft),
    /// Replace the text of one's own message.
    EditMessage {
        /// Message to edit.
        message_id: MessageId,
        /// New text.
        content: String,
    },
    /// Soft-delete a message.
    DeleteMessage {
        /// Message to delete.
        message_id: MessageId,
    },
    /// Hard-delete one's own unread message shortly after sending.
    RecallMessage {
        /// Message to recall.
        message_id: MessageId,
    },
    /// Subscribe this connection to a group's room.
    JoinGroup {
        /// Group to join.
        group_id: GroupId,
    },
    /// Unsubscribe this connection from a group's room.
    LeaveGroup {
        /// Group to leave.
        group_id: GroupId,
    },
    /// The user started typing in a group.
    TypingStart {
        /// Group being typed in.
        group_id: GroupId,
    },
    /// The user stopped typing in a group.
    TypingStop {
        /// Group being typed in.
        group_id: GroupId,
    },
    /// Change the user's presence status.
    UpdateStatus {
        /// One of online, away, busy, offline.
        status: String,
    },
    /// Device confirmation that messages arrived.
    MessageDelivered {
        /// Delivered messages.
        message_ids: Vec<MessageId>,
    },
    /// The user viewed messages.
    MessageRead {
        /// Read messages.
        message_ids: Vec<MessageId>,
        /// Restrict to messages of this group.
        #[serde(default)]
        group_id: Option<GroupId>,
    },
    /// List online members of a group.
    GetOnlineUsers {
        /// Group to inspect.
        group_id: GroupId,
    },
}

impl InboundEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SendMessage(_) => "send_message",
            Self::EditMessage { .. } => "edit_message",
            Self::DeleteMessage { .. } => "delete_message",
            Self::RecallMessage { .. } => "recall_message",
            Self::JoinGroup { .. } => "join_group",
            Self::LeaveGroup { .. } => "leave_group",
            Self::TypingStart { .. } => "typing_start",
            Self::TypingStop { .. } => "typing_stop",
            Self::UpdateStatus { .. } => "update_status",
            Self::MessageDelivered { .. } => "message_delivered",
            Self::MessageRead { .. } => "message_read",
            Self::GetOnlineUsers { .. } => "get_online_users",
        }
    }
}

fn default_message_type() -> MessageType {
    MessageType::Text
}

/// Client-side draft of a new message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDraft {
    /// Target group.
    pub group_id: GroupId,
    /// Payload kind; text when omitted.
    #[serde(default = "default_message_type")]
    pub message_type: MessageType,
    /// Text content, or caption for media.
    #[serde(default)]
    pub content: Option<String>,
    /// File reference for media types.
    #[serde(default)]
    pub file: Option<FileRef>,
    /// Message being replied to.
    #[serde(default)]
    pub reply_to_id: Option<MessageId>,
    /// Client-generated ID echoed back for optimistic UI correlation.
    #[serde(default)]
    pub temp_id: Option<String>,
}

/// Events sent by the server to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    /// Handshake accepted.
    Connected {
        /// Authenticated user.
        user_id: UserId,
        /// This connection's ID.
        connection_id: ConnectionId,
        /// Rooms the connection was subscribed to.
        groups: Vec<GroupId>,
        /// Server clock at connect time.
        server_time: DateTime<Utc>,
    },
    /// A message was posted to one of the user's groups.
    NewMessage {
        /// The persisted message.
        message: Message,
    },
    /// A message's text changed.
    MessageEdited {
        /// Edited message.
        message_id: MessageId,
        /// Its group.
        group_id: GroupId,
        /// New text.
        content: String,
        /// Edit time.
        edited_at: DateTime<Utc>,
    },
    /// A message was soft-deleted.
    MessageDeleted {
        /// Deleted message.
        message_id: MessageId,
        /// Its group.
        group_id: GroupId,
        /// Who deleted it.
        deleted_by: UserId,
        /// Delete time.
        deleted_at: DateTime<Utc>,
    },
    /// A message was recalled by its sender and no longer exists.
    MessageRecalled {
        /// Recalled message.
        message_id: MessageId,
        /// Its group.
        group_id: GroupId,
        /// The sender.
        recalled_by: UserId,
    },
    /// Private notice to a sender that a recipient received a message.
    MessageDelivered {
        /// Delivered message.
        message_id: MessageId,
        /// Its group.
        group_id: GroupId,
        /// Recipient who confirmed.
        delivered_to: UserId,
        /// Confirmation time.
        delivered_at: DateTime<Utc>,
    },
    /// Group-wide notice that a member read a message.
    MessageRead {
        /// Read message.
        message_id: MessageId,
        /// Its group.
        group_id: GroupId,
        /// Reader.
        read_by: UserId,
        /// Read time.
        read_at: DateTime<Utc>,
    },
    /// Private notice to a sender that a recipient read their message.
    MessageReadByRecipient {
        /// Read message.
        message_id: MessageId,
        /// Its group.
        group_id: GroupId,
        /// Reader.
        read_by: UserId,
        /// Read time.
        read_at: DateTime<Utc>,
    },
    /// A member started typing.
    UserTyping {
        /// Group.
        group_id: GroupId,
        /// Typist.
        user_id: UserId,
        /// Typist display name.
        name: String,
    },
    /// A member stopped typing.
    UserStoppedTyping {
        /// Group.
        group_id: GroupId,
        /// Typist.
        user_id: UserId,
    },
    /// A direct-chat counterpart's presence changed.
    ContactStatusChanged {
        /// Whose status changed.
        user_id: UserId,
        /// New status.
        status: PresenceStatus,
        /// Last activity, if ever seen.
        last_seen: Option<DateTime<Utc>>,
    },
    /// A member's connection joined the group room.
    UserJoinedGroup {
        /// Group.
        group_id: GroupId,
        /// Member.
        user_id: UserId,
        /// Member display name.
        name: String,
    },
    /// A member's connection left the group room.
    UserLeftGroup {
        /// Group.
        group_id: GroupId,
        /// Member.
        user_id: UserId,
    },
    /// A `send_message` was rejected.
    MessageError {
        /// Client correlation ID from the draft.
        temp_id: Option<String>,
        /// Wire error code.
        code: String,
        /// Short human-readable reason.
        reason: String,
    },
    /// The server is draining; the connection closes after this.
    ServerShutdown {
        /// Why the server is stopping.
        reason: String,
        /// Seconds clients should wait before reconnecting.
        grace_seconds: u64,
    },
    /// Reply to an inbound frame that carried `ack`.
    Ack(AckReply),
    /// An inbound frame was rejected.
    Error {
        /// Wire error code.
        code: String,
        /// Short human-readable reason.
        message: String,
    },
}

impl OutboundEvent {
    /// Build an `error` event from an application error.
    pub fn from_error(err: &AppError) -> Self {
        Self::Error {
            code: err.kind.code().to_string(),
            message: err.client_message(),
        }
    }

    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::NewMessage { .. } => "new_message",
            Self::MessageEdited { .. } => "message_edited",
            Self::MessageDeleted { .. } => "message_deleted",
            Self::MessageRecalled { .. } => "message_recalled",
            Self::MessageDelivered { .. } => "message_delivered",
            Self::MessageRead { .. } => "message_read",
            Self::MessageReadByRecipient { .. } => "message_read_by_recipient",
            Self::UserTyping { .. } => "user_typing",
            Self::UserStoppedTyping { .. } => "user_stopped_typing",
            Self::ContactStatusChanged { .. } => "contact_status_changed",
            Self::UserJoinedGroup { .. } => "user_joined_group",
            Self::UserLeftGroup { .. } => "user_left_group",
            Self::MessageError { .. } => "message_error",
            Self::ServerShutdown { .. } => "server_shutdown",
            Self::Ack(_) => "ack",
            Self::Error { .. } => "error",
        }
    }
}

/// Error detail carried by a failed `ack`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Wire error code.
    pub code: String,
    /// Short human-readable reason.
    pub message: String,
}

impl From<&AppError> for ErrorBody {
    fn from(err: &AppError) -> Self {
        Self {
            code: err.kind.code().to_string(),
            message: err.client_message(),
        }
    }
}

/// The request/response half of the protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckReply {
    /// Correlation number from the inbound frame.
    pub ack: u64,
    /// Whether the request succeeded.
    pub success: bool,
    /// Result payload on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Failure detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    /// Echo of the draft's `temp_id`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_id: Option<String>,
}

impl AckReply {
    /// Successful reply.
    pub fn success(ack: u64, data: serde_json::Value, temp_id: Option<String>) -> Self {
        Self {
            ack,
            success: true,
            data: (!data.is_null()).then_some(data),
            error: None,
            temp_id,
        }
    }

    /// Failed reply.
    pub fn failure(ack: u64, err: &AppError, temp_id: Option<String>) -> Self {
        Self {
            ack,
            success: false,
            data: None,
            error: Some(ErrorBody::from(err)),
            temp_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_send_message_frame_parses() {
        let group = GroupId::new();
        let raw = json!({
            "type": "send_message",
            "ack": 7,
            "group_id": group,
            "content": "hi",
            "temp_id": "tmp-1"
        });
        let frame: InboundFrame = serde_json::from_value(raw).unwrap();
        assert_eq!(frame.ack, Some(7));
        match frame.event {
            InboundEvent::SendMessage(draft) => {
                assert_eq!(draft.group_id, group);
                assert_eq!(draft.message_type, MessageType::Text);
                assert_eq!(draft.content.as_deref(), Some("hi"));
                assert_eq!(draft.temp_id.as_deref(), Some("tmp-1"));
            }
            other => panic!("unexpected event {}", other.name()),
        }
    }

    #[test]
    fn test_frame_without_ack() {
        let raw = json!({"type": "typing_start", "group_id": GroupId::new()});
        let frame: InboundFrame = serde_json::from_value(raw).unwrap();
        assert!(frame.ack.is_none());
        assert_eq!(frame.event.name(), "typing_start");
    }

    #[test]
    fn test_upload_file_is_not_accepted() {
        let raw = json!({"type": "upload_file", "group_id": GroupId::new()});
        assert!(serde_json::from_value::<InboundFrame>(raw).is_err());
    }

    #[test]
    fn test_outbound_tagging() {
        let event = OutboundEvent::UserStoppedTyping {
            group_id: GroupId::new(),
            user_id: UserId::new(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "user_stopped_typing");
    }

    #[test]
    fn test_ack_reply_shape() {
        let err = AppError::forbidden("Only the sender can edit this message");
        let value = serde_json::to_value(OutboundEvent::Ack(AckReply::failure(
            3,
            &err,
            Some("t".to_string()),
        )))
        .unwrap();
        assert_eq!(value["type"], "ack");
        assert_eq!(value["ack"], 3);
        assert_eq!(value["success"], false);
        assert_eq!(value["error"]["code"], "FORBIDDEN");
        assert_eq!(value["temp_id"], "t");
        assert!(value.get("data").is_none());
    }
}
