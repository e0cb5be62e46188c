//! Message dispatch handler.
//!
//! Validates and persists new messages, fans them out to the group room,
//! and governs who may edit, delete, or recall what.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use parley_core::config::{BrokerConfig, MessagingConfig};
use parley_core::error::AppError;
use parley_core::result::AppResult;
use parley_core::types::{GroupId, MessageId, UserId};
use parley_database::store::{MembershipStore, MessageStore};
use parley_entity::{GroupMembership, Message, MessageStatus, NewMessage};

use crate::bridge::publisher::{EventPublisher, group_topic};
use crate::connection::manager::ConnectionManager;
use crate::delivery::tracker::DeliveryTracker;
use crate::message::types::{MessageDraft, OutboundEvent};
use crate::message::validator::{validate_draft, validate_text};
use crate::metrics::RealtimeMetrics;

/// Governs the message lifecycle on behalf of connected users.
pub struct MessageDispatcher {
    membership: Arc<dyn MembershipStore>,
    messages: Arc<dyn MessageStore>,
    connections: Arc<ConnectionManager>,
    delivery: Arc<DeliveryTracker>,
    metrics: Arc<RealtimeMetrics>,
    publisher: Option<Arc<dyn EventPublisher>>,
    topic_prefix: String,
    config: MessagingConfig,
}

impl std::fmt::Debug for MessageDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageDispatcher")
            .field("publishing", &self.publisher.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl MessageDispatcher {
    /// Create a new dispatcher.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: MessagingConfig,
        broker: &BrokerConfig,
        membership: Arc<dyn MembershipStore>,
        messages: Arc<dyn MessageStore>,
        connections: Arc<ConnectionManager>,
        delivery: Arc<DeliveryTracker>,
        metrics: Arc<RealtimeMetrics>,
        publisher: Option<Arc<dyn EventPublisher>>,
    ) -> Self {
        Self {
            membership,
            messages,
            connections,
            delivery,
            metrics,
            publisher,
            topic_prefix: broker.topic_prefix.clone(),
            config,
        }
    }

    async fn active_membership(
        &self,
        group_id: GroupId,
        user_id: UserId,
    ) -> AppResult<Option<GroupMembership>> {
        Ok(self
            .membership
            .find_membership(group_id, user_id)
            .await?
            .filter(|m| m.is_active))
    }

    async fn load_message(&self, message_id: MessageId) -> AppResult<Message> {
        self.messages
            .find_by_id(message_id)
            .await?
            .ok_or_else(|| AppError::not_found("Message not found"))
    }

    /// Persist a new message and fan it out to the rest of the group.
    pub async fn send_message(&self, sender_id: UserId, draft: MessageDraft) -> AppResult<Message> {
        validate_draft(&draft, self.config.max_text_chars)?;

        let group = self
            .membership
            .find_group(draft.group_id)
            .await?
            .ok_or_else(|| AppError::not_found("Group not found"))?;
        if !group.is_active {
            return Err(AppError::forbidden("Group is no longer active"));
        }

        if self.active_membership(group.id, sender_id).await?.is_none() {
            return Err(AppError::forbidden("You are not a member of this group"));
        }

        if let Some(reply_to) = draft.reply_to_id {
            let target = self
                .messages
                .find_by_id(reply_to)
                .await?
                .filter(|m| m.group_id == group.id)
                .ok_or_else(|| AppError::not_found("Replied message not found"))?;
            if target.is_deleted {
                return Err(AppError::validation("Cannot reply to a deleted message"));
            }
        }

        let message = self
            .messages
            .create(NewMessage {
                group_id: group.id,
                sender_id,
                message_type: draft.message_type,
                content: draft.content,
                file: draft.file,
                reply_to_id: draft.reply_to_id,
            })
            .await?;
        self.metrics.message_persisted();

        let reached = self.connections.broadcast_to_group(
            &group.id,
            &OutboundEvent::NewMessage {
                message: message.clone(),
            },
            Some(sender_id),
        );

        let recipients: Vec<UserId> = self
            .membership
            .active_members(group.id)
            .await?
            .into_iter()
            .map(|m| m.user_id)
            .filter(|id| *id != sender_id)
            .collect();
        self.delivery.enqueue(message.id, recipients);

        self.publish(&message);

        info!(
            message_id = %message.id,
            group_id = %group.id,
            sender_id = %sender_id,
            reached,
            "Message sent"
        );
        Ok(message)
    }

    fn publish(&self, message: &Message) {
        let Some(publisher) = self.publisher.clone() else {
            return;
        };
        let payload = match serde_json::to_string(&OutboundEvent::NewMessage {
            message: message.clone(),
        }) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(message_id = %message.id, error = %e, "Failed to serialize broker payload");
                return;
            }
        };
        let topic = group_topic(&self.topic_prefix, &message.group_id);
        let message_id = message.id;
        tokio::spawn(async move {
            if let Err(e) = publisher.publish(&topic, &payload).await {
                warn!(message_id = %message_id, topic = %topic, error = %e, "Broker publish failed");
            }
        });
    }

    /// Replace the text of one's own message.
    pub async fn edit_message(
        &self,
        requester_id: UserId,
        message_id: MessageId,
        content: &str,
    ) -> AppResult<Message> {
        let message = self.load_message(message_id).await?;
        if message.sender_id != requester_id {
            return Err(AppError::forbidden("Only the sender can edit this message"));
        }
        if !message.is_editable() {
            return Err(AppError::invalid_state("This message can no longer be edited"));
        }
        let content = validate_text(Some(content), self.config.max_text_chars)?;

        let edited_at = Utc::now();
        let updated = self
            .messages
            .update_content(message_id, content, edited_at)
            .await?;

        self.connections.broadcast_to_group(
            &updated.group_id,
            &OutboundEvent::MessageEdited {
                message_id,
                group_id: updated.group_id,
                content: content.to_string(),
                edited_at,
            },
            None,
        );

        debug!(message_id = %message_id, "Message edited");
        Ok(updated)
    }

    /// Soft-delete a message. Allowed for the sender and group moderators.
    pub async fn delete_message(&self, requester_id: UserId, message_id: MessageId) -> AppResult<()> {
        let message = self.load_message(message_id).await?;
        if message.is_deleted {
            return Err(AppError::invalid_state("Message is already deleted"));
        }

        if message.sender_id != requester_id {
            let may_moderate = self
                .active_membership(message.group_id, requester_id)
                .await?
                .is_some_and(|m| m.role.can_moderate());
            if !may_moderate {
                return Err(AppError::forbidden(
                    "You do not have permission to delete this message",
                ));
            }
        }

        let deleted_at = Utc::now();
        self.messages.soft_delete(message_id, deleted_at).await?;
        self.delivery.cancel(&message_id);

        self.connections.broadcast_to_group(
            &message.group_id,
            &OutboundEvent::MessageDeleted {
                message_id,
                group_id: message.group_id,
                deleted_by: requester_id,
                deleted_at,
            },
            None,
        );

        info!(message_id = %message_id, deleted_by = %requester_id, "Message deleted");
        Ok(())
    }

    /// Hard-delete one's own unread message within the recall window.
    pub async fn recall_message(&self, requester_id: UserId, message_id: MessageId) -> AppResult<()> {
        self.recall_message_at(requester_id, message_id, Utc::now())
            .await
    }

    /// [`recall_message`](Self::recall_message) evaluated at `now`.
    pub async fn recall_message_at(
        &self,
        requester_id: UserId,
        message_id: MessageId,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let message = self.load_message(message_id).await?;
        if message.sender_id != requester_id {
            return Err(AppError::forbidden("Only the sender can recall this message"));
        }
        if message.is_deleted {
            return Err(AppError::invalid_state("Message is already deleted"));
        }
        if now - message.created_at > self.config.recall_window() {
            return Err(AppError::expired("The recall window has passed"));
        }
        if message.status == MessageStatus::Read || self.delivery.has_readers(&message_id).await {
            return Err(AppError::conflict(
                "Message has already been read and cannot be recalled",
            ));
        }

        self.messages.hard_delete(message_id).await?;
        self.delivery.cancel(&message_id);
        self.delivery.forget_receipts(&message_id).await;

        self.connections.broadcast_to_group(
            &message.group_id,
            &OutboundEvent::MessageRecalled {
                message_id,
                group_id: message.group_id,
                recalled_by: requester_id,
            },
            None,
        );

        info!(message_id = %message_id, "Message recalled");
        Ok(())
    }

    /// Keep only the IDs of messages in groups where `user_id` is an active member.
    pub async fn visible_message_ids(
        &self,
        user_id: UserId,
        message_ids: &[MessageId],
    ) -> AppResult<Vec<MessageId>> {
        if message_ids.is_empty() {
            return Ok(Vec::new());
        }

        let found = self.messages.find_by_ids(message_ids).await?;
        let mut allowed: HashMap<GroupId, bool> = HashMap::new();
        let mut visible = Vec::with_capacity(found.len());
        for message in found {
            let member = match allowed.get(&message.group_id) {
                Some(member) => *member,
                None => {
                    let member = self
                        .active_membership(message.group_id, user_id)
                        .await?
                        .is_some();
                    allowed.insert(message.group_id, member);
                    member
                }
            };
            if member {
                visible.push(message.id);
            }
        }
        Ok(visible)
    }
}
