//! Integration tests for sending, editing, deleting, and recalling messages.

mod helpers;

use chrono::Utc;
use serde_json::json;

use parley_core::types::MessageId;
use parley_entity::{GroupKind, MemberRole, Message, MessageStatus, MessageType};
use parley_realtime::message::OutboundEvent;

use helpers::TestChat;

fn sent_message_id(reply: &parley_realtime::message::AckReply) -> MessageId {
    serde_json::from_value(reply.data.as_ref().unwrap()["message"]["id"].clone()).unwrap()
}

#[tokio::test]
async fn test_send_then_read_by_recipient() {
    let chat = TestChat::new();
    let alice = chat.user("alice").await;
    let bob = chat.user("bob").await;
    let group = chat
        .group(GroupKind::Group, &[(&alice, MemberRole::Member), (&bob, MemberRole::Member)])
        .await;

    let mut a = chat.connect(&alice).await;
    let mut b = chat.connect(&bob).await;
    a.drain();
    b.drain();

    a.send(json!({"type": "send_message", "ack": 1, "group_id": group, "content": "hi"}))
        .await;
    let replies = a.acks();
    assert_eq!(replies.len(), 1);
    assert!(replies[0].success);
    let message_id = sent_message_id(&replies[0]);

    let received = b.drain();
    match received.as_slice() {
        [OutboundEvent::NewMessage { message }] => {
            assert_eq!(message.id, message_id);
            assert_eq!(message.content.as_deref(), Some("hi"));
            assert_eq!(message.sender_id, alice.id);
            assert_eq!(message.status, MessageStatus::Sent);
        }
        other => panic!("unexpected events: {other:?}"),
    }

    b.send(json!({"type": "message_read", "message_ids": [message_id], "group_id": group}))
        .await;

    let events = a.drain();
    assert!(events.iter().any(|e| matches!(
        e,
        OutboundEvent::MessageReadByRecipient { message_id: id, read_by, .. }
            if *id == message_id && *read_by == bob.id
    )));
    assert!(events.iter().any(|e| matches!(e, OutboundEvent::MessageRead { .. })));

    let stored = chat.store_message(message_id).await;
    assert_eq!(stored.status, MessageStatus::Read);
}

#[tokio::test]
async fn test_member_cannot_delete_others_message_but_admin_can() {
    let chat = TestChat::new();
    let alice = chat.user("alice").await;
    let bob = chat.user("bob").await;
    let carol = chat.user("carol").await;
    let group = chat
        .group(
            GroupKind::Group,
            &[
                (&alice, MemberRole::Member),
                (&bob, MemberRole::Member),
                (&carol, MemberRole::Admin),
            ],
        )
        .await;

    let mut a = chat.connect(&alice).await;
    let mut b = chat.connect(&bob).await;
    let mut c = chat.connect(&carol).await;

    a.send(json!({"type": "send_message", "ack": 1, "group_id": group, "content": "keep?"}))
        .await;
    let message_id = sent_message_id(&a.acks()[0]);
    b.drain();
    c.drain();

    b.send(json!({"type": "delete_message", "ack": 2, "message_id": message_id}))
        .await;
    let replies = b.acks();
    assert!(!replies[0].success);
    assert_eq!(replies[0].error.as_ref().unwrap().code, "FORBIDDEN");

    c.send(json!({"type": "delete_message", "ack": 3, "message_id": message_id}))
        .await;
    assert!(c.drain().iter().any(|e| matches!(e, OutboundEvent::Ack(r) if r.success)));

    assert!(b.drain().iter().any(|e| matches!(
        e,
        OutboundEvent::MessageDeleted { deleted_by, .. } if *deleted_by == carol.id
    )));
    let stored = chat.store_message(message_id).await;
    assert!(stored.is_deleted);
    assert!(stored.content.is_none());
}

#[tokio::test]
async fn test_recall_of_read_message_conflicts() {
    let chat = TestChat::new();
    let alice = chat.user("alice").await;
    let bob = chat.user("bob").await;
    let group = chat
        .group(GroupKind::Direct, &[(&alice, MemberRole::Member), (&bob, MemberRole::Member)])
        .await;

    let mut a = chat.connect(&alice).await;
    let b = chat.connect(&bob).await;

    a.send(json!({"type": "send_message", "ack": 1, "group_id": group, "content": "secret"}))
        .await;
    let message_id = sent_message_id(&a.acks()[0]);
    b.send(json!({"type": "message_read", "message_ids": [message_id]}))
        .await;
    a.drain();

    a.send(json!({"type": "recall_message", "ack": 2, "message_id": message_id}))
        .await;
    let replies = a.acks();
    assert_eq!(replies[0].error.as_ref().unwrap().code, "CONFLICT");

    let stored = chat.store_message(message_id).await;
    assert_eq!(stored.content.as_deref(), Some("secret"));
}

#[tokio::test]
async fn test_recall_outside_window_expires_and_inside_window_removes() {
    let chat = TestChat::new();
    let alice = chat.user("alice").await;
    let bob = chat.user("bob").await;
    let group = chat
        .group(GroupKind::Group, &[(&alice, MemberRole::Member), (&bob, MemberRole::Member)])
        .await;

    let old = Message {
        id: MessageId::new(),
        group_id: group,
        sender_id: alice.id,
        message_type: MessageType::Text,
        content: Some("old news".to_string()),
        file: None,
        reply_to_id: None,
        status: MessageStatus::Sent,
        is_deleted: false,
        created_at: Utc::now() - chrono::Duration::minutes(10),
        edited_at: None,
        deleted_at: None,
    };
    chat.store.insert_message(old.clone()).await;

    let mut a = chat.connect(&alice).await;
    let mut b = chat.connect(&bob).await;
    a.drain();
    b.drain();

    a.send(json!({"type": "recall_message", "ack": 1, "message_id": old.id}))
        .await;
    assert_eq!(a.acks()[0].error.as_ref().unwrap().code, "EXPIRED");

    a.send(json!({"type": "send_message", "ack": 2, "group_id": group, "content": "typo"}))
        .await;
    let fresh = sent_message_id(&a.acks()[0]);
    b.drain();

    a.send(json!({"type": "recall_message", "ack": 3, "message_id": fresh}))
        .await;
    assert!(a.acks()[0].success);
    assert!(b.drain().iter().any(|e| matches!(
        e,
        OutboundEvent::MessageRecalled { message_id, .. } if *message_id == fresh
    )));
    assert_eq!(chat.engine.delivery.pending_count(), 0);
}

#[tokio::test]
async fn test_invalid_content_is_rejected_without_persisting() {
    let chat = TestChat::new();
    let alice = chat.user("alice").await;
    let bob = chat.user("bob").await;
    let group = chat
        .group(GroupKind::Group, &[(&alice, MemberRole::Member), (&bob, MemberRole::Member)])
        .await;
    let mut a = chat.connect(&alice).await;
    a.drain();

    for (temp_id, content) in [("t-empty", String::new()), ("t-long", "x".repeat(4001))] {
        a.send(json!({
            "type": "send_message",
            "group_id": group,
            "content": content,
            "temp_id": temp_id
        }))
        .await;
        match a.drain().as_slice() {
            [OutboundEvent::MessageError { temp_id: echoed, code, .. }] => {
                assert_eq!(echoed.as_deref(), Some(temp_id));
                assert_eq!(code, "VALIDATION");
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    assert_eq!(chat.store.message_count().await, 0);
}

#[tokio::test]
async fn test_edit_is_broadcast_and_limited_to_sender() {
    let chat = TestChat::new();
    let alice = chat.user("alice").await;
    let bob = chat.user("bob").await;
    let group = chat
        .group(GroupKind::Group, &[(&alice, MemberRole::Member), (&bob, MemberRole::Admin)])
        .await;
    let mut a = chat.connect(&alice).await;
    let mut b = chat.connect(&bob).await;

    a.send(json!({"type": "send_message", "ack": 1, "group_id": group, "content": "helo"}))
        .await;
    let message_id = sent_message_id(&a.acks()[0]);
    b.drain();

    b.send(json!({"type": "edit_message", "ack": 2, "message_id": message_id, "content": "x"}))
        .await;
    assert_eq!(b.acks()[0].error.as_ref().unwrap().code, "FORBIDDEN");

    a.send(json!({"type": "edit_message", "ack": 3, "message_id": message_id, "content": "hello"}))
        .await;
    assert!(a.drain().iter().any(|e| matches!(e, OutboundEvent::Ack(r) if r.success)));
    assert!(b.drain().iter().any(|e| matches!(
        e,
        OutboundEvent::MessageEdited { content, .. } if content == "hello"
    )));
}

impl TestChat {
    async fn store_message(&self, id: MessageId) -> Message {
        use parley_database::MessageStore;
        self.store
            .find_by_id(id)
            .await
            .expect("Store lookup failed")
            .expect("Message missing")
    }
}
