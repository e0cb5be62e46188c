//! Integration tests for delivery confirmation, queued delivery, and retry.

mod helpers;

use chrono::Utc;
use serde_json::json;

use parley_core::types::MessageId;
use parley_database::MessageStore;
use parley_entity::{GroupKind, MemberRole, MessageStatus};
use parley_realtime::message::OutboundEvent;

use helpers::TestChat;

fn sent_message_id(reply: &parley_realtime::message::AckReply) -> MessageId {
    serde_json::from_value(reply.data.as_ref().unwrap()["message"]["id"].clone()).unwrap()
}

#[tokio::test]
async fn test_offline_recipient_receives_queued_message_on_connect() {
    let chat = TestChat::new();
    let alice = chat.user("alice").await;
    let bob = chat.user("bob").await;
    let group = chat
        .group(GroupKind::Direct, &[(&alice, MemberRole::Member), (&bob, MemberRole::Member)])
        .await;

    let mut a = chat.connect(&alice).await;
    a.drain();

    a.send(json!({"type": "send_message", "ack": 1, "group_id": group, "content": "later"}))
        .await;
    let message_id = sent_message_id(&a.acks()[0]);
    assert_eq!(chat.engine.delivery.pending_count(), 1);

    let mut b = chat.connect(&bob).await;
    let events = b.drain();
    assert!(matches!(
        events.first(),
        Some(OutboundEvent::NewMessage { message }) if message.id == message_id
    ));
    assert!(events.iter().any(|e| matches!(e, OutboundEvent::Connected { .. })));

    assert!(a.drain().iter().any(|e| matches!(
        e,
        OutboundEvent::MessageDelivered { message_id: id, delivered_to, .. }
            if *id == message_id && *delivered_to == bob.id
    )));
    assert_eq!(chat.engine.delivery.pending_count(), 0);

    let stored = chat.store.find_by_id(message_id).await.unwrap().unwrap();
    assert_eq!(stored.status, MessageStatus::Delivered);
}

#[tokio::test]
async fn test_client_confirmation_clears_pending_entry() {
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
                (&carol, MemberRole::Member),
            ],
        )
        .await;

    let mut a = chat.connect(&alice).await;
    let mut b = chat.connect(&bob).await;
    let mut c = chat.connect(&carol).await;
    a.drain();

    a.send(json!({"type": "send_message", "ack": 1, "group_id": group, "content": "roll call"}))
        .await;
    let message_id = sent_message_id(&a.acks()[0]);
    b.drain();
    c.drain();

    b.send(json!({"type": "message_delivered", "ack": 2, "message_ids": [message_id]}))
        .await;
    let replies = b.acks();
    assert_eq!(replies[0].data.as_ref().unwrap()["confirmed"], 1);

    let entry = chat.engine.delivery.entry(&message_id).unwrap();
    assert_eq!(entry.recipients.len(), 1);
    assert!(entry.recipients.contains(&carol.id));

    c.send(json!({"type": "message_delivered", "message_ids": [message_id]}))
        .await;
    assert!(chat.engine.delivery.entry(&message_id).is_none());

    let notices = a
        .drain()
        .into_iter()
        .filter(|e| matches!(e, OutboundEvent::MessageDelivered { .. }))
        .count();
    assert_eq!(notices, 2);
}

#[tokio::test]
async fn test_outsider_confirmation_is_ignored() {
    let chat = TestChat::new();
    let alice = chat.user("alice").await;
    let bob = chat.user("bob").await;
    let mallory = chat.user("mallory").await;
    let group = chat
        .group(GroupKind::Direct, &[(&alice, MemberRole::Member), (&bob, MemberRole::Member)])
        .await;

    let mut a = chat.connect(&alice).await;
    let mut m = chat.connect(&mallory).await;
    a.send(json!({"type": "send_message", "ack": 1, "group_id": group, "content": "private"}))
        .await;
    let message_id = sent_message_id(&a.acks()[0]);
    m.drain();

    m.send(json!({"type": "message_read", "ack": 2, "message_ids": [message_id]}))
        .await;
    assert_eq!(m.acks()[0].data.as_ref().unwrap()["confirmed"], 0);
    assert_eq!(chat.engine.delivery.pending_count(), 1);

    let stored = chat.store.find_by_id(message_id).await.unwrap().unwrap();
    assert_eq!(stored.status, MessageStatus::Sent);
}

#[tokio::test]
async fn test_unconfirmed_message_is_repushed_then_abandoned() {
    let chat = TestChat::new();
    let alice = chat.user("alice").await;
    let bob = chat.user("bob").await;
    let group = chat
        .group(GroupKind::Direct, &[(&alice, MemberRole::Member), (&bob, MemberRole::Member)])
        .await;

    let mut a = chat.connect(&alice).await;
    let mut b = chat.connect(&bob).await;
    a.send(json!({"type": "send_message", "ack": 1, "group_id": group, "content": "ping"}))
        .await;
    let message_id = sent_message_id(&a.acks()[0]);
    b.drain();

    let retry_after = chat.config.delivery.retry_after() + chrono::Duration::seconds(1);
    let mut now = Utc::now();

    now += retry_after;
    let report = chat.engine.delivery.sweep_at(now).await;
    assert_eq!(report.retried, 1);
    assert_eq!(report.repushed, 1);
    assert!(matches!(
        b.drain().as_slice(),
        [OutboundEvent::NewMessage { message }] if message.id == message_id
    ));

    let mut failed = 0;
    for _ in 0..chat.config.delivery.max_attempts {
        now += retry_after;
        failed += chat.engine.delivery.sweep_at(now).await.failed;
    }
    assert_eq!(failed, 1);
    assert_eq!(chat.engine.delivery.pending_count(), 0);
    assert_eq!(chat.engine.metrics.snapshot().deliveries_failed, 1);
}
