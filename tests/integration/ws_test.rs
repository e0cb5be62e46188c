//! Integration tests for the WebSocket handshake and the HTTP surface.

mod helpers;

use http::StatusCode;

use parley_entity::{GroupKind, MemberRole};

#[tokio::test]
async fn test_ws_upgrade_without_token() {
    let chat = helpers::TestChat::new();

    let response = chat.request("/ws", None).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["error"], "AUTHENTICATION");
}

#[tokio::test]
async fn test_ws_upgrade_with_bad_token() {
    let chat = helpers::TestChat::new();

    let response = chat.request("/ws?token=not-a-jwt", None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    let response = chat.request("/ws", Some("not-a-jwt")).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_ws_upgrade_rejects_unverified_user() {
    let chat = helpers::TestChat::new();
    let mut user = chat.user("pending").await;
    user.is_verified = false;
    chat.store.insert_user(user.clone()).await;

    let token = chat.token(user.id);
    let response = chat.request(&format!("/ws?token={token}"), None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_ws_valid_token_passes_authentication() {
    let chat = helpers::TestChat::new();
    let user = chat.user("alice").await;
    let token = chat.token(user.id);

    // Not a real upgrade request, so the upgrade itself is refused, but
    // only after the credential was accepted.
    let response = chat.request("/ws", Some(&token)).await;
    assert_ne!(response.status, StatusCode::UNAUTHORIZED);
    assert!(response.status.is_client_error());
}

#[tokio::test]
async fn test_health_check() {
    let chat = helpers::TestChat::new();

    let response = chat.request("/api/health", None).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
    assert_eq!(response.body["connections"], 0);
}

#[tokio::test]
async fn test_realtime_stats_reflect_connections() {
    let chat = helpers::TestChat::new();
    let alice = chat.user("alice").await;
    let bob = chat.user("bob").await;
    chat.group(GroupKind::Direct, &[(&alice, MemberRole::Member), (&bob, MemberRole::Member)])
        .await;

    let _a = chat.connect(&alice).await;
    let _a2 = chat.connect(&alice).await;

    let response = chat.request("/api/realtime/stats", None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["connections"], 2);
    assert_eq!(response.body["online_users"], 1);
    assert_eq!(response.body["rooms"], 1);
    assert_eq!(response.body["delivery"]["pending"], 0);
    assert_eq!(response.body["metrics"]["connections_opened"], 2);
}

#[tokio::test]
async fn test_disconnect_updates_stats() {
    let chat = helpers::TestChat::new();
    let alice = chat.user("alice").await;

    let a = chat.connect(&alice).await;
    a.disconnect().await;

    let response = chat.request("/api/realtime/stats", None).await;
    assert_eq!(response.body["connections"], 0);
    assert_eq!(response.body["online_users"], 0);
    assert_eq!(response.body["metrics"]["connections_closed"], 1);
}
