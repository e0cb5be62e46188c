//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use chrono::Utc;
use http::{Request, StatusCode};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tower::ServiceExt;

use parley_core::config::AppConfig;
use parley_core::types::{GroupId, UserId};
use parley_database::{MemoryStore, Stores};
use parley_entity::{Group, GroupKind, GroupMembership, MemberRole, UserIdentity};
use parley_realtime::RealtimeEngine;
use parley_realtime::connection::ConnectionHandle;
use parley_realtime::message::OutboundEvent;

/// Secret shared by the test engine and the token minting helper.
pub const SECRET: &str = "integration-test-secret";

/// Test chat context: an engine over an in-memory store.
pub struct TestChat {
    /// Backing store, for seeding and direct inspection
    pub store: Arc<MemoryStore>,
    /// The engine under test
    pub engine: Arc<RealtimeEngine>,
    /// Configuration the engine was built with
    pub config: AppConfig,
}

/// A connected test client.
pub struct Client {
    /// Connection handle
    pub handle: Arc<ConnectionHandle>,
    /// Outbound events for this connection
    pub rx: mpsc::Receiver<OutboundEvent>,
    engine: Arc<RealtimeEngine>,
}

/// Simplified HTTP response for assertions.
pub struct TestResponse {
    /// Status code
    pub status: StatusCode,
    /// JSON body (`Null` when empty or not JSON)
    pub body: Value,
}

impl TestChat {
    /// Create a test engine with default settings.
    pub fn new() -> Self {
        Self::with_config(AppConfig::default())
    }

    /// Create a test engine with custom settings; the JWT secret is forced.
    pub fn with_config(mut config: AppConfig) -> Self {
        config.auth.jwt_secret = SECRET.to_string();
        let store = Arc::new(MemoryStore::new());
        let engine = Arc::new(RealtimeEngine::new(
            &config,
            Stores::from_memory(store.clone()),
            None,
        ));
        Self {
            store,
            engine,
            config,
        }
    }

    /// Seed a verified user.
    pub async fn user(&self, name: &str) -> UserIdentity {
        let user = UserIdentity {
            id: UserId::new(),
            name: name.to_string(),
            email: format!("{name}@example.com"),
            is_verified: true,
        };
        self.store.insert_user(user.clone()).await;
        user
    }

    /// Seed an active group with the given members.
    pub async fn group(&self, kind: GroupKind, members: &[(&UserIdentity, MemberRole)]) -> GroupId {
        let group_id = GroupId::new();
        self.store
            .insert_group(Group {
                id: group_id,
                name: "test group".to_string(),
                kind,
                is_active: true,
                created_at: Utc::now(),
            })
            .await;
        for (user, role) in members {
            self.store
                .upsert_membership(GroupMembership {
                    group_id,
                    user_id: user.id,
                    role: *role,
                    is_active: true,
                    joined_at: Utc::now(),
                })
                .await;
        }
        group_id
    }

    /// Mint an access token for a user.
    pub fn token(&self, user_id: UserId) -> String {
        let now = Utc::now().timestamp();
        encode(
            &Header::default(),
            &json!({ "sub": user_id, "iat": now, "exp": now + 3600 }),
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .expect("Failed to mint token")
    }

    /// Authenticate with a minted token and connect, like the WebSocket path does.
    pub async fn connect(&self, user: &UserIdentity) -> Client {
        let token = self.token(user.id);
        let identity = self
            .engine
            .authenticator
            .authenticate(Some(&token))
            .await
            .expect("Handshake failed");
        let (handle, rx) = self
            .engine
            .gateway
            .connect(identity)
            .await
            .expect("Connect failed");
        Client {
            handle,
            rx,
            engine: self.engine.clone(),
        }
    }

    /// The HTTP router over this engine.
    pub fn router(&self) -> Router {
        parley_api::build_router(parley_api::AppState::new(
            self.config.clone(),
            self.engine.clone(),
        ))
    }

    /// Make an HTTP request against the router.
    pub async fn request(&self, uri: &str, bearer: Option<&str>) -> TestResponse {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(token) = bearer {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::empty()).expect("Failed to build request");

        let response = self
            .router()
            .oneshot(request)
            .await
            .expect("Request failed");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("Failed to read body");
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        TestResponse { status, body }
    }
}

impl Client {
    /// Send one inbound frame through the gateway.
    pub async fn send(&self, frame: Value) {
        self.engine
            .gateway
            .handle_inbound(&self.handle.id, &frame.to_string())
            .await;
    }

    /// Take every event queued so far.
    pub fn drain(&mut self) -> Vec<OutboundEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Take queued events and return the `ack` replies among them.
    pub fn acks(&mut self) -> Vec<parley_realtime::message::AckReply> {
        self.drain()
            .into_iter()
            .filter_map(|e| match e {
                OutboundEvent::Ack(reply) => Some(reply),
                _ => None,
            })
            .collect()
    }

    /// Disconnect through the gateway.
    pub async fn disconnect(self) {
        self.engine
            .gateway
            .on_disconnect(&self.handle.id, "client closed")
            .await;
    }
}
