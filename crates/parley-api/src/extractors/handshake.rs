//! `HandshakeUser` extractor, authenticates a WebSocket upgrade request.
//!
//! The credential comes from `?token=` or an `Authorization: Bearer` header.
//! Runs before the upgrade so rejected clients never reach the gateway.

use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use serde::Deserialize;

use parley_entity::UserIdentity;

use crate::error::ApiError;
use crate::state::AppState;

/// Query parameters accepted on `/ws`.
#[derive(Debug, Default, Deserialize)]
pub struct HandshakeQuery {
    /// JWT access token.
    #[serde(default)]
    pub token: Option<String>,
}

/// The verified user behind an upgrade request.
#[derive(Debug, Clone)]
pub struct HandshakeUser(pub UserIdentity);

fn bearer(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
}

impl FromRequestParts<AppState> for HandshakeUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let query = Query::<HandshakeQuery>::try_from_uri(&parts.uri)
            .map(|Query(q)| q)
            .unwrap_or_default();
        let token = query.token.or_else(|| bearer(parts));

        let identity = state
            .engine
            .authenticator
            .authenticate(token.as_deref())
            .await?;
        Ok(Self(identity))
    }
}
