//! # parley-api
//!
//! HTTP layer for Parley built on Axum.
//!
//! Exposes the WebSocket upgrade that feeds the real-time gateway, plus
//! health and operational stats endpoints.

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use error::ApiError;
pub use router::build_router;
pub use state::AppState;
