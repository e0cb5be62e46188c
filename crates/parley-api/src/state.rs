//! Application state shared across all handlers.

use std::sync::Arc;

use parley_core::config::AppConfig;
use parley_realtime::RealtimeEngine;

/// Application state passed to every Axum handler via `State<AppState>`.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<AppConfig>,
    /// Real-time chat engine
    pub engine: Arc<RealtimeEngine>,
}

impl AppState {
    /// Bundle configuration and engine.
    pub fn new(config: AppConfig, engine: Arc<RealtimeEngine>) -> Self {
        Self {
            config: Arc::new(config),
            engine,
        }
    }
}
