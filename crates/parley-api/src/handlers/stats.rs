//! Operational stats of the real-time engine.

use axum::Json;
use axum::extract::State;

use parley_realtime::server::EngineStats;

use crate::state::AppState;

/// GET /api/realtime/stats
pub async fn realtime_stats(State(state): State<AppState>) -> Json<EngineStats> {
    Json(state.engine.stats().await)
}
