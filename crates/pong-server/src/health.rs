use std::sync::atomic::Ordering;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::state::AppState;

/// Structured health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub connections: ConnectionInfo,
    pub games: GameInfo,
}

#[derive(Serialize)]
pub struct ConnectionInfo {
    pub websocket: usize,
}

#[derive(Serialize)]
pub struct GameInfo {
    pub live_matches: usize,
    pub queued_players: usize,
    pub pending_timers: usize,
}

/// Structured health check endpoint. Returns server status, connection counts
/// and live game counts as JSON.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let ws = state.ws_connection_count.load(Ordering::Relaxed);
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        connections: ConnectionInfo { websocket: ws },
        games: GameInfo {
            live_matches: state.sessions.live_count().await,
            queued_players: state.matchmaker.queue_len(),
            pending_timers: state.clock.pending(),
        },
    })
}

/// Readiness check.
pub async fn readiness_check(State(state): State<AppState>) -> &'static str {
    if state.config.check().is_err() {
        return "not ready: invalid configuration";
    }
    "ready"
}
