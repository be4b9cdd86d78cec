pub mod api;
pub mod archive;
pub mod broadcast;
pub mod clock;
pub mod config;
pub mod error;
pub mod game_loop;
pub mod health;
pub mod matchmaking;
pub mod session_manager;
pub mod state;
pub mod store;
pub mod tournament;
pub mod ws;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;

use config::ServerConfig;
use state::AppState;

/// Build the Axum router and application state from a config.
///
/// Must be called inside a tokio runtime.
pub fn build_app(config: ServerConfig) -> (Router<()>, AppState) {
    let state = AppState::new(config);

    let api_routes = Router::new()
        .route("/queue", post(api::join_queue).delete(api::leave_queue))
        .route("/sessions/local", post(api::create_local_session))
        .route("/sessions/{session_id}", get(api::get_session))
        .route("/tournaments", post(api::create_tournament))
        .route("/tournaments/{tournament_id}", get(api::get_tournament))
        .route(
            "/tournaments/{tournament_id}/join",
            post(api::join_tournament),
        )
        .route(
            "/tournaments/{tournament_id}/leave",
            post(api::leave_tournament),
        )
        .route("/matches/{match_id}/ready", post(api::set_ready));

    let app = Router::new()
        .route("/ws/game/{session_id}", get(ws::game_socket))
        .route("/ws/notify", get(ws::notify_socket))
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .nest("/api/v1", api_routes)
        .layer(CorsLayer::permissive())
        .with_state(state.clone());

    (app, state)
}
