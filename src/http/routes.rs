//! HTTP route definitions

use axum::{
    extract::State,
    http::{header, Method},
    response::Json,
    routing::get,
    Router,
};
use serde::Serialize;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::app::AppState;
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // CLIENT_ORIGIN may list several origins, comma-separated
    let allowed_origins: Vec<header::HeaderValue> = state
        .config
        .client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::SEC_WEBSOCKET_PROTOCOL,
        ])
        .allow_credentials(true);

    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_rooms: usize,
    active_tournaments: usize,
    live_matches: usize,
    connected_players: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.registry.stats();
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        active_rooms: stats.rooms,
        active_tournaments: stats.tournaments,
        live_matches: stats.live_matches,
        connected_players: stats.connected_players,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rooms::testing::session;
    use crate::game::MatchKind;

    #[tokio::test(start_paused = true)]
    async fn health_reports_registry_counters() {
        let state = AppState::for_tests();
        let (a, _ra) = session("1", "alice");
        state.registry.attach_session(&a);
        state.registry.create_room(&a, MatchKind::Remote).unwrap();

        let Json(health) = health_handler(State(state)).await;
        assert_eq!(health.status, "ok");
        assert_eq!(health.active_rooms, 1);
        assert_eq!(health.active_tournaments, 0);
        assert_eq!(health.live_matches, 0);
        assert_eq!(health.connected_players, 1);
    }
}
