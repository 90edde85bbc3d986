use crate::AppState;
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    sessions: usize,
    round_active: bool,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let round_active = state
        .engine
        .snapshot()
        .await
        .map(|s| s.active)
        .unwrap_or(false);

    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        sessions: state.registry.client_count(),
        round_active,
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/health", get(health))
}
