use crate::error::{AppError, Result};
use crate::types::MarketSnapshot;
use crate::AppState;
use axum::{extract::State, routing::get, Json, Router};

/// Current prices, last-tick changes and round status.
async fn snapshot(State(state): State<AppState>) -> Result<Json<MarketSnapshot>> {
    let snapshot = state
        .engine
        .snapshot()
        .await
        .ok_or_else(|| AppError::Internal("Engine unavailable".to_string()))?;

    Ok(Json(snapshot))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(snapshot))
}
