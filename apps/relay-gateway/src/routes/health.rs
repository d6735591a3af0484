use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let stats = state.gateway.registry().stats();
    Json(serde_json::json!({
        "status": "ok",
        "clients": stats.clients,
        "waiting": stats.waiting,
        "pending_handshakes": state.gateway.pending_handshakes(),
    }))
}
