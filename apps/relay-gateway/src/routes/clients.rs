//! Dispatch endpoints: signal a connected client, manage idle tokens.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::middleware::AdminAuth;
use crate::error::ApiError;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/clients", get(list_clients))
        .route("/clients/idle", get(list_idle))
        .route("/clients/{identity}", get(get_client).delete(kick_client))
        .route("/clients/{identity}/signal", post(signal_client))
        .route(
            "/clients/{identity}/waiting",
            post(add_waiting).delete(countdown_waiting),
        )
}

// ---------------------------------------------------------------------------
// GET /api/v1/clients
// ---------------------------------------------------------------------------

/// Registered identities, sorted.
async fn list_clients(_: AdminAuth, State(state): State<AppState>) -> Json<Vec<String>> {
    let mut identities = state.gateway.registry().identities();
    identities.sort_unstable();
    Json(identities)
}

// ---------------------------------------------------------------------------
// GET /api/v1/clients/idle
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct IdleClient {
    pub identity: String,
    pub weight: u32,
}

/// Waiting clients, most idle first.
async fn list_idle(_: AdminAuth, State(state): State<AppState>) -> Json<Vec<IdleClient>> {
    let clients = state
        .gateway
        .registry()
        .idle_ranking()
        .into_iter()
        .map(|(identity, weight)| IdleClient { identity, weight })
        .collect();
    Json(clients)
}

// ---------------------------------------------------------------------------
// GET / DELETE /api/v1/clients/:identity
// ---------------------------------------------------------------------------

async fn get_client(
    _: AdminAuth,
    State(state): State<AppState>,
    Path(identity): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let registry = state.gateway.registry();
    let data = registry.client_data(&identity)?;
    Ok(Json(serde_json::json!({
        "identity": identity,
        "data": data,
        "waiting_weight": registry.waiting_weight(&identity),
    })))
}

async fn kick_client(
    _: AdminAuth,
    State(state): State<AppState>,
    Path(identity): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.gateway.registry().kick(&identity)?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// POST /api/v1/clients/:identity/signal
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SignalRequest {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
}

async fn signal_client(
    _: AdminAuth,
    State(state): State<AppState>,
    Path(identity): Path<String>,
    Json(body): Json<SignalRequest>,
) -> Result<StatusCode, ApiError> {
    if body.event.trim().is_empty() {
        return Err(ApiError::bad_request("Event name is required"));
    }

    state.gateway.send(&identity, &body.event, body.payload)?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// POST / DELETE /api/v1/clients/:identity/waiting
// ---------------------------------------------------------------------------

async fn add_waiting(
    _: AdminAuth,
    State(state): State<AppState>,
    Path(identity): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let weight = state.gateway.registry().waiting_if_registered(&identity)?;
    Ok(Json(serde_json::json!({ "identity": identity, "weight": weight })))
}

async fn countdown_waiting(
    _: AdminAuth,
    State(state): State<AppState>,
    Path(identity): Path<String>,
) -> Json<Value> {
    let registry = state.gateway.registry();
    let removed = registry.countdown(&identity);
    Json(serde_json::json!({
        "identity": identity,
        "removed": removed,
        "weight": registry.waiting_weight(&identity),
    }))
}
