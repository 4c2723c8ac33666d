use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::analytics::{self, LiveAgent};
use crate::engine::tracking;
use crate::error::AppError;
use crate::models::ping::{LocationPing, PushPing};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/locations", post(push_ping))
        .route("/locations/latest", post(latest_by_agents))
        .route("/live/agents", get(live_agents))
}

#[derive(Deserialize)]
pub struct LatestRequest {
    pub agent_ids: Vec<Uuid>,
}

async fn push_ping(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PushPing>,
) -> Result<(StatusCode, Json<LocationPing>), AppError> {
    let ping = tracking::push_ping(&state, payload)?;
    Ok((StatusCode::CREATED, Json(ping)))
}

async fn latest_by_agents(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LatestRequest>,
) -> Json<HashMap<Uuid, Option<LocationPing>>> {
    Json(tracking::latest_by_agents(&state, &payload.agent_ids))
}

async fn live_agents(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<LiveAgent>>, AppError> {
    let today = Utc::now()
        .with_timezone(&state.config.server_utc_offset)
        .date_naive();
    Ok(Json(analytics::live_agents(&state, today)?))
}
