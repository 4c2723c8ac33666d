use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::Json;
use axum::Router;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::agents::{self, AgentStatusUpdate};
use crate::engine::{analytics, tracking};
use crate::error::AppError;
use crate::models::agent::{Agent, NewAgent};
use crate::models::assignment::Assignment;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/agents", post(create_agent).get(list_agents))
        .route("/agents/:id", get(get_agent))
        .route("/agents/:id/status", put(update_agent_status))
        .route("/agents/:id/last-seen", put(update_last_seen))
        .route("/agents/:id/history", get(agent_history))
        .route("/agents/:id/stops", get(stops_count))
}

#[derive(Deserialize)]
pub struct LastSeenRequest {
    pub last_seen_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
pub struct StopsQuery {
    pub date: Option<NaiveDate>,
}

#[derive(Serialize)]
pub struct StopsResponse {
    pub agent_id: Uuid,
    pub date: NaiveDate,
    pub stops: usize,
}

async fn create_agent(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewAgent>,
) -> Result<(StatusCode, Json<Agent>), AppError> {
    let agent = agents::create_agent(&state, payload)?;
    Ok((StatusCode::CREATED, Json(agent)))
}

async fn list_agents(State(state): State<Arc<AppState>>) -> Json<Vec<Agent>> {
    Json(agents::list_agents(&state))
}

async fn get_agent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Agent>, AppError> {
    Ok(Json(agents::get_agent(&state, id)?))
}

async fn update_agent_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AgentStatusUpdate>,
) -> Result<Json<Agent>, AppError> {
    Ok(Json(agents::update_status(&state, id, payload)?))
}

async fn update_last_seen(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<LastSeenRequest>,
) -> Result<Json<Agent>, AppError> {
    Ok(Json(agents::touch_last_seen(&state, id, payload.last_seen_at)?))
}

async fn agent_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Assignment>>, AppError> {
    Ok(Json(analytics::agent_history(&state, id)?))
}

/// Defaults to today in the server's configured offset.
async fn stops_count(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<StopsQuery>,
) -> Result<Json<StopsResponse>, AppError> {
    let date = query.date.unwrap_or_else(|| {
        Utc::now()
            .with_timezone(&state.config.server_utc_offset)
            .date_naive()
    });

    Ok(Json(StopsResponse {
        agent_id: id,
        date,
        stops: tracking::stops_count(&state, id, date)?,
    }))
}
