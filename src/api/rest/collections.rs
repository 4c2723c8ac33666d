use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::analytics::{self, TripHistory};
use crate::engine::dispatch::{self, AssignOutcome, StopTracking, TrackingStarted, TrackingStopped};
use crate::engine::reminders;
use crate::error::AppError;
use crate::models::collection::{
    Collection, CollectionFilter, CollectionPatch, CollectionStatus, NewCollection, StatusExtra,
};
use crate::models::ping::{CollectionPingPayload, LocationPing};
use crate::models::reminder::Reminder;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/collections", post(create_collection).get(list_collections))
        .route("/collections/pending", get(pending_collections))
        .route("/collections/assign", post(assign_collection))
        .route(
            "/collections/:id",
            get(get_collection)
                .put(update_collection)
                .delete(delete_collection),
        )
        .route("/collections/:id/status", put(update_status))
        .route("/collections/:id/start", post(start_tracking))
        .route("/collections/:id/stop", post(stop_tracking))
        .route("/collections/:id/ping", post(save_ping))
        .route("/collections/:id/history", get(trip_history))
        .route("/collections/:id/reminders", get(list_reminders))
}

#[derive(Deserialize)]
pub struct PendingQuery {
    pub agent_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct AssignRequest {
    pub collection_id: Uuid,
    pub agent_id: Uuid,
}

#[derive(Deserialize)]
pub struct AgentRequest {
    pub agent_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct StopRequest {
    pub agent_id: Option<Uuid>,
    #[serde(flatten)]
    pub position: StopTracking,
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub agent_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
}

impl ListQuery {
    fn into_filter(self) -> Result<CollectionFilter, AppError> {
        Ok(CollectionFilter {
            status: self
                .status
                .as_deref()
                .map(str::parse::<CollectionStatus>)
                .transpose()?,
            agent_id: self.agent_id,
            customer_id: self.customer_id,
        })
    }
}

#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: String,
    #[serde(flatten)]
    pub extra: StatusExtra,
}

#[derive(Deserialize)]
pub struct PingRequest {
    pub agent_id: Option<Uuid>,
    #[serde(flatten)]
    pub payload: CollectionPingPayload,
}

fn require_agent(agent_id: Option<Uuid>) -> Result<Uuid, AppError> {
    agent_id.ok_or_else(|| AppError::Validation("agent_id required".to_string()))
}

async fn create_collection(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewCollection>,
) -> Result<(StatusCode, Json<Collection>), AppError> {
    let collection = dispatch::create_collection(&state, payload)?;
    Ok((StatusCode::CREATED, Json(collection)))
}

async fn list_collections(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Collection>>, AppError> {
    let filter = query.into_filter()?;
    Ok(Json(dispatch::list_collections(&state, &filter)))
}

async fn pending_collections(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PendingQuery>,
) -> Json<Vec<Collection>> {
    Json(dispatch::pending_collections(&state, query.agent_id))
}

async fn get_collection(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Collection>, AppError> {
    Ok(Json(dispatch::get_collection(&state, id)?))
}

async fn update_collection(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(patch): Json<CollectionPatch>,
) -> Result<Json<Collection>, AppError> {
    Ok(Json(dispatch::update_collection(&state, id, patch)?))
}

async fn delete_collection(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    dispatch::delete_collection(&state, id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn assign_collection(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AssignRequest>,
) -> Result<Json<AssignOutcome>, AppError> {
    Ok(Json(dispatch::assign(
        &state,
        payload.collection_id,
        payload.agent_id,
    )?))
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<StatusRequest>,
) -> Result<Json<Collection>, AppError> {
    let status: CollectionStatus = payload.status.parse()?;
    Ok(Json(dispatch::update_status(
        &state,
        id,
        status,
        payload.extra,
    )?))
}

async fn start_tracking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AgentRequest>,
) -> Result<Json<TrackingStarted>, AppError> {
    let agent_id = require_agent(payload.agent_id)?;
    Ok(Json(dispatch::start_tracking(&state, id, agent_id)?))
}

async fn stop_tracking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<StopRequest>,
) -> Result<Json<TrackingStopped>, AppError> {
    let agent_id = require_agent(payload.agent_id)?;
    Ok(Json(dispatch::stop_tracking(
        &state,
        id,
        agent_id,
        payload.position,
    )?))
}

async fn save_ping(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PingRequest>,
) -> Result<(StatusCode, Json<LocationPing>), AppError> {
    let agent_id = require_agent(payload.agent_id)?;
    let ping = dispatch::save_ping(&state, id, agent_id, payload.payload);
    Ok((StatusCode::CREATED, Json(ping)))
}

async fn trip_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<TripHistory>, AppError> {
    Ok(Json(analytics::trip_history(&state, id)?))
}

async fn list_reminders(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Reminder>>, AppError> {
    dispatch::get_collection(&state, id)?;
    Ok(Json(reminders::list_for_collection(&state, id)))
}
