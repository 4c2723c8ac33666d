use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::notify::{self, RegisterToken};
use crate::error::AppError;
use crate::models::notification::{
    ActorRole, DeviceToken, NewNotification, Notification, NotificationStatus,
};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/notifications",
            post(create_notification).get(list_notifications),
        )
        .route("/notifications/unread", get(list_unread))
        .route("/notifications/:id/status", post(update_status))
        .route(
            "/device-tokens",
            post(register_token).delete(unregister_token),
        )
}

#[derive(Deserialize)]
pub struct RoleQuery {
    pub role: Option<ActorRole>,
}

#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: NotificationStatus,
}

#[derive(Deserialize)]
pub struct UnregisterRequest {
    pub token: String,
}

async fn create_notification(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewNotification>,
) -> Result<(StatusCode, Json<Notification>), AppError> {
    let notification = notify::create_notification(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(notification)))
}

async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RoleQuery>,
) -> Json<Vec<Notification>> {
    Json(notify::list_notifications(&state, query.role))
}

async fn list_unread(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RoleQuery>,
) -> Json<Vec<Notification>> {
    Json(notify::list_unread(&state, query.role))
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<StatusRequest>,
) -> Result<Json<Notification>, AppError> {
    Ok(Json(notify::update_status(&state, id, payload.status)?))
}

async fn register_token(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterToken>,
) -> Result<Json<DeviceToken>, AppError> {
    Ok(Json(notify::register_token(&state, payload)?))
}

async fn unregister_token(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UnregisterRequest>,
) -> Result<StatusCode, AppError> {
    if notify::unregister_token(&state, &payload.token) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound("device token not registered".to_string()))
    }
}
