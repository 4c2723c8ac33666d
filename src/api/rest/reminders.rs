use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::Json;
use axum::Router;
use chrono::Utc;
use uuid::Uuid;

use crate::engine::reminders::{self, ReminderRunReport};
use crate::error::AppError;
use crate::models::reminder::{NewReminder, Reminder};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/reminders", post(create_reminder))
        .route("/reminders/run", post(run_due_reminders))
        .route("/reminders/:id/cancel", post(cancel_reminder))
}

async fn create_reminder(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewReminder>,
) -> Result<(StatusCode, Json<Reminder>), AppError> {
    let reminder = reminders::create_reminder(&state, payload)?;
    Ok((StatusCode::CREATED, Json(reminder)))
}

async fn cancel_reminder(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Reminder>, AppError> {
    Ok(Json(reminders::cancel_reminder(&state, id)?))
}

/// Manual trigger for the scheduler's scan.
async fn run_due_reminders(State(state): State<Arc<AppState>>) -> Json<ReminderRunReport> {
    Json(reminders::process_due_reminders(&state, Utc::now()).await)
}
