use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::Json;
use axum::Router;

use crate::engine::analytics::{self, DispatchSummary};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/dashboard/summary", get(summary))
}

async fn summary(State(state): State<Arc<AppState>>) -> Json<DispatchSummary> {
    Json(analytics::summary(&state))
}
