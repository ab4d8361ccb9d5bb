//! Warming monitoring routes.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::warming::{WarmingRun, WarmingStats};

use super::AppState;

pub(super) async fn stats(State(state): State<AppState>) -> Json<WarmingStats> {
    Json(state.scheduler.stats())
}

pub(super) async fn last_run(State(state): State<AppState>) -> Json<Option<WarmingRun>> {
    Json(state.scheduler.last_run().await)
}

/// Warmed payload for one view.
///
/// A view that has not been warmed yet is not an error: the response is
/// `202 Accepted` with `cached: false`, and the client retries later.
pub(super) async fn warmed_data(
    State(state): State<AppState>,
    Path(view): Path<String>,
) -> Response {
    match state.scheduler.warmed(&view).await {
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("unknown view `{view}`") })),
        )
            .into_response(),
        Some(data) if data.cached => Json(data).into_response(),
        Some(data) => (StatusCode::ACCEPTED, Json(data)).into_response(),
    }
}

pub(super) async fn trigger(State(state): State<AppState>) -> Json<serde_json::Value> {
    let started = state.scheduler.clone().trigger();
    Json(json!({
        "started": started,
        "isRunning": state.scheduler.is_running(),
    }))
}
