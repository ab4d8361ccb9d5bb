//! Cache management routes.
//!
//! All operations are idempotent and report success or failure in the
//! body; a caching problem never surfaces as a request failure.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::cache::{CacheStatus, Category};

use super::AppState;

pub(super) async fn status(State(state): State<AppState>) -> Json<CacheStatus> {
    Json(state.facade.status())
}

pub(super) async fn clear_all(State(state): State<AppState>) -> Json<serde_json::Value> {
    let success = state.facade.clear().await;
    Json(json!({
        "success": success,
        "message": "all cache cleared",
    }))
}

pub(super) async fn clear_category(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> Response {
    let Some(category) = Category::parse(&category) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": format!("unknown category `{category}`") })),
        )
            .into_response();
    };

    let deleted = state.facade.invalidate_category(category).await;
    Json(json!({
        "success": true,
        "category": category.as_str(),
        "deleted": deleted,
    }))
    .into_response()
}

pub(super) async fn clear_key(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Json<serde_json::Value> {
    let deleted = state.facade.delete(&key).await;
    Json(json!({
        "success": deleted,
        "key": key,
        "message": if deleted { "cache key cleared" } else { "cache key not found" },
    }))
}

pub(super) async fn get_key(State(state): State<AppState>, Path(key): Path<String>) -> Response {
    match state.facade.get(&key).await {
        Some(value) => Json(json!({ "success": true, "key": key, "value": value })).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "key": key, "message": "cache key not found" })),
        )
            .into_response(),
    }
}
