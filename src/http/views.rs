//! Dashboard data routes.
//!
//! Each handler adapts one producer to HTTP; caching happens in the
//! response cache middleware wrapped around the route.

use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;
use serde_json::Value;

use crate::error::AppError;
use crate::source::producers;

use super::AppState;

pub(super) async fn dashboard_batch(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let payload = producers::dashboard_batch(state.search.as_ref(), &state.tracker).await?;
    Ok(Json(payload))
}

pub(super) async fn test_cases(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let payload = producers::test_case_counts(state.search.as_ref(), &state.tracker).await?;
    Ok(Json(payload))
}

pub(super) async fn monthly_test_cases(
    State(state): State<AppState>,
) -> Result<Json<Value>, AppError> {
    let payload = producers::monthly_test_cases(state.search.as_ref(), &state.tracker).await?;
    Ok(Json(payload))
}

pub(super) async fn all_test_cases(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let payload = producers::all_test_cases(state.search.as_ref(), &state.tracker).await?;
    Ok(Json(payload))
}

pub(super) async fn cumulative_monthly(
    State(state): State<AppState>,
) -> Result<Json<Value>, AppError> {
    let payload = producers::cumulative_monthly(state.search.as_ref(), &state.tracker).await?;
    Ok(Json(payload))
}

#[derive(Debug, Deserialize)]
pub(super) struct BugStatsQuery {
    month: Option<u8>,
}

pub(super) async fn bug_stats(
    State(state): State<AppState>,
    Query(query): Query<BugStatsQuery>,
) -> Result<Json<Value>, AppError> {
    if let Some(month) = query.month {
        if !(1..=12).contains(&month) {
            return Err(AppError::bad_request("month must be between 1 and 12"));
        }
    }
    let payload = producers::bug_stats(state.search.as_ref(), &state.tracker, query.month).await?;
    Ok(Json(payload))
}

pub(super) async fn bug_areas(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let payload = producers::bug_areas(state.search.as_ref(), &state.tracker).await?;
    Ok(Json(payload))
}

pub(super) async fn monthly_triaging(
    State(state): State<AppState>,
) -> Result<Json<Value>, AppError> {
    let payload = producers::monthly_triaging(state.search.as_ref(), &state.tracker).await?;
    Ok(Json(payload))
}
