//! HTTP surface.
//!
//! Thin adapters only: dashboard routes call the same producers the
//! warming scheduler uses, monitoring routes read scheduler state, and the
//! cache management routes operate on the facade. Each dashboard route is
//! wrapped in the response cache middleware with its own category and TTL
//! class.

mod cache_admin;
mod views;
mod warming;

use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{delete, get, post},
};

use crate::cache::{CacheFacade, Category, RouteCache, TtlClass, response_cache_layer};
use crate::config::TrackerSettings;
use crate::source::IssueSearch;
use crate::warming::WarmingScheduler;

#[derive(Clone)]
pub struct AppState {
    pub facade: Arc<CacheFacade>,
    pub scheduler: Arc<WarmingScheduler>,
    pub search: Arc<dyn IssueSearch>,
    pub tracker: Arc<TrackerSettings>,
    pub response_cache_enabled: bool,
}

pub fn build_router(state: AppState) -> Router {
    let cached = |category: Category, ttl: TtlClass| {
        middleware::from_fn_with_state(
            RouteCache::new(
                state.facade.clone(),
                category,
                ttl,
                state.response_cache_enabled,
            ),
            response_cache_layer,
        )
    };

    Router::new()
        .route(
            "/api/dashboard-batch",
            get(views::dashboard_batch).layer(cached(Category::DashboardBatch, TtlClass::Short)),
        )
        .route(
            "/api/test-cases",
            get(views::test_cases).layer(cached(Category::TestCases, TtlClass::Medium)),
        )
        .route(
            "/api/monthly-test-cases",
            get(views::monthly_test_cases).layer(cached(Category::MonthlyData, TtlClass::Extended)),
        )
        .route(
            "/api/all-test-cases",
            get(views::all_test_cases).layer(cached(Category::TestCases, TtlClass::Medium)),
        )
        .route(
            "/api/cumulative-test-cases",
            get(views::all_test_cases).layer(cached(Category::CumulativeData, TtlClass::Extended)),
        )
        .route(
            "/api/cumulative-monthly-data",
            get(views::cumulative_monthly)
                .layer(cached(Category::CumulativeData, TtlClass::Extended)),
        )
        .route(
            "/api/bug-stats",
            get(views::bug_stats).layer(cached(Category::BugStats, TtlClass::Short)),
        )
        .route(
            "/api/bug-areas",
            get(views::bug_areas).layer(cached(Category::BugAreas, TtlClass::Long)),
        )
        .route(
            "/api/monthly-triaging",
            get(views::monthly_triaging).layer(cached(Category::TriagingData, TtlClass::Medium)),
        )
        .route("/api/warming/stats", get(warming::stats))
        .route("/api/warming/last-run", get(warming::last_run))
        .route("/api/warming/data/{view}", get(warming::warmed_data))
        .route("/api/warming/run", post(warming::trigger))
        .route("/api/cache/status", get(cache_admin::status))
        .route("/api/cache", delete(cache_admin::clear_all))
        .route(
            "/api/cache/category/{category}",
            delete(cache_admin::clear_category),
        )
        .route(
            "/api/cache/key/{key}",
            get(cache_admin::get_key).delete(cache_admin::clear_key),
        )
        .route("/healthz", get(health))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
