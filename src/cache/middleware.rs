//! Response cache middleware.
//!
//! Wraps a dashboard route: on hit, short-circuits with the stored JSON
//! payload; on miss, runs the handler and captures its output into the
//! cache. Any cache-layer problem degrades to pass-through — the cache is
//! never a point of failure for the request path.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Method, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::facade::CacheFacade;
use super::keys::{Category, TtlClass};

const MAX_CACHED_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Per-route cache configuration for [`response_cache_layer`].
#[derive(Clone)]
pub struct RouteCache {
    pub facade: Arc<CacheFacade>,
    pub category: Category,
    pub ttl: TtlClass,
    pub enabled: bool,
}

impl RouteCache {
    pub fn new(facade: Arc<CacheFacade>, category: Category, ttl: TtlClass, enabled: bool) -> Self {
        Self {
            facade,
            category,
            ttl,
            enabled,
        }
    }
}

/// Middleware caching successful JSON responses per route.
///
/// Only GET requests participate. The cache key is derived from the route's
/// category and the request path, so each concrete path gets its own entry.
#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn response_cache_layer(
    State(route): State<RouteCache>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !route.enabled || request.method() != Method::GET {
        return next.run(request).await;
    }

    let path = request.uri().path().to_string();
    let key = CacheFacade::key(route.category, Some(&path));

    if let Some(cached) = route.facade.get(&key).await {
        debug!(target = "veduta::cache", key, "serving cached response");
        return cached_response(&key, cached);
    }

    let mut response = next.run(request).await;
    annotate(&mut response, "MISS", &key);

    if response.status() != StatusCode::OK {
        return response;
    }

    let (parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_CACHED_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(target = "veduta::cache", key, error = %err, "failed to buffer response body");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    // Only successful, non-empty JSON output is cacheable.
    if let Ok(value) = serde_json::from_slice::<Value>(&bytes) {
        if !value.is_null() {
            let facade = route.facade.clone();
            let category = route.category;
            let ttl = route.ttl;
            tokio::spawn(async move {
                if !facade
                    .set_in_category(category, Some(&path), &value, ttl)
                    .await
                {
                    warn!(target = "veduta::cache", path, "failed to cache response");
                }
            });
        }
    }

    Response::from_parts(parts, Body::from(bytes))
}

fn cached_response(key: &str, value: Value) -> Response {
    let mut response = (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        value.to_string(),
    )
        .into_response();
    annotate(&mut response, "HIT", key);
    response
}

fn annotate(response: &mut Response, outcome: &'static str, key: &str) {
    response
        .headers_mut()
        .insert("X-Cache", HeaderValue::from_static(outcome));
    if let Ok(value) = HeaderValue::from_str(key) {
        response.headers_mut().insert("X-Cache-Key", value);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use axum::{Json, Router, middleware, routing::get};
    use serde_json::json;
    use tower::ServiceExt;

    use crate::cache::store::CacheStore;
    use crate::config::CacheSettings;

    use super::*;

    fn facade() -> Arc<CacheFacade> {
        let settings = CacheSettings {
            redis_url: None,
            ttl_short: Duration::from_secs(60),
            ttl_medium: Duration::from_secs(60),
            ttl_long: Duration::from_secs(60),
            ttl_extended: Duration::from_secs(60),
            reprobe_interval: Duration::from_secs(30),
            enable_response_cache: true,
        };
        Arc::new(CacheFacade::new(Arc::new(CacheStore::memory_only()), settings))
    }

    fn router(route: RouteCache, hits: Arc<AtomicUsize>) -> Router {
        Router::new()
            .route(
                "/api/test-cases",
                get(move || {
                    let hits = hits.clone();
                    async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                        Json(json!({ "manual": 12, "automated": 30 }))
                    }
                }),
            )
            .layer(middleware::from_fn_with_state(route, response_cache_layer))
    }

    fn request() -> Request<Body> {
        Request::builder()
            .uri("/api/test-cases")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn hit_short_circuits_the_handler() {
        let facade = facade();
        let seeded = json!({ "manual": 1, "automated": 2 });
        facade
            .set_in_category(
                Category::TestCases,
                Some("/api/test-cases"),
                &seeded,
                TtlClass::Medium,
            )
            .await;

        let hits = Arc::new(AtomicUsize::new(0));
        let route = RouteCache::new(facade, Category::TestCases, TtlClass::Medium, true);
        let app = router(route, hits.clone());

        let response = app.oneshot(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["X-Cache"], "HIT");
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, seeded);
    }

    #[tokio::test]
    async fn miss_invokes_handler_and_stores_output() {
        let facade = facade();
        let hits = Arc::new(AtomicUsize::new(0));
        let route = RouteCache::new(facade.clone(), Category::TestCases, TtlClass::Medium, true);
        let app = router(route, hits.clone());

        let response = app.oneshot(request()).await.unwrap();
        assert_eq!(response.headers()["X-Cache"], "MISS");
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // The write happens off the request path.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let cached = facade.get("test_cases:/api/test-cases").await;
        assert_eq!(cached, Some(json!({ "manual": 12, "automated": 30 })));
    }

    #[tokio::test]
    async fn error_responses_are_not_cached() {
        let facade = facade();
        let route = RouteCache::new(facade.clone(), Category::BugStats, TtlClass::Short, true);
        let app = Router::new()
            .route(
                "/api/bug-stats",
                get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
            )
            .layer(middleware::from_fn_with_state(route, response_cache_layer));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/bug-stats")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(facade.get("bug_stats:/api/bug-stats").await.is_none());
    }

    #[tokio::test]
    async fn disabled_cache_passes_through() {
        let facade = facade();
        let hits = Arc::new(AtomicUsize::new(0));
        let route = RouteCache::new(facade.clone(), Category::TestCases, TtlClass::Medium, false);
        let app = router(route, hits.clone());

        let response = app.oneshot(request()).await.unwrap();
        assert!(response.headers().get("X-Cache").is_none());
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(facade.get("test_cases:/api/test-cases").await.is_none());
    }
}
