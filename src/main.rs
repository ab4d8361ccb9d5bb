use std::{process, sync::Arc};

use clap::Parser;
use tokio::task::JoinHandle;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;
use veduta::{
    cache::{CacheFacade, CacheStore, TtlClass},
    config,
    error::AppError,
    http::{self, AppState},
    source::{IssueSearch, RestSearch},
    telemetry,
    warming::{ViewRegistry, WarmingScheduler},
};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let cli = config::CliArgs::parse();
    let settings = config::load(&cli)
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging)?;
    serve(settings).await
}

async fn serve(settings: config::Settings) -> Result<(), AppError> {
    let store = match settings.cache.redis_url.as_deref() {
        Some(url) => CacheStore::connect(url).await,
        None => CacheStore::memory_only(),
    };
    let store = Arc::new(store);
    let facade = Arc::new(CacheFacade::new(store.clone(), settings.cache.clone()));

    let tracker = Arc::new(settings.tracker.clone());
    let search: Arc<dyn IssueSearch> = Arc::new(
        RestSearch::new(&tracker)
            .map_err(|err| AppError::unexpected(format!("failed to build tracker client: {err}")))?,
    );

    let registry = Arc::new(ViewRegistry::standard(
        search.clone(),
        tracker.clone(),
        facade.ttl(TtlClass::Short),
        &settings.warming.priorities,
    ));
    let scheduler = Arc::new(WarmingScheduler::new(
        registry,
        facade.clone(),
        settings.warming.clone(),
    ));

    let warming_handle = settings
        .warming
        .enabled
        .then(|| tokio::spawn(scheduler.clone().run_loop()));
    let reprobe_handle = settings
        .cache
        .redis_url
        .is_some()
        .then(|| spawn_backend_reprobe(store.clone(), settings.cache.reprobe_interval));

    let state = AppState {
        facade,
        scheduler,
        search,
        tracker,
        response_cache_enabled: settings.cache.enable_response_cache,
    };
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr).await?;
    info!(target = "veduta::http", addr = %settings.server.addr, "listening");

    let result = axum::serve(listener, router.into_make_service())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")));

    if let Some(handle) = warming_handle {
        handle.abort();
        let _ = handle.await;
    }
    if let Some(handle) = reprobe_handle {
        handle.abort();
        let _ = handle.await;
    }

    result
}

/// Periodic health check that promotes the cache store back to Redis once
/// it becomes reachable after a degraded start.
fn spawn_backend_reprobe(store: Arc<CacheStore>, interval: std::time::Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // Skip the first immediate tick; startup already probed
        loop {
            ticker.tick().await;
            if !store.is_redis_available() && store.try_promote().await {
                info!(target = "veduta::cache", "Redis cache backend restored");
            }
        }
    })
}
