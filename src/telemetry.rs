use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};
use crate::error::AppError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), AppError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            AppError::Telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "veduta_cache_hit_total",
            Unit::Count,
            "Total number of cache hits."
        );
        describe_counter!(
            "veduta_cache_miss_total",
            Unit::Count,
            "Total number of cache misses."
        );
        describe_counter!(
            "veduta_cache_set_total",
            Unit::Count,
            "Total number of successful cache writes."
        );
        describe_counter!(
            "veduta_cache_set_failed_total",
            Unit::Count,
            "Total number of failed cache writes."
        );
        describe_gauge!(
            "veduta_cache_backend_available",
            Unit::Count,
            "1 when the networked cache backend is in use, 0 when degraded to memory."
        );
        describe_counter!(
            "veduta_warm_success_total",
            Unit::Count,
            "Total number of successfully warmed views."
        );
        describe_counter!(
            "veduta_warm_failure_total",
            Unit::Count,
            "Total number of failed view warm attempts."
        );
        describe_counter!(
            "veduta_warm_skipped_total",
            Unit::Count,
            "Total number of views skipped because a fresh cache entry existed."
        );
        describe_histogram!(
            "veduta_warm_view_ms",
            Unit::Milliseconds,
            "Per-view warm duration in milliseconds."
        );
        describe_histogram!(
            "veduta_warm_cycle_ms",
            Unit::Milliseconds,
            "Full warming cycle duration in milliseconds."
        );
    });
}
