//! Warming statistics and run snapshots.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

/// Cache key under which the last run snapshot is persisted for monitoring.
pub const LAST_RUN_KEY: &str = "cache_warming_results";

/// Outcome of warming a single view within one cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewOutcome {
    pub view: String,
    pub success: bool,
    pub skipped: bool,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One full execution cycle of the warming scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmingRun {
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    pub total_duration_ms: u64,
    pub success_count: u32,
    pub failure_count: u32,
    pub outcomes: Vec<ViewOutcome>,
}

/// Per-view statistics, accumulating for the lifetime of the process.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewStats {
    pub successes: u64,
    pub failures: u64,
    pub total_duration_ms: u64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_success_at: Option<OffsetDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Scheduler-level statistics exposed on the monitoring surface.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmingStats {
    pub total_runs: u64,
    pub successful_warms: u64,
    pub failed_warms: u64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_run: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_success: Option<OffsetDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub per_view: BTreeMap<String, ViewStats>,
    pub average_warm_time_ms: f64,
    pub is_running: bool,
}

/// Result of the warmed-data read path.
///
/// A miss is not an error: warming is purely scheduler-driven, so callers
/// seeing `cached == false` retry later.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmedData {
    pub view: String,
    pub cache_key: String,
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}
