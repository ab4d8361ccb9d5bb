//! The warming scheduler.
//!
//! Timer-driven state machine with two states, `Idle` and `Running`. A tick
//! (or a manual trigger) moves it to `Running`; cycle completion always
//! returns it to `Idle`, whatever happened inside. A tick that arrives
//! while a cycle is in flight is dropped, not deferred — the single guard
//! flag is the only lock in the subsystem.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::FutureExt;
use futures::future::join_all;
use metrics::{counter, histogram};
use serde_json::Value;
use time::OffsetDateTime;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::cache::CacheFacade;
use crate::cache::lock::mutex_lock;
use crate::config::WarmingSettings;

use super::registry::ViewRegistry;
use super::stats::{LAST_RUN_KEY, ViewOutcome, ViewStats, WarmedData, WarmingRun, WarmingStats};
use super::view::{Priority, ViewDescriptor};

const SOURCE: &str = "warming::scheduler";
const LAST_RUN_TTL: Duration = Duration::from_secs(300);

/// Result of asking the scheduler to run one cycle.
#[derive(Debug)]
pub enum CycleOutcome {
    Completed(WarmingRun),
    /// A cycle was already in flight; this one was dropped.
    Skipped,
}

#[derive(Default)]
struct StatsInner {
    total_runs: u64,
    successful_warms: u64,
    failed_warms: u64,
    last_run: Option<OffsetDateTime>,
    last_success: Option<OffsetDateTime>,
    last_error: Option<String>,
    per_view: BTreeMap<String, ViewStats>,
    average_warm_time_ms: f64,
}

/// Proactive cache warming scheduler.
///
/// Owns all of its state; statistics are read through [`Self::stats`].
pub struct WarmingScheduler {
    registry: Arc<ViewRegistry>,
    facade: Arc<CacheFacade>,
    settings: WarmingSettings,
    running: AtomicBool,
    stats: Mutex<StatsInner>,
}

impl WarmingScheduler {
    pub fn new(
        registry: Arc<ViewRegistry>,
        facade: Arc<CacheFacade>,
        settings: WarmingSettings,
    ) -> Self {
        Self {
            registry,
            facade,
            settings,
            running: AtomicBool::new(false),
            stats: Mutex::new(StatsInner::default()),
        }
    }

    /// Run warming cycles forever: one immediately, then on every interval
    /// tick. Intended to be spawned as a background task.
    pub async fn run_loop(self: Arc<Self>) {
        info!(
            target = "veduta::warming",
            interval_secs = self.settings.interval.as_secs(),
            views = self.registry.len(),
            "cache warming service started"
        );

        let mut interval = tokio::time::interval(self.settings.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            // The first tick completes immediately: the unconditional
            // startup run.
            interval.tick().await;
            self.run_cycle().await;
        }
    }

    /// Start a cycle without waiting for it, unless one is already running.
    ///
    /// Returns whether a new cycle was started.
    pub fn trigger(self: Arc<Self>) -> bool {
        if self.is_running() {
            return false;
        }
        tokio::spawn(async move {
            self.run_cycle().await;
        });
        true
    }

    /// Execute one warming cycle.
    ///
    /// Tiers are processed critical → high → medium with a fixed pause in
    /// between; the medium tier runs sequentially. Failures are contained
    /// per view and never abort the cycle.
    pub async fn run_cycle(&self) -> CycleOutcome {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!(
                target = "veduta::warming",
                "warming cycle already in progress, skipping"
            );
            return CycleOutcome::Skipped;
        }
        // Released on every exit path, panics included; a stuck guard would
        // wedge all future cycles.
        let _guard = RunningGuard(&self.running);

        let started_at = OffsetDateTime::now_utc();
        let clock = Instant::now();
        {
            let mut stats = mutex_lock(&self.stats, SOURCE, "cycle_start");
            stats.total_runs += 1;
            stats.last_run = Some(started_at);
        }

        info!(target = "veduta::warming", "starting cache warming cycle");

        let mut outcomes = Vec::with_capacity(self.registry.len());

        let critical = self.registry.tier(Priority::Critical);
        outcomes.extend(join_all(critical.iter().map(|view| self.warm_view(view))).await);

        // Deliberate throttle between tiers to avoid hammering the tracker.
        tokio::time::sleep(self.settings.tier_pause).await;

        let high = self.registry.tier(Priority::High);
        outcomes.extend(join_all(high.iter().map(|view| self.warm_view(view))).await);

        tokio::time::sleep(self.settings.tier_pause).await;

        for view in self.registry.tier(Priority::Medium) {
            outcomes.push(self.warm_view(view).await);
            tokio::time::sleep(self.settings.step_delay).await;
        }

        let total_duration_ms = clock.elapsed().as_millis() as u64;
        let success_count = outcomes.iter().filter(|outcome| outcome.success).count() as u32;
        let failure_count = outcomes.len() as u32 - success_count;

        let run = WarmingRun {
            started_at,
            total_duration_ms,
            success_count,
            failure_count,
            outcomes,
        };

        {
            let mut stats = mutex_lock(&self.stats, SOURCE, "cycle_end");
            stats.successful_warms += u64::from(success_count);
            stats.failed_warms += u64::from(failure_count);
            stats.last_success = Some(OffsetDateTime::now_utc());
            stats.average_warm_time_ms =
                (stats.average_warm_time_ms + total_duration_ms as f64) / 2.0;
        }

        self.persist_snapshot(&run).await;

        histogram!("veduta_warm_cycle_ms").record(total_duration_ms as f64);
        info!(
            target = "veduta::warming",
            success = success_count,
            failed = failure_count,
            duration_ms = total_duration_ms,
            "cache warming cycle completed"
        );

        CycleOutcome::Completed(run)
    }

    async fn warm_view(&self, view: &ViewDescriptor) -> ViewOutcome {
        let clock = Instant::now();

        // Warming never duplicates work the cache already satisfies.
        if self.facade.get(&view.cache_key).await.is_some() {
            debug!(
                target = "veduta::warming",
                view = view.name,
                "fresh entry present, skipping producer"
            );
            counter!("veduta_warm_skipped_total").increment(1);
            return ViewOutcome {
                view: view.name.to_string(),
                success: true,
                skipped: true,
                duration_ms: clock.elapsed().as_millis() as u64,
                error: None,
            };
        }

        // A producer must not be able to take the cycle down (panic) or
        // wedge it (no deadline upstream).
        let produce = std::panic::AssertUnwindSafe((view.producer)()).catch_unwind();
        let result = match tokio::time::timeout(self.settings.producer_timeout, produce).await {
            Err(_) => Err(format!(
                "timed out after {}s",
                self.settings.producer_timeout.as_secs()
            )),
            Ok(Err(_)) => Err("producer panicked".to_string()),
            Ok(Ok(Err(err))) => Err(err.to_string()),
            Ok(Ok(Ok(value))) if payload_is_empty(&value) => {
                Err("producer returned empty payload".to_string())
            }
            Ok(Ok(Ok(value))) => Ok(value),
        };

        let duration_ms = clock.elapsed().as_millis() as u64;
        histogram!("veduta_warm_view_ms").record(duration_ms as f64);

        match result {
            Ok(value) => {
                if self.facade.set_raw(&view.cache_key, &value, view.ttl).await {
                    counter!("veduta_warm_success_total").increment(1);
                    self.record_success(view.name, duration_ms);
                    debug!(
                        target = "veduta::warming",
                        view = view.name,
                        duration_ms,
                        "view warmed"
                    );
                    ViewOutcome {
                        view: view.name.to_string(),
                        success: true,
                        skipped: false,
                        duration_ms,
                        error: None,
                    }
                } else {
                    self.record_failure(view.name, duration_ms, "cache write failed");
                    ViewOutcome {
                        view: view.name.to_string(),
                        success: false,
                        skipped: false,
                        duration_ms,
                        error: Some("cache write failed".to_string()),
                    }
                }
            }
            Err(message) => {
                warn!(
                    target = "veduta::warming",
                    view = view.name,
                    error = %message,
                    "failed to warm view"
                );
                self.record_failure(view.name, duration_ms, &message);
                ViewOutcome {
                    view: view.name.to_string(),
                    success: false,
                    skipped: false,
                    duration_ms,
                    error: Some(message),
                }
            }
        }
    }

    fn record_success(&self, name: &str, duration_ms: u64) {
        let mut stats = mutex_lock(&self.stats, SOURCE, "record_success");
        let view = stats.per_view.entry(name.to_string()).or_default();
        view.successes += 1;
        view.total_duration_ms += duration_ms;
        view.last_success_at = Some(OffsetDateTime::now_utc());
    }

    fn record_failure(&self, name: &str, duration_ms: u64, error: &str) {
        counter!("veduta_warm_failure_total").increment(1);
        let mut stats = mutex_lock(&self.stats, SOURCE, "record_failure");
        stats.last_error = Some(format!("{name}: {error}"));
        let view = stats.per_view.entry(name.to_string()).or_default();
        view.failures += 1;
        view.total_duration_ms += duration_ms;
        view.last_error = Some(error.to_string());
    }

    async fn persist_snapshot(&self, run: &WarmingRun) {
        // Transient monitoring artifact only; losing it costs nothing.
        match serde_json::to_value(run) {
            Ok(snapshot) => {
                if !self.facade.set_raw(LAST_RUN_KEY, &snapshot, LAST_RUN_TTL).await {
                    warn!(
                        target = "veduta::warming",
                        "failed to persist warming run snapshot"
                    );
                }
            }
            Err(err) => warn!(
                target = "veduta::warming",
                error = %err,
                "failed to encode warming run snapshot"
            ),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Snapshot of the accumulated scheduler statistics.
    pub fn stats(&self) -> WarmingStats {
        let stats = mutex_lock(&self.stats, SOURCE, "stats");
        WarmingStats {
            total_runs: stats.total_runs,
            successful_warms: stats.successful_warms,
            failed_warms: stats.failed_warms,
            last_run: stats.last_run,
            last_success: stats.last_success,
            last_error: stats.last_error.clone(),
            per_view: stats.per_view.clone(),
            average_warm_time_ms: stats.average_warm_time_ms,
            is_running: self.is_running(),
        }
    }

    /// The last persisted run snapshot, if one is still cached.
    pub async fn last_run(&self) -> Option<WarmingRun> {
        let snapshot = self.facade.get(LAST_RUN_KEY).await?;
        serde_json::from_value(snapshot).ok()
    }

    /// Read a view's warmed payload without triggering its producer.
    ///
    /// Returns `None` only for unknown view names; a known view with
    /// nothing cached yields `cached == false`.
    pub async fn warmed(&self, view_name: &str) -> Option<WarmedData> {
        let view = self.registry.get(view_name)?;
        let data = self.facade.get(&view.cache_key).await;
        Some(WarmedData {
            view: view.name.to_string(),
            cache_key: view.cache_key.clone(),
            cached: data.is_some(),
            data,
            timestamp: OffsetDateTime::now_utc(),
        })
    }

    pub fn registry(&self) -> &ViewRegistry {
        &self.registry
    }
}

/// Clears the running flag when dropped, the `finally` of a cycle.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

fn payload_is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
