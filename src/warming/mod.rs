//! Proactive cache warming.
//!
//! A scheduler periodically invokes every registered view's producer in
//! priority order and publishes the payloads into the cache, so dashboard
//! clients are served instantly from warmed data. Higher tiers fan out in
//! parallel; the lowest tier runs sequentially to protect upstream
//! capacity. At most one warming cycle executes at a time.

mod registry;
mod scheduler;
mod stats;
mod view;

pub use registry::ViewRegistry;
pub use scheduler::{CycleOutcome, WarmingScheduler};
pub use stats::{LAST_RUN_KEY, ViewOutcome, ViewStats, WarmedData, WarmingRun, WarmingStats};
pub use view::{Priority, Producer, ViewDescriptor};
