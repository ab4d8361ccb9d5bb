//! Veduta cache system.
//!
//! Sits between the HTTP surface and the expensive issue-tracker queries:
//!
//! - **Store**: get/set/delete/clear over Redis with an in-process fallback
//! - **Facade**: typed keys, TTL classes, exact category invalidation
//! - **Middleware**: response caching for the dashboard endpoints
//!
//! ## Configuration
//!
//! Cache behavior is controlled via `veduta.toml`:
//!
//! ```toml
//! [cache]
//! redis_url = "redis://127.0.0.1:6379"
//! ttl_short_seconds = 120
//! # ... see config for all options
//! ```

mod facade;
mod keys;
pub(crate) mod lock;
mod middleware;
mod store;

pub use facade::{CacheFacade, CacheStatus};
pub use keys::{Category, KeyIndex, TtlClass, warmed_key};
pub use middleware::{RouteCache, response_cache_layer};
pub use store::CacheStore;
