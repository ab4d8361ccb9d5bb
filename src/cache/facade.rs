//! Typed helpers over the cache store.
//!
//! The facade owns key construction, TTL class resolution, hit/miss
//! diagnostics, and the key index that makes category invalidation exact.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::CacheSettings;

use super::keys::{Category, KeyIndex, TtlClass};
use super::store::CacheStore;

/// Snapshot returned by the cache status endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
    pub backend_available: bool,
    pub ttl_seconds: BTreeMap<&'static str, u64>,
    pub categories: Vec<&'static str>,
    pub tracked_keys: usize,
}

pub struct CacheFacade {
    store: Arc<CacheStore>,
    settings: CacheSettings,
    index: KeyIndex,
}

impl CacheFacade {
    pub fn new(store: Arc<CacheStore>, settings: CacheSettings) -> Self {
        Self {
            store,
            settings,
            index: KeyIndex::new(),
        }
    }

    /// Generate a cache key for a category and optional identifier.
    pub fn key(category: Category, identifier: Option<&str>) -> String {
        category.key(identifier)
    }

    /// Resolve a TTL class to its configured duration.
    pub fn ttl(&self, class: TtlClass) -> Duration {
        match class {
            TtlClass::Short => self.settings.ttl_short,
            TtlClass::Medium => self.settings.ttl_medium,
            TtlClass::Long => self.settings.ttl_long,
            TtlClass::Extended => self.settings.ttl_extended,
        }
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        match self.store.get(key).await {
            Some(value) => {
                counter!("veduta_cache_hit_total").increment(1);
                debug!(target = "veduta::cache", key, outcome = "hit", "cache read");
                Some(value)
            }
            None => {
                counter!("veduta_cache_miss_total").increment(1);
                debug!(target = "veduta::cache", key, outcome = "miss", "cache read");
                None
            }
        }
    }

    /// Write a value under a category key and record it in the index.
    pub async fn set_in_category(
        &self,
        category: Category,
        identifier: Option<&str>,
        value: &Value,
        class: TtlClass,
    ) -> bool {
        let key = Self::key(category, identifier);
        let stored = self.set_raw(&key, value, self.ttl(class)).await;
        if stored {
            self.index.record(category, &key);
        }
        stored
    }

    /// Write a value under an explicit key with an explicit TTL.
    ///
    /// Used by the warming scheduler, whose keys live outside the category
    /// namespace.
    pub async fn set_raw(&self, key: &str, value: &Value, ttl: Duration) -> bool {
        let stored = self.store.set(key, value, ttl).await;
        if stored {
            counter!("veduta_cache_set_total").increment(1);
            debug!(
                target = "veduta::cache",
                key,
                ttl_secs = ttl.as_secs(),
                "cache write"
            );
        } else {
            counter!("veduta_cache_set_failed_total").increment(1);
            debug!(target = "veduta::cache", key, "cache write failed");
        }
        stored
    }

    pub async fn delete(&self, key: &str) -> bool {
        self.index.remove(key);
        let deleted = self.store.delete(key).await;
        debug!(target = "veduta::cache", key, deleted, "cache delete");
        deleted
    }

    pub async fn clear(&self) -> bool {
        self.index.clear();
        let cleared = self.store.clear().await;
        debug!(target = "veduta::cache", cleared, "cache cleared");
        cleared
    }

    /// Delete every key ever written under a category, returning the count
    /// of deleted entries.
    pub async fn invalidate_category(&self, category: Category) -> usize {
        let mut deleted = 0;
        for key in self.index.take(category) {
            if self.store.delete(&key).await {
                deleted += 1;
            }
        }
        debug!(
            target = "veduta::cache",
            category = %category,
            deleted,
            "category invalidated"
        );
        deleted
    }

    pub fn status(&self) -> CacheStatus {
        let mut ttl_seconds = BTreeMap::new();
        ttl_seconds.insert("short", self.settings.ttl_short.as_secs());
        ttl_seconds.insert("medium", self.settings.ttl_medium.as_secs());
        ttl_seconds.insert("long", self.settings.ttl_long.as_secs());
        ttl_seconds.insert("extended", self.settings.ttl_extended.as_secs());

        CacheStatus {
            backend_available: self.store.is_redis_available(),
            ttl_seconds,
            categories: Category::ALL.iter().map(Category::as_str).collect(),
            tracked_keys: self.index.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn test_settings() -> CacheSettings {
        CacheSettings {
            redis_url: None,
            ttl_short: Duration::from_secs(60),
            ttl_medium: Duration::from_secs(120),
            ttl_long: Duration::from_secs(300),
            ttl_extended: Duration::from_secs(600),
            reprobe_interval: Duration::from_secs(30),
            enable_response_cache: true,
        }
    }

    fn facade() -> CacheFacade {
        CacheFacade::new(Arc::new(CacheStore::memory_only()), test_settings())
    }

    #[test]
    fn ttl_classes_resolve_independently() {
        let facade = facade();
        assert_eq!(facade.ttl(TtlClass::Short), Duration::from_secs(60));
        assert_eq!(facade.ttl(TtlClass::Extended), Duration::from_secs(600));
    }

    #[tokio::test]
    async fn categorized_write_reads_back() {
        let facade = facade();
        let value = json!({ "manual": 4, "automated": 9 });

        assert!(
            facade
                .set_in_category(Category::TestCases, Some("current"), &value, TtlClass::Medium)
                .await
        );
        assert_eq!(facade.get("test_cases:current").await, Some(value));
    }

    #[tokio::test]
    async fn invalidate_category_deletes_only_recorded_keys() {
        let facade = facade();
        let value = json!(1);

        facade
            .set_in_category(Category::BugStats, Some("2025-1"), &value, TtlClass::Short)
            .await;
        // Written out-of-band: the index never learns about this key.
        facade.set_raw("bug_stats:2025-2", &value, Duration::from_secs(60)).await;

        let deleted = facade.invalidate_category(Category::BugStats).await;
        assert_eq!(deleted, 1);
        assert!(facade.get("bug_stats:2025-1").await.is_none());
        assert!(facade.get("bug_stats:2025-2").await.is_some());
    }

    #[tokio::test]
    async fn invalidate_category_covers_every_identifier_written() {
        let facade = facade();
        for id in ["2025-1", "2025-2", "2025-3"] {
            facade
                .set_in_category(Category::BugStats, Some(id), &json!(1), TtlClass::Short)
                .await;
        }

        assert_eq!(facade.invalidate_category(Category::BugStats).await, 3);
        assert_eq!(facade.status().tracked_keys, 0);
    }

    #[tokio::test]
    async fn delete_unregisters_key_from_index() {
        let facade = facade();
        facade
            .set_in_category(Category::TestCases, None, &json!(1), TtlClass::Short)
            .await;

        assert!(facade.delete("test_cases").await);
        assert_eq!(facade.status().tracked_keys, 0);
        assert_eq!(facade.invalidate_category(Category::TestCases).await, 0);
    }

    #[tokio::test]
    async fn status_reports_configuration() {
        let facade = facade();
        let status = facade.status();

        assert!(!status.backend_available);
        assert_eq!(status.ttl_seconds["short"], 60);
        assert_eq!(status.categories.len(), Category::ALL.len());
    }
}
