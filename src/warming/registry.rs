//! Static view registry.
//!
//! Maps each dashboard view to its priority, cache key, TTL and producer.
//! The registry is built once at startup from configuration and never
//! mutated afterwards.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::config::TrackerSettings;
use crate::source::{IssueSearch, SourceError, producers};

use super::view::{Priority, Producer, ViewDescriptor};

pub struct ViewRegistry {
    views: Vec<ViewDescriptor>,
}

impl ViewRegistry {
    pub fn new(views: Vec<ViewDescriptor>) -> Self {
        Self { views }
    }

    /// The standard set of dashboard views.
    ///
    /// `overrides` reassigns priorities per view name; unknown names are
    /// ignored.
    pub fn standard(
        search: Arc<dyn IssueSearch>,
        tracker: Arc<TrackerSettings>,
        ttl: Duration,
        overrides: &HashMap<String, Priority>,
    ) -> Self {
        let assigned = |name: &str, default: Priority| -> Priority {
            overrides.get(name).copied().unwrap_or(default)
        };
        let view = |name: &'static str, default: Priority, producer: Producer| {
            ViewDescriptor::new(name, assigned(name, default), ttl, producer)
        };

        let views = vec![
            view(
                "dashboard-batch",
                Priority::Critical,
                boxed_producer(&search, &tracker, |s, t| {
                    async move { producers::dashboard_batch(s.as_ref(), &t).await }.boxed()
                }),
            ),
            view(
                "test-cases",
                Priority::Critical,
                boxed_producer(&search, &tracker, |s, t| {
                    async move { producers::test_case_counts(s.as_ref(), &t).await }.boxed()
                }),
            ),
            view(
                "bug-stats",
                Priority::Critical,
                boxed_producer(&search, &tracker, |s, t| {
                    async move { producers::bug_stats(s.as_ref(), &t, None).await }.boxed()
                }),
            ),
            view(
                "monthly-cumulative-data",
                Priority::High,
                boxed_producer(&search, &tracker, |s, t| {
                    async move { producers::cumulative_monthly(s.as_ref(), &t).await }.boxed()
                }),
            ),
            view(
                "monthly-test-cases",
                Priority::High,
                boxed_producer(&search, &tracker, |s, t| {
                    async move { producers::monthly_test_cases(s.as_ref(), &t).await }.boxed()
                }),
            ),
            view(
                "bug-areas",
                Priority::High,
                boxed_producer(&search, &tracker, |s, t| {
                    async move { producers::bug_areas(s.as_ref(), &t).await }.boxed()
                }),
            ),
            view(
                "triaging-data",
                Priority::High,
                boxed_producer(&search, &tracker, |s, t| {
                    async move { producers::monthly_triaging(s.as_ref(), &t).await }.boxed()
                }),
            ),
            view(
                "all-test-case-data",
                Priority::Medium,
                boxed_producer(&search, &tracker, |s, t| {
                    async move { producers::all_test_cases(s.as_ref(), &t).await }.boxed()
                }),
            ),
            // Served from the same aggregate as all-test-case-data; kept as
            // a distinct view for frontend compatibility.
            view(
                "cumulative-test-case-data",
                Priority::Medium,
                boxed_producer(&search, &tracker, |s, t| {
                    async move { producers::all_test_cases(s.as_ref(), &t).await }.boxed()
                }),
            ),
        ];

        Self::new(views)
    }

    pub fn get(&self, name: &str) -> Option<&ViewDescriptor> {
        self.views.iter().find(|view| view.name == name)
    }

    /// Views of one priority tier, in definition order.
    pub fn tier(&self, priority: Priority) -> Vec<&ViewDescriptor> {
        self.views
            .iter()
            .filter(|view| view.priority == priority)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ViewDescriptor> {
        self.views.iter()
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }
}

fn boxed_producer<F>(
    search: &Arc<dyn IssueSearch>,
    tracker: &Arc<TrackerSettings>,
    produce: F,
) -> Producer
where
    F: Fn(
            Arc<dyn IssueSearch>,
            Arc<TrackerSettings>,
        ) -> BoxFuture<'static, Result<Value, SourceError>>
        + Send
        + Sync
        + 'static,
{
    let search = search.clone();
    let tracker = tracker.clone();
    Arc::new(move || produce(search.clone(), tracker.clone()))
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use url::Url;

    use crate::source::SearchPage;

    use super::*;

    struct NullSearch;

    #[async_trait]
    impl IssueSearch for NullSearch {
        async fn count(&self, _query: &str) -> Result<u64, SourceError> {
            Ok(0)
        }

        async fn search(
            &self,
            _query: &str,
            _fields: &[&str],
            _max_results: u32,
            _start_at: u32,
        ) -> Result<SearchPage, SourceError> {
            Ok(SearchPage {
                total: 0,
                issues: Vec::new(),
            })
        }
    }

    fn tracker() -> Arc<TrackerSettings> {
        Arc::new(TrackerSettings {
            base_url: Url::parse("https://tracker.example.com").unwrap(),
            project: "QA".to_string(),
            username: None,
            token: None,
            reporter: "robot".to_string(),
            triage_users: vec!["adane".to_string()],
            area_labels: vec!["QA:TAG:Crash".to_string()],
            area_version: String::new(),
        })
    }

    #[test]
    fn standard_registry_partitions_into_tiers() {
        let registry = ViewRegistry::standard(
            Arc::new(NullSearch),
            tracker(),
            Duration::from_secs(120),
            &HashMap::new(),
        );

        assert_eq!(registry.len(), 9);
        assert_eq!(registry.tier(Priority::Critical).len(), 3);
        assert_eq!(registry.tier(Priority::High).len(), 4);
        assert_eq!(registry.tier(Priority::Medium).len(), 2);
    }

    #[test]
    fn priority_overrides_reassign_views() {
        let mut overrides = HashMap::new();
        overrides.insert("bug-areas".to_string(), Priority::Critical);

        let registry = ViewRegistry::standard(
            Arc::new(NullSearch),
            tracker(),
            Duration::from_secs(120),
            &overrides,
        );

        assert_eq!(registry.tier(Priority::Critical).len(), 4);
        assert_eq!(
            registry.get("bug-areas").map(|view| view.priority),
            Some(Priority::Critical)
        );
    }

    #[test]
    fn unique_names_and_cache_keys() {
        let registry = ViewRegistry::standard(
            Arc::new(NullSearch),
            tracker(),
            Duration::from_secs(120),
            &HashMap::new(),
        );

        let mut names: Vec<_> = registry.iter().map(|view| view.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), registry.len());

        assert_eq!(
            registry.get("dashboard-batch").map(|view| view.cache_key.as_str()),
            Some("dashboard_batch_warmed")
        );
    }
}
