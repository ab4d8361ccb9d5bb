//! Cache key namespace.
//!
//! Keys are built as `{category}:{identifier}` over a closed set of
//! categories, one per dashboard data family. Warmed view payloads live
//! under dedicated `{view}_warmed` keys outside the category namespace.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::keys";

/// Closed set of cache key categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    TestCases,
    BugStats,
    BugAreas,
    MonthlyData,
    CumulativeData,
    TriagingData,
    DashboardBatch,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::TestCases,
        Category::BugStats,
        Category::BugAreas,
        Category::MonthlyData,
        Category::CumulativeData,
        Category::TriagingData,
        Category::DashboardBatch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::TestCases => "test_cases",
            Category::BugStats => "bug_stats",
            Category::BugAreas => "bug_areas",
            Category::MonthlyData => "monthly_data",
            Category::CumulativeData => "cumulative_data",
            Category::TriagingData => "triaging_data",
            Category::DashboardBatch => "dashboard_batch",
        }
    }

    pub fn parse(value: &str) -> Option<Category> {
        Category::ALL
            .into_iter()
            .find(|category| category.as_str() == value)
    }

    /// Build the concrete cache key for this category.
    ///
    /// Deterministic: the same inputs always produce the same key.
    pub fn key(&self, identifier: Option<&str>) -> String {
        match identifier {
            Some(id) if !id.is_empty() => format!("{}:{id}", self.as_str()),
            _ => self.as_str().to_string(),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// TTL classes for cached entries.
///
/// The observed deployment collapses all four to the same two-minute value,
/// but the classification stays independently configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlClass {
    Short,
    Medium,
    Long,
    Extended,
}

/// Key under which a warmed view payload is stored.
pub fn warmed_key(view: &str) -> String {
    format!("{}_warmed", view.replace('-', "_"))
}

/// Exact category → keys bookkeeping.
///
/// The backing store offers no key enumeration, so category invalidation
/// works off this index instead: every write through the facade records its
/// key here, and invalidation deletes exactly the recorded keys. Keys
/// written out-of-band are not covered.
pub struct KeyIndex {
    entries: RwLock<HashMap<Category, HashSet<String>>>,
}

impl KeyIndex {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Record a key written under a category.
    pub fn record(&self, category: Category, key: &str) {
        rw_write(&self.entries, SOURCE, "record")
            .entry(category)
            .or_default()
            .insert(key.to_string());
    }

    /// Drop a single key from whichever category tracks it.
    pub fn remove(&self, key: &str) {
        let mut entries = rw_write(&self.entries, SOURCE, "remove");
        for keys in entries.values_mut() {
            keys.remove(key);
        }
    }

    /// Drain all keys recorded under a category.
    pub fn take(&self, category: Category) -> Vec<String> {
        rw_write(&self.entries, SOURCE, "take")
            .remove(&category)
            .map(|keys| keys.into_iter().collect())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        rw_write(&self.entries, SOURCE, "clear").clear();
    }

    /// Total number of tracked keys across all categories.
    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len")
            .values()
            .map(HashSet::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for KeyIndex {
    fn default() -> Self {
        Self::new()
    }
}
