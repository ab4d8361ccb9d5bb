//! Dashboard view descriptors.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::warmed_key;
use crate::source::SourceError;

/// Warming priority tiers, processed in this order each cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    Medium,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A view's producer: a plain async operation yielding the payload.
///
/// Producers carry no request/response shapes; the HTTP layer and the
/// warming scheduler are both thin adapters over the same function.
pub type Producer = Arc<dyn Fn() -> BoxFuture<'static, Result<Value, SourceError>> + Send + Sync>;

/// Static description of one warmable dashboard view.
///
/// Defined at process start, immutable thereafter.
#[derive(Clone)]
pub struct ViewDescriptor {
    pub name: &'static str,
    pub priority: Priority,
    pub cache_key: String,
    pub ttl: Duration,
    pub producer: Producer,
}

impl ViewDescriptor {
    pub fn new(name: &'static str, priority: Priority, ttl: Duration, producer: Producer) -> Self {
        Self {
            name,
            priority,
            cache_key: warmed_key(name),
            ttl,
            producer,
        }
    }
}

impl fmt::Debug for ViewDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewDescriptor")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("cache_key", &self.cache_key)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
