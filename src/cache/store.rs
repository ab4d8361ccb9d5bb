//! Cache storage backends.
//!
//! A networked Redis backend is preferred; when the startup connectivity
//! probe fails, all operations route to an in-process store with no
//! persistence. A periodic re-probe can promote the store back to Redis
//! once it is reachable again.
//!
//! Store operations never propagate errors to callers: every failure is
//! caught and converted into an absent/`false` result.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use metrics::gauge;
use redis::{AsyncCommands, aio::ConnectionManager};
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";
const PROBE_KEY: &str = "veduta:probe";
const PROBE_TTL_MS: u64 = 2_000;
const BACKEND_GAUGE: &str = "veduta_cache_backend_available";

#[derive(Debug, Error)]
enum ProbeError {
    #[error(transparent)]
    Redis(#[from] redis::RedisError),
    #[error("probe value did not round-trip")]
    Mismatch,
}

/// Key/value store with per-entry expiration.
///
/// Reads after an entry's expiry behave as absent. The backend decision is
/// made by the startup probe and revisited only by [`CacheStore::try_promote`].
pub struct CacheStore {
    redis_url: Option<String>,
    redis: RwLock<Option<ConnectionManager>>,
    redis_available: AtomicBool,
    memory: MemoryStore,
}

impl CacheStore {
    /// Build a store backed only by process memory.
    pub fn memory_only() -> Self {
        gauge!(BACKEND_GAUGE).set(0.0);
        Self {
            redis_url: None,
            redis: RwLock::new(None),
            redis_available: AtomicBool::new(false),
            memory: MemoryStore::new(),
        }
    }

    /// Connect to Redis, probing connectivity with a sentinel round-trip.
    ///
    /// Never fails: a failed probe logs a warning and leaves the store on
    /// the in-memory fallback.
    pub async fn connect(url: &str) -> Self {
        let store = Self {
            redis_url: Some(url.to_string()),
            redis: RwLock::new(None),
            redis_available: AtomicBool::new(false),
            memory: MemoryStore::new(),
        };

        if store.try_promote().await {
            info!(target = "veduta::cache", url, "Redis cache backend initialized");
        } else {
            warn!(
                target = "veduta::cache",
                url, "Redis not available, falling back to in-memory cache"
            );
        }

        store
    }

    /// Attempt to (re)establish the Redis backend.
    ///
    /// Returns `true` when Redis is usable afterwards. Called once at
    /// startup and periodically by the health-check task while degraded.
    pub async fn try_promote(&self) -> bool {
        let Some(url) = self.redis_url.as_deref() else {
            return false;
        };
        if self.redis_available.load(Ordering::SeqCst) {
            return true;
        }

        match Self::open_and_probe(url).await {
            Ok(conn) => {
                *rw_write(&self.redis, SOURCE, "try_promote") = Some(conn);
                self.redis_available.store(true, Ordering::SeqCst);
                gauge!(BACKEND_GAUGE).set(1.0);
                true
            }
            Err(err) => {
                debug!(
                    target = "veduta::cache",
                    error = %err,
                    "Redis probe failed, staying on in-memory store"
                );
                gauge!(BACKEND_GAUGE).set(0.0);
                false
            }
        }
    }

    async fn open_and_probe(url: &str) -> Result<ConnectionManager, ProbeError> {
        let client = redis::Client::open(url)?;
        let mut conn = ConnectionManager::new(client).await?;

        let _: () = redis::cmd("SET")
            .arg(PROBE_KEY)
            .arg("ok")
            .arg("PX")
            .arg(PROBE_TTL_MS)
            .query_async(&mut conn)
            .await?;
        let value: Option<String> = conn.get(PROBE_KEY).await?;
        if value.as_deref() != Some("ok") {
            return Err(ProbeError::Mismatch);
        }
        let _: u64 = conn.del(PROBE_KEY).await?;

        Ok(conn)
    }

    /// Whether operations are currently served by the Redis backend.
    pub fn is_redis_available(&self) -> bool {
        self.redis_available.load(Ordering::SeqCst)
    }

    fn redis_conn(&self) -> Option<ConnectionManager> {
        if !self.redis_available.load(Ordering::SeqCst) {
            return None;
        }
        rw_read(&self.redis, SOURCE, "redis_conn").clone()
    }

    fn mark_unavailable(&self, op: &'static str, err: &redis::RedisError) {
        warn!(
            target = "veduta::cache",
            op,
            error = %err,
            "Redis operation failed, degrading to in-memory store"
        );
        self.redis_available.store(false, Ordering::SeqCst);
        *rw_write(&self.redis, SOURCE, "mark_unavailable") = None;
        gauge!(BACKEND_GAUGE).set(0.0);
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        if let Some(mut conn) = self.redis_conn() {
            match conn.get::<_, Option<String>>(key).await {
                Ok(raw) => return raw.and_then(|raw| serde_json::from_str(&raw).ok()),
                Err(err) => self.mark_unavailable("get", &err),
            }
        }
        self.memory.get(key)
    }

    pub async fn set(&self, key: &str, value: &Value, ttl: Duration) -> bool {
        if let Some(mut conn) = self.redis_conn() {
            let raw = value.to_string();
            let result: Result<(), _> = redis::cmd("SET")
                .arg(key)
                .arg(raw)
                .arg("PX")
                .arg(ttl.as_millis() as u64)
                .query_async(&mut conn)
                .await;
            match result {
                Ok(()) => return true,
                Err(err) => self.mark_unavailable("set", &err),
            }
        }
        self.memory.set(key, value.clone(), ttl);
        true
    }

    pub async fn delete(&self, key: &str) -> bool {
        if let Some(mut conn) = self.redis_conn() {
            match conn.del::<_, u64>(key).await {
                Ok(removed) => return removed > 0,
                Err(err) => self.mark_unavailable("delete", &err),
            }
        }
        self.memory.delete(key)
    }

    pub async fn clear(&self) -> bool {
        self.memory.clear();
        if let Some(mut conn) = self.redis_conn() {
            let result: Result<(), _> = redis::cmd("FLUSHDB").query_async(&mut conn).await;
            match result {
                Ok(()) => return true,
                Err(err) => self.mark_unavailable("clear", &err),
            }
        }
        true
    }
}

struct MemoryEntry {
    value: Value,
    expires_at: OffsetDateTime,
}

/// In-process fallback store with lazy per-entry expiration.
struct MemoryStore {
    entries: RwLock<HashMap<String, MemoryEntry>>,
}

impl MemoryStore {
    fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn get(&self, key: &str) -> Option<Value> {
        let mut entries = rw_write(&self.entries, SOURCE, "memory_get");
        match entries.get(key) {
            Some(entry) if entry.expires_at > OffsetDateTime::now_utc() => {
                Some(entry.value.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn set(&self, key: &str, value: Value, ttl: Duration) {
        let entry = MemoryEntry {
            value,
            expires_at: OffsetDateTime::now_utc() + ttl,
        };
        rw_write(&self.entries, SOURCE, "memory_set").insert(key.to_string(), entry);
    }

    fn delete(&self, key: &str) -> bool {
        rw_write(&self.entries, SOURCE, "memory_delete")
            .remove(key)
            .is_some()
    }

    fn clear(&self) {
        rw_write(&self.entries, SOURCE, "memory_clear").clear();
    }
}
