use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

pub const DEFAULT_CACHE_TTL_SECS: i64 = 300;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub fn dashboard_cache_key(organization_id: Uuid) -> String {
    format!("dashboard-{organization_id}")
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    stored_at: DateTime<Utc>,
}

/// In-process key/value map with a fixed time-to-live.
///
/// Expiry is checked lazily in [`CacheStore::is_valid`]; nothing is evicted
/// in the background. `get` hands back whatever is stored, stale or not, so
/// callers gate reads on `is_valid`.
pub struct CacheStore<V> {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: HashMap<String, CacheEntry<V>>,
}

impl<V: Clone> CacheStore<V> {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: HashMap::new(),
        }
    }

    pub fn with_default_ttl(clock: Arc<dyn Clock>) -> Self {
        Self::new(Duration::seconds(DEFAULT_CACHE_TTL_SECS), clock)
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    pub fn set(&mut self, key: impl Into<String>, value: V) {
        let entry = CacheEntry {
            value,
            stored_at: self.clock.now(),
        };
        self.entries.insert(key.into(), entry);
    }

    pub fn is_valid(&self, key: &str) -> bool {
        match self.entries.get(key) {
            Some(entry) => self.clock.now() - entry.stored_at < self.ttl,
            None => false,
        }
    }

    /// Drops every entry, not only the caller's organization.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
