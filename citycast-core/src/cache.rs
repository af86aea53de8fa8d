//! Time-bounded in-memory store with passive expiry.

use parking_lot::RwLock;
use std::{collections::HashMap, hash::Hash, time::Duration};
use tokio::time::Instant;

use crate::model::{LocationId, WeatherSnapshot};

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Key/value store whose entries silently disappear once their TTL has elapsed.
///
/// Expired entries are never returned; they stay in memory until overwritten or
/// [`TtlCache::purge_expired`] is called.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
    default_ttl: Duration,
}

/// Longest expiry honored; larger TTLs are clamped so the deadline cannot overflow.
pub const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Per-location snapshot store shared by concurrent fetches.
pub type SnapshotCache = TtlCache<LocationId, WeatherSnapshot>;

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        self.entries
            .read()
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone())
    }

    pub fn put(&self, key: K, value: V) {
        self.put_with_ttl(key, value, self.default_ttl);
    }

    pub fn put_with_ttl(&self, key: K, value: V, ttl: Duration) {
        let expires_at = Instant::now() + ttl.min(MAX_TTL);
        self.entries
            .write()
            .insert(key, CacheEntry { value, expires_at });
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        before - entries.len()
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SnapshotCache {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(300);
}

impl Default for SnapshotCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TTL)
    }
}
