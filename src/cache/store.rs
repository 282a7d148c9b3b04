//! LRU storage for query results.
//!
//! Values are type-erased so one store holds every read's result type; the
//! client downcasts on the way out.

use std::any::Any;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use lru::LruCache;

use crate::util::lock::{rw_read, rw_write};

use super::config::CacheConfig;
use super::keys::QueryKey;

const SOURCE: &str = "cache::store";

pub type CachedValue = Arc<dyn Any + Send + Sync>;

struct Entry {
    value: CachedValue,
    fetched_at: Instant,
    invalidated: bool,
}

impl Entry {
    fn is_stale(&self, stale_time: Duration) -> bool {
        self.invalidated || self.fetched_at.elapsed() >= stale_time
    }
}

pub struct QueryStore {
    entries: RwLock<LruCache<QueryKey, Entry>>,
    stale_time: Duration,
}

impl QueryStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.query_limit_non_zero())),
            stale_time: config.stale_time(),
        }
    }

    /// Fresh value for `key`, promoting it in LRU order.
    pub fn get_fresh(&self, key: &QueryKey) -> Option<CachedValue> {
        let mut entries = rw_write(&self.entries, SOURCE, "get_fresh");
        let entry = entries.get(key)?;
        if entry.is_stale(self.stale_time) {
            return None;
        }
        Some(entry.value.clone())
    }

    /// Stored value regardless of freshness.
    pub fn peek(&self, key: &QueryKey) -> Option<CachedValue> {
        rw_read(&self.entries, SOURCE, "peek")
            .peek(key)
            .map(|entry| entry.value.clone())
    }

    /// `None` when nothing is stored under `key`.
    pub fn is_stale(&self, key: &QueryKey) -> Option<bool> {
        rw_read(&self.entries, SOURCE, "is_stale")
            .peek(key)
            .map(|entry| entry.is_stale(self.stale_time))
    }

    /// Store a fresh value. Returns the key evicted to make room, if any.
    pub fn put(&self, key: QueryKey, value: CachedValue) -> Option<QueryKey> {
        let entry = Entry {
            value,
            fetched_at: Instant::now(),
            invalidated: false,
        };
        let mut entries = rw_write(&self.entries, SOURCE, "put");
        // `push` hands back the replaced entry on update; only a different key is an eviction.
        match entries.push(key.clone(), entry) {
            Some((evicted, _)) if evicted != key => Some(evicted),
            _ => None,
        }
    }

    /// Mark an entry stale. Returns false when the key is absent.
    pub fn mark_stale(&self, key: &QueryKey) -> bool {
        match rw_write(&self.entries, SOURCE, "mark_stale").peek_mut(key) {
            Some(entry) => {
                entry.invalidated = true;
                true
            }
            None => false,
        }
    }

    pub fn clear(&self) {
        rw_write(&self.entries, SOURCE, "clear").clear();
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
