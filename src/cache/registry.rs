//! Index of stored query keys by kind.
//!
//! Lets the consumer resolve a kind-wide invalidation target to the concrete
//! keys currently held by the store.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use crate::util::lock::{rw_read, rw_write};

use super::keys::{QueryKey, QueryKind};

const SOURCE: &str = "cache::registry";

pub struct QueryRegistry {
    by_kind: RwLock<HashMap<QueryKind, HashSet<QueryKey>>>,
}

impl QueryRegistry {
    pub fn new() -> Self {
        Self {
            by_kind: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, key: QueryKey) {
        rw_write(&self.by_kind, SOURCE, "register")
            .entry(key.kind)
            .or_default()
            .insert(key);
    }

    /// Stored keys covered by `target`.
    pub fn keys_matching(&self, target: &QueryKey) -> Vec<QueryKey> {
        rw_read(&self.by_kind, SOURCE, "keys_matching")
            .get(&target.kind)
            .map(|keys| keys.iter().filter(|key| target.matches(key)).cloned().collect())
            .unwrap_or_default()
    }

    /// Called when the store evicts or drops an entry.
    pub fn unregister(&self, key: &QueryKey) {
        let mut by_kind = rw_write(&self.by_kind, SOURCE, "unregister");
        if let Some(keys) = by_kind.get_mut(&key.kind) {
            keys.remove(key);
            if keys.is_empty() {
                by_kind.remove(&key.kind);
            }
        }
    }

    pub fn clear(&self) {
        rw_write(&self.by_kind, SOURCE, "clear").clear();
    }

    pub fn key_count(&self) -> usize {
        rw_read(&self.by_kind, SOURCE, "key_count")
            .values()
            .map(HashSet::len)
            .sum()
    }

    pub fn kind_count(&self) -> usize {
        rw_read(&self.by_kind, SOURCE, "kind_count").len()
    }
}

impl Default for QueryRegistry {
    fn default() -> Self {
        Self::new()
    }
}
