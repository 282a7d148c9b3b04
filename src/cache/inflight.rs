//! Fetches that have started but not yet been stored.
//!
//! The consumer flags matching entries here as well as in the store, so a
//! result that was fetched before a mutation landed is stored already stale.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::{BoxFuture, Shared};

use crate::application::error::ApiError;

use super::keys::QueryKey;
use super::store::CachedValue;

pub type SharedFetch = Shared<BoxFuture<'static, Result<CachedValue, ApiError>>>;

struct Pending {
    fetch: SharedFetch,
    invalidated: AtomicBool,
}

/// Whether a caller started the fetch or joined one already running.
pub enum Slot {
    Started(SharedFetch),
    Joined(SharedFetch),
}

#[derive(Default)]
pub struct InFlight {
    entries: DashMap<QueryKey, Arc<Pending>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the running fetch for `key`, or start one with `start`.
    pub fn join_or_start(&self, key: &QueryKey, start: impl FnOnce() -> SharedFetch) -> Slot {
        match self.entries.entry(key.clone()) {
            Entry::Occupied(pending) => Slot::Joined(pending.get().fetch.clone()),
            Entry::Vacant(slot) => {
                let fetch = start();
                slot.insert(Arc::new(Pending {
                    fetch: fetch.clone(),
                    invalidated: AtomicBool::new(false),
                }));
                Slot::Started(fetch)
            }
        }
    }

    /// Flag every running fetch matched by `target`. Returns how many were flagged.
    pub fn invalidate_matching(&self, target: &QueryKey) -> usize {
        let mut flagged = 0;
        for pending in self.entries.iter() {
            if target.matches(pending.key()) {
                pending.invalidated.store(true, Ordering::SeqCst);
                flagged += 1;
            }
        }
        flagged
    }

    /// Remove `fetch` if it is still the entry for `key`, running `on_retire`
    /// with its invalidated flag while the entry is held.
    ///
    /// Returns false when another waiter already retired it or the table was
    /// cleared in the meantime.
    pub fn retire(
        &self,
        key: &QueryKey,
        fetch: &SharedFetch,
        on_retire: impl FnOnce(bool),
    ) -> bool {
        self.entries
            .remove_if(key, |_, pending| {
                if !pending.fetch.ptr_eq(fetch) {
                    return false;
                }
                on_retire(pending.invalidated.load(Ordering::SeqCst));
                true
            })
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use futures::FutureExt;

    use super::*;

    fn ready(text: &str) -> SharedFetch {
        let value: CachedValue = Arc::new(text.to_string());
        async move { Ok::<_, ApiError>(value) }.boxed().shared()
    }

    #[test]
    fn second_caller_joins_the_first_fetch() {
        let table = InFlight::new();
        let key = QueryKey::post_by_id("p1");

        let first = match table.join_or_start(&key, || ready("a")) {
            Slot::Started(fetch) => fetch,
            Slot::Joined(_) => panic!("empty table should start a fetch"),
        };
        match table.join_or_start(&key, || ready("b")) {
            Slot::Joined(fetch) => assert!(fetch.ptr_eq(&first)),
            Slot::Started(_) => panic!("running fetch should be joined"),
        }
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn retire_reports_invalidation_once() {
        let table = InFlight::new();
        let key = QueryKey::home_feed("u1", 1, 10);
        let Slot::Started(fetch) = table.join_or_start(&key, || ready("a")) else {
            panic!("empty table should start a fetch");
        };

        assert_eq!(table.invalidate_matching(&QueryKey::all(key.kind)), 1);
        assert_eq!(table.invalidate_matching(&QueryKey::current_user()), 0);

        let mut seen = None;
        assert!(table.retire(&key, &fetch, |invalidated| seen = Some(invalidated)));
        assert_eq!(seen, Some(true));
        assert!(!table.retire(&key, &fetch, |_| panic!("already retired")));
        assert!(table.is_empty());
    }

    #[test]
    fn cleared_fetch_is_not_retired() {
        let table = InFlight::new();
        let key = QueryKey::current_user();
        let Slot::Started(fetch) = table.join_or_start(&key, || ready("me")) else {
            panic!("empty table should start a fetch");
        };
        table.clear();
        assert!(!table.retire(&key, &fetch, |_| panic!("cleared")));
    }
}
