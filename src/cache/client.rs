//! Cached, deduplicated reads.
//!
//! `QueryClient::fetch` serves a fresh stored result when there is one and
//! otherwise runs the fetcher. Concurrent fetches of the same key share a
//! single in-flight future. Failures are returned to every waiter and never
//! stored.

use std::future::Future;
use std::sync::Arc;

use futures::future::FutureExt;
use metrics::counter;
use tracing::{debug, error, info};

use crate::application::error::ApiError;

use super::config::CacheConfig;
use super::consumer::QueryConsumer;
use super::events::EventQueue;
use super::inflight::{InFlight, Slot};
use super::keys::QueryKey;
use super::registry::QueryRegistry;
use super::store::{CachedValue, QueryStore};
use super::trigger::QueryTrigger;

const METRIC_CACHE_HIT: &str = "pulse_query_cache_hit_total";
const METRIC_CACHE_MISS: &str = "pulse_query_cache_miss_total";
const METRIC_CACHE_EVICT: &str = "pulse_query_cache_evict_total";
const METRIC_QUERY_DEDUP: &str = "pulse_query_dedup_total";

/// Outcome of a read.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryState<T> {
    /// A required identifier was empty; nothing was fetched.
    Disabled,
    Ready(T),
}

impl<T> QueryState<T> {
    pub fn is_disabled(&self) -> bool {
        matches!(self, Self::Disabled)
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Disabled => None,
            Self::Ready(value) => Some(value),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> QueryState<U> {
        match self {
            Self::Disabled => QueryState::Disabled,
            Self::Ready(value) => QueryState::Ready(f(value)),
        }
    }
}

/// Owns the store, the invalidation pipeline and the in-flight table.
pub struct QueryClient {
    config: CacheConfig,
    store: Arc<QueryStore>,
    registry: Arc<QueryRegistry>,
    queue: Arc<EventQueue>,
    trigger: QueryTrigger,
    in_flight: Arc<InFlight>,
}

impl QueryClient {
    pub fn new(config: CacheConfig) -> Self {
        let store = Arc::new(QueryStore::new(&config));
        let registry = Arc::new(QueryRegistry::new());
        let queue = Arc::new(EventQueue::new());
        let in_flight = Arc::new(InFlight::new());
        let consumer = Arc::new(QueryConsumer::new(
            config.clone(),
            store.clone(),
            registry.clone(),
            queue.clone(),
            in_flight.clone(),
        ));
        let trigger = QueryTrigger::new(config.clone(), queue.clone(), consumer);

        Self {
            config,
            store,
            registry,
            queue,
            trigger,
            in_flight,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn trigger(&self) -> &QueryTrigger {
        &self.trigger
    }

    /// Read `key`, fetching only when no fresh result is stored.
    pub async fn fetch<T, F, Fut>(
        &self,
        key: QueryKey,
        enabled: bool,
        fetcher: F,
    ) -> Result<QueryState<T>, ApiError>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        if !enabled {
            debug!(key = %key, "query disabled");
            return Ok(QueryState::Disabled);
        }
        if !self.config.is_enabled() {
            return fetcher().await.map(QueryState::Ready);
        }

        let kind = key.kind.as_str();
        if let Some(value) = self.store.get_fresh(&key) {
            counter!(METRIC_CACHE_HIT, "kind" => kind).increment(1);
            debug!(key = %key, "query cache hit");
            return downcast(&key, value).map(QueryState::Ready);
        }
        counter!(METRIC_CACHE_MISS, "kind" => kind).increment(1);

        let shared = match self.in_flight.join_or_start(&key, || {
            let fut = fetcher();
            async move { fut.await.map(|value| Arc::new(value) as CachedValue) }
                .boxed()
                .shared()
        }) {
            Slot::Started(shared) => shared,
            Slot::Joined(shared) => {
                counter!(METRIC_QUERY_DEDUP, "kind" => kind).increment(1);
                debug!(key = %key, "joined in-flight query");
                shared
            }
        };

        let result = shared.clone().await;
        // The first waiter to finish retires the in-flight entry and stores the result.
        self.in_flight.retire(&key, &shared, |invalidated| {
            if let Ok(value) = &result {
                self.remember(key.clone(), value.clone());
                if invalidated {
                    self.store.mark_stale(&key);
                    debug!(key = %key, "stored result was invalidated while fetching");
                }
            }
        });

        downcast(&key, result?).map(QueryState::Ready)
    }

    /// `None` when nothing is stored under `key`.
    pub fn is_stale(&self, key: &QueryKey) -> Option<bool> {
        self.store.is_stale(key)
    }

    pub fn cached_len(&self) -> usize {
        self.store.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// Drop every stored result and pending event.
    pub fn clear(&self) {
        let dropped = self.store.len();
        self.store.clear();
        self.registry.clear();
        self.queue.clear();
        self.in_flight.clear();
        info!(dropped, "query cache cleared");
    }

    fn remember(&self, key: QueryKey, value: CachedValue) {
        self.registry.register(key.clone());
        if let Some(evicted) = self.store.put(key, value) {
            self.registry.unregister(&evicted);
            counter!(METRIC_CACHE_EVICT, "kind" => evicted.kind.as_str()).increment(1);
            debug!(key = %evicted, "query cache evicted");
        }
    }
}

fn downcast<T: Clone + 'static>(key: &QueryKey, value: CachedValue) -> Result<T, ApiError> {
    value.downcast_ref::<T>().cloned().ok_or_else(|| {
        error!(key = %key, "cached value has an unexpected type");
        ApiError::Malformed(format!("cached value for {key} has an unexpected type"))
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use futures::future::BoxFuture;

    use super::*;

    fn client(stale_time_ms: u64) -> QueryClient {
        QueryClient::new(CacheConfig {
            stale_time_ms,
            ..CacheConfig::default()
        })
    }

    fn counting(
        calls: &Arc<AtomicUsize>,
        value: &str,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<String, ApiError>> + use<> {
        let calls = calls.clone();
        let value = value.to_string();
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(value)
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn disabled_query_never_fetches() -> Result<(), ApiError> {
        let client = client(60_000);
        let calls = Arc::new(AtomicUsize::new(0));
        let state = client
            .fetch(QueryKey::user_by_id(""), false, counting(&calls, "x"))
            .await?;
        assert_eq!(state, QueryState::Disabled);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn fresh_result_is_served_from_cache() -> Result<(), ApiError> {
        let client = client(60_000);
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::post_by_id("p1");

        let first = client.fetch(key.clone(), true, counting(&calls, "one")).await?;
        let second = client.fetch(key.clone(), true, counting(&calls, "two")).await?;
        assert_eq!(first, QueryState::Ready("one".to_string()));
        assert_eq!(second, QueryState::Ready("one".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn stale_result_is_refetched() -> Result<(), ApiError> {
        let client = client(0);
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::current_user();

        client.fetch(key.clone(), true, counting(&calls, "one")).await?;
        let second = client.fetch(key.clone(), true, counting(&calls, "two")).await?;
        assert_eq!(second, QueryState::Ready("two".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_fetches_share_one_call() -> Result<(), ApiError> {
        let client = client(0);
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::recent_posts();

        let (a, b) = tokio::join!(
            client.fetch(key.clone(), true, counting(&calls, "shared")),
            client.fetch(key.clone(), true, counting(&calls, "other")),
        );
        assert_eq!(a?, QueryState::Ready("shared".to_string()));
        assert_eq!(b?, QueryState::Ready("shared".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.in_flight_len(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn errors_are_not_cached() -> Result<(), ApiError> {
        let client = client(60_000);
        let key = QueryKey::post_by_id("p1");

        let failed: Result<QueryState<String>, ApiError> = client
            .fetch(key.clone(), true, || async {
                Err(ApiError::Unavailable("offline".to_string()))
            })
            .await;
        assert_eq!(failed, Err(ApiError::Unavailable("offline".to_string())));
        assert_eq!(client.is_stale(&key), None);

        let calls = Arc::new(AtomicUsize::new(0));
        let retried = client.fetch(key, true, counting(&calls, "ok")).await?;
        assert_eq!(retried, QueryState::Ready("ok".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn disabled_cache_always_fetches() -> Result<(), ApiError> {
        let client = QueryClient::new(CacheConfig {
            enabled: false,
            stale_time_ms: 60_000,
            ..CacheConfig::default()
        });
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::users(10);

        client.fetch(key.clone(), true, counting(&calls, "a")).await?;
        client.fetch(key, true, counting(&calls, "b")).await?;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(client.cached_len(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn clear_forgets_everything() -> Result<(), ApiError> {
        let client = client(60_000);
        let calls = Arc::new(AtomicUsize::new(0));
        client
            .fetch(QueryKey::current_user(), true, counting(&calls, "me"))
            .await?;
        assert_eq!(client.cached_len(), 1);

        client.clear();
        assert_eq!(client.cached_len(), 0);
        assert_eq!(client.is_stale(&QueryKey::current_user()), None);
        Ok(())
    }

    #[tokio::test]
    async fn mutation_trigger_marks_entries_stale() -> Result<(), ApiError> {
        let client = client(60_000);
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::post_by_id("p1");
        client.fetch(key.clone(), true, counting(&calls, "v1")).await?;

        client.trigger().post_updated("p1");
        assert_eq!(client.is_stale(&key), Some(true));

        let refreshed = client.fetch(key.clone(), true, counting(&calls, "v2")).await?;
        assert_eq!(refreshed, QueryState::Ready("v2".to_string()));
        assert_eq!(client.is_stale(&key), Some(false));
        Ok(())
    }

    #[tokio::test]
    async fn mutation_during_fetch_stores_result_stale() -> Result<(), ApiError> {
        let client = client(60_000);
        let key = QueryKey::post_by_id("p1");
        let (release, released) = tokio::sync::oneshot::channel::<()>();

        let (fetched, ()) = tokio::join!(
            client.fetch(key.clone(), true, move || async move {
                let _ = released.await;
                Ok::<_, ApiError>("before".to_string())
            }),
            async {
                client.trigger().post_updated("p1");
                let _ = release.send(());
            },
        );
        assert_eq!(fetched?, QueryState::Ready("before".to_string()));
        assert_eq!(client.is_stale(&key), Some(true));
        assert_eq!(client.in_flight_len(), 0);

        let calls = Arc::new(AtomicUsize::new(0));
        let refreshed = client.fetch(key.clone(), true, counting(&calls, "after")).await?;
        assert_eq!(refreshed, QueryState::Ready("after".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.is_stale(&key), Some(false));
        Ok(())
    }

    #[tokio::test]
    async fn unrelated_mutation_during_fetch_keeps_result_fresh() -> Result<(), ApiError> {
        let client = client(60_000);
        let key = QueryKey::post_by_id("p1");
        let (release, released) = tokio::sync::oneshot::channel::<()>();

        let (fetched, ()) = tokio::join!(
            client.fetch(key.clone(), true, move || async move {
                let _ = released.await;
                Ok::<_, ApiError>("v1".to_string())
            }),
            async {
                client.trigger().post_updated("p2");
                let _ = release.send(());
            },
        );
        fetched?;
        assert_eq!(client.is_stale(&key), Some(false));
        Ok(())
    }

    #[test]
    fn query_state_helpers() {
        let ready = QueryState::Ready(2);
        assert_eq!(ready.clone().map(|n| n * 2), QueryState::Ready(4));
        assert_eq!(ready.into_option(), Some(2));
        assert!(QueryState::<u8>::Disabled.is_disabled());
    }
}
