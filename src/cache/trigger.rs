//! Publishes mutation events and consumes them on the spot.
//!
//! Called by the query facade after a write has succeeded.

use std::sync::Arc;

use tracing::debug;

use super::config::CacheConfig;
use super::consumer::QueryConsumer;
use super::events::{EventQueue, MutationKind};

pub struct QueryTrigger {
    config: CacheConfig,
    queue: Arc<EventQueue>,
    consumer: Arc<QueryConsumer>,
}

impl QueryTrigger {
    pub fn new(config: CacheConfig, queue: Arc<EventQueue>, consumer: Arc<QueryConsumer>) -> Self {
        Self {
            config,
            queue,
            consumer,
        }
    }

    /// Publish `kind` and consume immediately. No-op with the cache disabled.
    pub fn trigger(&self, kind: MutationKind) {
        if !self.config.is_enabled() {
            debug!(event_kind = kind.as_str(), "cache trigger skipped: cache disabled");
            return;
        }
        self.queue.publish(kind);
        self.consumer.consume_all();
    }

    pub fn post_created(&self, post_id: &str) {
        self.trigger(MutationKind::PostCreated {
            post_id: post_id.to_string(),
        });
    }

    pub fn post_updated(&self, post_id: &str) {
        self.trigger(MutationKind::PostUpdated {
            post_id: post_id.to_string(),
        });
    }

    pub fn post_deleted(&self, post_id: &str) {
        self.trigger(MutationKind::PostDeleted {
            post_id: post_id.to_string(),
        });
    }

    pub fn post_liked(&self, post_id: &str) {
        self.trigger(MutationKind::PostLiked {
            post_id: post_id.to_string(),
        });
    }

    pub fn post_saved(&self, post_id: &str) {
        self.trigger(MutationKind::PostSaved {
            post_id: post_id.to_string(),
        });
    }

    pub fn save_deleted(&self, record_id: &str) {
        self.trigger(MutationKind::SaveDeleted {
            record_id: record_id.to_string(),
        });
    }

    pub fn user_updated(&self, user_id: &str) {
        self.trigger(MutationKind::UserUpdated {
            user_id: user_id.to_string(),
        });
    }

    pub fn follow_changed(&self, follower_id: &str, followed_id: &str) {
        self.trigger(MutationKind::FollowChanged {
            follower_id: follower_id.to_string(),
            followed_id: followed_id.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::keys::QueryKey;
    use crate::cache::registry::QueryRegistry;
    use crate::cache::store::QueryStore;

    fn build(enabled: bool) -> (Arc<QueryStore>, Arc<QueryRegistry>, Arc<EventQueue>, QueryTrigger) {
        let config = CacheConfig {
            enabled,
            stale_time_ms: 60_000,
            ..CacheConfig::default()
        };
        let store = Arc::new(QueryStore::new(&config));
        let registry = Arc::new(QueryRegistry::new());
        let queue = Arc::new(EventQueue::new());
        let consumer = Arc::new(QueryConsumer::new(
            config.clone(),
            store.clone(),
            registry.clone(),
            queue.clone(),
            Arc::new(crate::cache::inflight::InFlight::new()),
        ));
        let trigger = QueryTrigger::new(config, queue.clone(), consumer);
        (store, registry, queue, trigger)
    }

    #[test]
    fn trigger_invalidates_immediately() {
        let (store, registry, queue, trigger) = build(true);
        let key = QueryKey::user_by_id("u1");
        store.put(key.clone(), Arc::new(()));
        registry.register(key.clone());

        trigger.user_updated("u1");
        assert!(queue.is_empty());
        assert_eq!(store.is_stale(&key), Some(true));
    }

    #[test]
    fn disabled_cache_publishes_nothing() {
        let (store, registry, queue, trigger) = build(false);
        let key = QueryKey::all(crate::cache::keys::QueryKind::UserFollowing);
        let stored = QueryKey::user_following("u1");
        store.put(stored.clone(), Arc::new(()));
        registry.register(stored.clone());

        trigger.follow_changed("u1", "u2");
        assert!(queue.is_empty());
        assert_eq!(store.is_stale(&stored), Some(false));
        assert!(key.matches(&stored));
    }
}
