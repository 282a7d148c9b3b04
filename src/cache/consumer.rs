//! Applies invalidation plans to the query store.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::config::CacheConfig;
use super::events::EventQueue;
use super::inflight::InFlight;
use super::planner::InvalidationPlan;
use super::registry::QueryRegistry;
use super::store::QueryStore;

const METRIC_CACHE_CONSUME_MS: &str = "pulse_cache_consume_ms";
const METRIC_QUERY_INVALIDATED: &str = "pulse_query_invalidated_total";

/// Drains the event queue, plans, and marks matching entries stale.
pub struct QueryConsumer {
    config: CacheConfig,
    store: Arc<QueryStore>,
    registry: Arc<QueryRegistry>,
    queue: Arc<EventQueue>,
    in_flight: Arc<InFlight>,
}

impl QueryConsumer {
    pub fn new(
        config: CacheConfig,
        store: Arc<QueryStore>,
        registry: Arc<QueryRegistry>,
        queue: Arc<EventQueue>,
        in_flight: Arc<InFlight>,
    ) -> Self {
        Self {
            config,
            store,
            registry,
            queue,
            in_flight,
        }
    }

    /// Consume one batch of pending events.
    ///
    /// Returns true if any events were processed.
    #[instrument(skip(self))]
    pub fn consume(&self) -> bool {
        let started_at = Instant::now();
        let events = self.queue.drain(self.config.batch_limit());
        if events.is_empty() {
            return false;
        }

        let event_ids: Vec<Uuid> = events.iter().map(|event| event.id).collect();
        let plan = InvalidationPlan::from_events(events);
        debug!(event_ids = ?event_ids, plan = %plan, "cache consumption starting");

        let invalidated = self.apply(&plan);

        info!(
            event_count = plan.event_count,
            targets = plan.targets.len(),
            invalidated,
            "cache consumption complete"
        );
        histogram!(METRIC_CACHE_CONSUME_MS, "mode" => "invalidate")
            .record(started_at.elapsed().as_secs_f64() * 1000.0);
        true
    }

    /// Drain the queue completely, batch by batch.
    pub fn consume_all(&self) -> usize {
        let mut batches = 0;
        while self.consume() {
            batches += 1;
        }
        batches
    }

    fn apply(&self, plan: &InvalidationPlan) -> usize {
        let mut invalidated = 0;
        for target in &plan.targets {
            // Running fetches first: one that stores after this point is already covered.
            let pending = self.in_flight.invalidate_matching(target);
            if pending > 0 {
                debug!(target = %target, pending, "flagged in-flight queries");
            }
            for key in self.registry.keys_matching(target) {
                if self.store.mark_stale(&key) {
                    invalidated += 1;
                    counter!(METRIC_QUERY_INVALIDATED, "kind" => key.kind.as_str()).increment(1);
                } else {
                    // evicted without the registry hearing about it
                    self.registry.unregister(&key);
                }
            }
        }
        invalidated
    }
}
