//! Mutation events.
//!
//! Successful writes publish an event; the consumer drains the queue and
//! turns the batch into an invalidation plan.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::util::lock::mutex_lock;

const SOURCE: &str = "cache::events";

/// Monotonic per-process ordering of events.
pub type Epoch = u64;

#[derive(Debug, Clone)]
pub struct MutationEvent {
    /// Idempotency key; the planner ignores repeats.
    pub id: Uuid,
    pub epoch: Epoch,
    pub kind: MutationKind,
    pub timestamp: OffsetDateTime,
}

impl MutationEvent {
    pub fn new(kind: MutationKind, epoch: Epoch) -> Self {
        Self {
            id: Uuid::new_v4(),
            epoch,
            kind,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

/// Writes that affect cached reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationKind {
    PostCreated { post_id: String },
    PostUpdated { post_id: String },
    PostDeleted { post_id: String },
    PostLiked { post_id: String },
    PostSaved { post_id: String },
    SaveDeleted { record_id: String },
    UserUpdated { user_id: String },
    FollowChanged {
        follower_id: String,
        followed_id: String,
    },
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PostCreated { .. } => "post_created",
            Self::PostUpdated { .. } => "post_updated",
            Self::PostDeleted { .. } => "post_deleted",
            Self::PostLiked { .. } => "post_liked",
            Self::PostSaved { .. } => "post_saved",
            Self::SaveDeleted { .. } => "save_deleted",
            Self::UserUpdated { .. } => "user_updated",
            Self::FollowChanged { .. } => "follow_changed",
        }
    }
}

/// In-memory FIFO of pending mutation events.
pub struct EventQueue {
    queue: Mutex<VecDeque<MutationEvent>>,
    epoch_counter: AtomicU64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            epoch_counter: AtomicU64::new(0),
        }
    }

    pub fn next_epoch(&self) -> Epoch {
        self.epoch_counter.fetch_add(1, Ordering::SeqCst)
    }

    pub fn publish(&self, kind: MutationKind) {
        let event = MutationEvent::new(kind, self.next_epoch());
        debug!(
            event_id = %event.id,
            event_epoch = event.epoch,
            event_kind = event.kind.as_str(),
            "mutation event enqueued"
        );
        mutex_lock(&self.queue, SOURCE, "publish").push_back(event);
    }

    /// Drain up to `limit` events in FIFO order.
    pub fn drain(&self, limit: usize) -> Vec<MutationEvent> {
        let mut queue = mutex_lock(&self.queue, SOURCE, "drain");
        let count = limit.min(queue.len());
        queue.drain(..count).collect()
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.queue, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        mutex_lock(&self.queue, SOURCE, "clear").clear();
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn liked(post_id: &str) -> MutationKind {
        MutationKind::PostLiked {
            post_id: post_id.to_string(),
        }
    }

    #[test]
    fn epochs_increase() {
        let queue = EventQueue::new();
        let first = queue.next_epoch();
        let second = queue.next_epoch();
        assert!(first < second);
    }

    #[test]
    fn drain_is_fifo_and_bounded() {
        let queue = EventQueue::new();
        queue.publish(liked("p1"));
        queue.publish(liked("p2"));
        queue.publish(liked("p3"));

        let batch = queue.drain(2);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].kind, liked("p1"));
        assert_eq!(batch[1].kind, liked("p2"));
        assert!(batch[0].epoch < batch[1].epoch);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn drain_more_than_available() {
        let queue = EventQueue::new();
        queue.publish(liked("p1"));
        assert_eq!(queue.drain(10).len(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn clear_discards_pending_events() {
        let queue = EventQueue::new();
        queue.publish(liked("p1"));
        queue.clear();
        assert!(queue.drain(10).is_empty());
    }
}
