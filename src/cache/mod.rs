//! Query cache.
//!
//! Reads are keyed by [`QueryKey`] and served from an LRU store while fresh.
//! Successful writes publish a [`MutationKind`] event; the consumer merges
//! pending events into an [`InvalidationPlan`] and marks every matching entry
//! stale so the next read refetches. Fetches still running when an event is
//! consumed store their result already stale.
//!
//! ```toml
//! [cache]
//! enabled = true
//! query_limit = 256
//! stale_time_ms = 0
//! ```

mod client;
mod config;
mod consumer;
mod events;
mod infinite;
mod inflight;
mod keys;
mod planner;
pub mod queries;
mod registry;
mod store;
mod trigger;

pub use client::{QueryClient, QueryState};
pub use config::CacheConfig;
pub use consumer::QueryConsumer;
pub use events::{Epoch, EventQueue, MutationEvent, MutationKind};
pub use infinite::InfiniteQuery;
pub use inflight::{InFlight, SharedFetch, Slot};
pub use keys::{QueryKey, QueryKind};
pub use planner::{InvalidationPlan, targets_for};
pub use queries::Queries;
pub use registry::QueryRegistry;
pub use store::{CachedValue, QueryStore};
pub use trigger::QueryTrigger;
