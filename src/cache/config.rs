//! Query cache configuration.
//!
//! Resolved from the `[cache]` section of `pulse.toml`.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_QUERY_LIMIT: usize = 256;
const DEFAULT_CONSUME_BATCH_LIMIT: usize = 100;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Serve reads from the store and publish mutation events.
    pub enabled: bool,
    /// Maximum cached query results before LRU eviction.
    pub query_limit: usize,
    /// How long a stored result counts as fresh.
    pub stale_time_ms: u64,
    /// Maximum events per consumption batch.
    pub consume_batch_limit: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            query_limit: DEFAULT_QUERY_LIMIT,
            stale_time_ms: 0,
            consume_batch_limit: DEFAULT_CONSUME_BATCH_LIMIT,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            query_limit: settings.query_limit.get(),
            stale_time_ms: u64::try_from(settings.stale_time.as_millis()).unwrap_or(u64::MAX),
            consume_batch_limit: settings.consume_batch_limit.get(),
        }
    }
}

impl CacheConfig {
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the query limit as NonZeroUsize, clamping to 1 if zero.
    pub fn query_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.query_limit).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn stale_time(&self) -> Duration {
        Duration::from_millis(self.stale_time_ms)
    }

    /// Batch limit for one consume pass, never below one event.
    pub fn batch_limit(&self) -> usize {
        self.consume_batch_limit.max(1)
    }
}
