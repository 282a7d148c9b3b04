use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
///
/// Logs go to stderr so command output on stdout stays machine readable.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "pulse_query_cache_hit_total",
            Unit::Count,
            "Reads served from a fresh cached entry."
        );
        describe_counter!(
            "pulse_query_cache_miss_total",
            Unit::Count,
            "Reads that had to fetch because the entry was missing or stale."
        );
        describe_counter!(
            "pulse_query_cache_evict_total",
            Unit::Count,
            "Cached queries evicted due to capacity."
        );
        describe_counter!(
            "pulse_query_dedup_total",
            Unit::Count,
            "Reads that joined an in-flight fetch for the same key."
        );
        describe_counter!(
            "pulse_query_invalidated_total",
            Unit::Count,
            "Cached queries marked stale by mutations."
        );
        describe_histogram!(
            "pulse_cache_consume_ms",
            Unit::Milliseconds,
            "Mutation event consumption latency in milliseconds."
        );
    });
}
