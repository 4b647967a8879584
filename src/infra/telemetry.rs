use std::sync::Once;

use metrics::{Unit, describe_counter};
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
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
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

/// Register descriptions for every metric the crate emits. Idempotent.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "wikiweave_include_resolved_total",
            Unit::Count,
            "Total number of pages spliced into a render."
        );
        describe_counter!(
            "wikiweave_include_cycle_total",
            Unit::Count,
            "Total number of inclusions skipped because the page was already an ancestor."
        );
        describe_counter!(
            "wikiweave_include_depth_exceeded_total",
            Unit::Count,
            "Total number of inclusions skipped at the maximum nesting depth."
        );
        describe_counter!(
            "wikiweave_include_page_missing_total",
            Unit::Count,
            "Total number of include targets that did not exist."
        );
        describe_counter!(
            "wikiweave_instruction_cache_hit_total",
            Unit::Count,
            "Total number of instruction cache hits."
        );
        describe_counter!(
            "wikiweave_instruction_cache_miss_total",
            Unit::Count,
            "Total number of instruction cache misses."
        );
        describe_counter!(
            "wikiweave_instruction_cache_evict_total",
            Unit::Count,
            "Total number of instruction cache evictions due to capacity."
        );
    });
}
