//! Observability infrastructure - Metrics

mod metrics;

pub use metrics::{
    init_metrics, publish_cache_gauges, record_cache_eviction, record_cache_lookup,
    record_cache_store, record_cache_sweep, LookupOutcome,
};
