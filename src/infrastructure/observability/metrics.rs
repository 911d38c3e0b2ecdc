//! Prometheus metrics infrastructure

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::domain::semantic_cache::CacheStats;

/// Why a lookup ended the way it did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupOutcome {
    Hit,
    EmptyCache,
    NoCandidate,
    BelowThreshold,
    Expired,
}

impl LookupOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            LookupOutcome::Hit => "hit",
            LookupOutcome::EmptyCache => "empty_cache",
            LookupOutcome::NoCandidate => "no_candidate",
            LookupOutcome::BelowThreshold => "below_threshold",
            LookupOutcome::Expired => "expired",
        }
    }
}

/// Install a Prometheus recorder for this process
pub fn init_metrics() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            gauge!("semantic_cache_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
            Some(handle)
        }
        Err(e) => {
            tracing::error!("Failed to initialize Prometheus metrics: {}", e);
            None
        }
    }
}

/// Record a cache lookup
pub fn record_cache_lookup(outcome: LookupOutcome) {
    counter!("semantic_cache_lookups_total", "outcome" => outcome.as_str()).increment(1);
}

/// Record a stored entry
pub fn record_cache_store() {
    counter!("semantic_cache_stores_total").increment(1);
}

/// Record a capacity eviction
pub fn record_cache_eviction() {
    counter!("semantic_cache_evictions_total").increment(1);
}

/// Record entries removed by an age sweep
pub fn record_cache_sweep(removed: usize) {
    counter!("semantic_cache_swept_entries_total").increment(removed as u64);
}

/// Publish a stats snapshot as gauges
pub fn publish_cache_gauges(stats: &CacheStats) {
    gauge!("semantic_cache_entries").set(stats.total_entries as f64);
    gauge!("semantic_cache_expired_entries").set(stats.expired_entries as f64);
    gauge!("semantic_cache_capacity").set(stats.config.max_cache_size as f64);
    gauge!("semantic_cache_queries").set(stats.metrics.total_queries as f64);
    gauge!("semantic_cache_hits").set(stats.metrics.cache_hits as f64);
    gauge!("semantic_cache_misses").set(stats.metrics.cache_misses as f64);
    gauge!("semantic_cache_hit_rate").set(stats.metrics.hit_rate as f64);
    gauge!("semantic_cache_avg_similarity_on_hit").set(stats.metrics.avg_similarity_on_hit as f64);
}
