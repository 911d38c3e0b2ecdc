//! Hit/miss accounting and cache statistics

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Running lookup counters for one cache lifetime
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheMetrics {
    pub total_queries: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub hit_rate: f32,
    /// Running mean of the similarity of every hit so far
    pub avg_similarity_on_hit: f32,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_miss(&mut self) {
        self.total_queries += 1;
        self.cache_misses += 1;
        self.refresh_hit_rate();
    }

    pub fn record_hit(&mut self, similarity: f32) {
        self.total_queries += 1;

        let hits = self.cache_hits + 1;
        self.avg_similarity_on_hit =
            (self.avg_similarity_on_hit * (hits - 1) as f32 + similarity) / hits as f32;
        self.cache_hits = hits;

        self.refresh_hit_rate();
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn refresh_hit_rate(&mut self) {
        self.hit_rate = if self.total_queries == 0 {
            0.0
        } else {
            self.cache_hits as f32 / self.total_queries as f32
        };
    }
}

/// Read-only view of cache contents, counters and effective configuration
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub index_size: usize,
    /// Entries past the TTL that still occupy capacity
    pub expired_entries: usize,
    pub evictions: u64,
    pub oldest_entry: Option<DateTime<Utc>>,
    pub newest_entry: Option<DateTime<Utc>>,
    pub metrics: CacheMetrics,
    pub config: CacheStatsConfig,
}

/// Configuration echoed in [`CacheStats`]
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatsConfig {
    pub model_name: String,
    pub similarity_threshold: f32,
    pub max_cache_size: usize,
    pub ttl_hours: u64,
    pub retain_embeddings: bool,
    pub index_path: PathBuf,
    pub store_path: PathBuf,
}
