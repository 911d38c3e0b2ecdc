//! Semantic cache configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// Configuration for the semantic cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticCacheConfig {
    /// Where the binary vector index snapshot is written
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,

    /// Where the tabular entry records are written
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    /// Embedding model name, forwarded to the embedding provider
    #[serde(default = "default_model_name")]
    pub model_name: String,

    /// Similarity threshold for cache hits (0.0 to 1.0)
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Maximum number of entries to keep
    #[serde(default = "default_max_cache_size")]
    pub max_cache_size: usize,

    /// Age in hours after which an entry no longer answers lookups
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u64,

    /// Keep each entry's vector in memory and on disk.
    ///
    /// Off: rebuilds after eviction or sweeps re-embed every survivor.
    /// On: rebuilds reuse the stored vectors at the cost of larger snapshots.
    #[serde(default)]
    pub retain_embeddings: bool,
}

fn default_index_path() -> PathBuf {
    PathBuf::from("data/semantic_cache/index.bin")
}

fn default_store_path() -> PathBuf {
    PathBuf::from("data/semantic_cache/entries.jsonl")
}

fn default_model_name() -> String {
    "all-MiniLM-L6-v2".to_string()
}

fn default_similarity_threshold() -> f32 {
    0.9
}

fn default_max_cache_size() -> usize {
    1000
}

fn default_ttl_hours() -> u64 {
    24
}

impl Default for SemanticCacheConfig {
    fn default() -> Self {
        Self {
            index_path: default_index_path(),
            store_path: default_store_path(),
            model_name: default_model_name(),
            similarity_threshold: default_similarity_threshold(),
            max_cache_size: default_max_cache_size(),
            ttl_hours: default_ttl_hours(),
            retain_embeddings: false,
        }
    }
}

impl SemanticCacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set both persistence paths
    pub fn with_paths(mut self, index_path: impl Into<PathBuf>, store_path: impl Into<PathBuf>) -> Self {
        self.index_path = index_path.into();
        self.store_path = store_path.into();
        self
    }

    pub fn with_model_name(mut self, model: impl Into<String>) -> Self {
        self.model_name = model.into();
        self
    }

    /// Set the similarity threshold, clamped to [0, 1]
    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn with_max_cache_size(mut self, max: usize) -> Self {
        self.max_cache_size = max;
        self
    }

    pub fn with_ttl_hours(mut self, hours: u64) -> Self {
        self.ttl_hours = hours;
        self
    }

    pub fn with_retain_embeddings(mut self, retain: bool) -> Self {
        self.retain_embeddings = retain;
        self
    }

    /// Reject values the cache cannot operate with
    pub fn validate(&self) -> Result<(), DomainError> {
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(DomainError::configuration(format!(
                "similarity_threshold must be within [0, 1], got {}",
                self.similarity_threshold
            )));
        }

        if self.max_cache_size == 0 {
            return Err(DomainError::configuration(
                "max_cache_size must be a positive integer",
            ));
        }

        if self.ttl_hours == 0 {
            return Err(DomainError::configuration(
                "ttl_hours must be a positive integer",
            ));
        }

        if self.model_name.trim().is_empty() {
            return Err(DomainError::configuration("model_name must not be empty"));
        }

        if self.index_path == self.store_path {
            return Err(DomainError::configuration(
                "index_path and store_path must point to different files",
            ));
        }

        Ok(())
    }
}
