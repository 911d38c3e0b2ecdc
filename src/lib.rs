//! Semantic response cache
//!
//! Caches generated answers keyed by the meaning of the question:
//! - Embedding-based lookup with a configurable similarity threshold
//! - TTL and age-based invalidation
//! - Capacity-bounded storage, evicting the oldest entry first
//! - Snapshot persistence to a binary index file and a JSON Lines entry table

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use std::sync::Arc;

use domain::DomainError;
use infrastructure::embedding::build_embedding_provider;
use infrastructure::semantic_cache::FileSnapshotStore;
use infrastructure::services::SemanticCacheService;

/// Build a file-backed cache service from application configuration
pub fn build_cache_service(config: &AppConfig) -> Result<SemanticCacheService, DomainError> {
    let embedding_provider = build_embedding_provider(&config.embedding)?;
    let persistence = Arc::new(FileSnapshotStore::new(
        &config.cache.index_path,
        &config.cache.store_path,
    ));

    SemanticCacheService::new(config.cache.clone(), embedding_provider, persistence)
}
