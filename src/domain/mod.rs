//! Domain layer - Core cache entities and traits

pub mod embedding;
pub mod error;
pub mod semantic_cache;

pub use embedding::{EmbeddingProvider, EmbeddingRequest, EmbeddingResponse};
pub use error::DomainError;
pub use semantic_cache::{
    CacheEntry, CacheHit, CacheMetrics, CacheStats, CacheStoreRequest, SemanticCacheConfig,
    VectorIndex,
};
