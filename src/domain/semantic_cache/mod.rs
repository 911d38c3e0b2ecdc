//! Semantic cache domain models and traits
//!
//! Matches incoming queries against previously answered ones by embedding
//! similarity rather than exact key equality.

mod config;
mod entry;
mod index;
mod metrics;
mod persistence;
mod store;

pub use config::SemanticCacheConfig;
pub use entry::{
    entry_id_for, hash_query, CacheEntry, CacheHit, CacheStoreRequest, CachedQuery,
    CachedResponse, TokenUsage,
};
pub use index::{IndexMatch, IndexSnapshot, VectorIndex};
pub use metrics::{CacheMetrics, CacheStats, CacheStatsConfig};
pub use persistence::{CacheSnapshot, CacheSnapshotStore};
pub use store::EntryStore;
