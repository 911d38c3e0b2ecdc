//! Semantic response caching service
//!
//! Sits in front of an expensive generation step: callers look a query up
//! before generating and store the answer after a miss. Lookups match by
//! embedding similarity, so a rephrased question can reuse an earlier answer.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::domain::embedding::{l2_normalize, EmbeddingProvider, EmbeddingRequest};
use crate::domain::semantic_cache::{
    entry_id_for, CacheEntry, CacheHit, CacheMetrics, CacheSnapshot, CacheSnapshotStore,
    CacheStats, CacheStatsConfig, CacheStoreRequest, EntryStore, SemanticCacheConfig, VectorIndex,
};
use crate::domain::DomainError;
use crate::infrastructure::observability::{
    record_cache_eviction, record_cache_lookup, record_cache_store, record_cache_sweep,
    LookupOutcome,
};
use crate::infrastructure::semantic_cache::FlatInnerProductIndex;

/// Everything guarded by the service lock.
///
/// `store` position `n` always pairs with `index` ordinal `n`.
#[derive(Debug)]
struct CacheState {
    store: EntryStore,
    index: Box<dyn VectorIndex>,
    metrics: CacheMetrics,
    evictions: u64,
}

impl CacheState {
    fn empty(template: &dyn VectorIndex) -> Self {
        Self {
            store: EntryStore::new(),
            index: template.fresh(),
            metrics: CacheMetrics::new(),
            evictions: 0,
        }
    }

    fn snapshot(&self) -> CacheSnapshot {
        CacheSnapshot::new(self.store.entries().to_vec(), self.index.snapshot())
    }

    fn record_miss(&mut self, outcome: LookupOutcome) -> Option<CacheHit> {
        self.metrics.record_miss();
        record_cache_lookup(outcome);
        None
    }
}

/// Semantic cache manager owning the entry store, vector index, metrics and
/// persistence.
///
/// Mutations hold the write lock for their whole duration, including any
/// index rebuild and the snapshot write. Lookups embed the query before
/// taking the lock.
#[derive(Debug)]
pub struct SemanticCacheService {
    state: RwLock<CacheState>,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    persistence: Arc<dyn CacheSnapshotStore>,
    config: SemanticCacheConfig,
}

impl SemanticCacheService {
    /// Create a service backed by a flat inner-product index, restoring any
    /// previously saved snapshot
    pub fn new(
        config: SemanticCacheConfig,
        embedding_provider: Arc<dyn EmbeddingProvider>,
        persistence: Arc<dyn CacheSnapshotStore>,
    ) -> Result<Self, DomainError> {
        Self::with_index(
            config,
            embedding_provider,
            persistence,
            Box::new(FlatInnerProductIndex::new()),
        )
    }

    /// Create a service with a custom (empty) vector index implementation
    pub fn with_index(
        config: SemanticCacheConfig,
        embedding_provider: Arc<dyn EmbeddingProvider>,
        persistence: Arc<dyn CacheSnapshotStore>,
        index: Box<dyn VectorIndex>,
    ) -> Result<Self, DomainError> {
        config.validate()?;

        if index.count() != 0 {
            return Err(DomainError::configuration(
                "vector index must be empty when the cache is constructed",
            ));
        }

        let expected_dimension = embedding_provider.dimensions(&config.model_name);
        let state = Self::restore_state(
            &config,
            persistence.as_ref(),
            index.as_ref(),
            expected_dimension,
        );

        Ok(Self {
            state: RwLock::new(state),
            embedding_provider,
            persistence,
            config,
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &SemanticCacheConfig {
        &self.config
    }

    /// Store a response for a query and return the new entry id.
    ///
    /// If this pushes the cache past capacity, the entry with the earliest
    /// creation time is evicted and the index rebuilt from the survivors.
    /// Nothing is committed unless every embedding succeeds.
    pub async fn store(&self, request: CacheStoreRequest) -> Result<String, DomainError> {
        let vector = self.embed(&request.query_text).await?;

        let mut state = self.state.write().await;
        let now = Utc::now();
        let (mut query, response) = request.into_parts(now);

        let entry_id = unique_entry_id(&state.store, &entry_id_for(&query.query_hash, now));

        if self.config.retain_embeddings {
            query.embedding = Some(vector.clone());
        }

        let entry = CacheEntry::new(entry_id.clone(), query, response);

        if state.store.len() < self.config.max_cache_size {
            state.index.add(vector)?;
            state.store.push(entry);
        } else {
            let mut candidates = EntryStore::from_entries(state.store.entries().to_vec());
            candidates.push(entry);

            let victim = candidates
                .oldest_position()
                .ok_or_else(|| DomainError::internal("eviction on an empty cache"))?;
            let evicted = candidates.remove(victim);
            let survivors = candidates.into_entries();

            let pending = Some((entry_id.as_str(), vector.as_slice()));
            let index = self
                .rebuild_index(state.index.as_ref(), &survivors, pending)
                .await?;

            state.store = EntryStore::from_entries(survivors);
            state.index = index;
            state.evictions += 1;
            record_cache_eviction();

            debug!(
                evicted = evicted.entry_id(),
                created_at = %evicted.created_at(),
                "Evicted oldest semantic cache entry"
            );
        }

        record_cache_store();
        debug!(entry_id = %entry_id, entries = state.store.len(), "Stored semantic cache entry");

        self.persist(&state);

        Ok(entry_id)
    }

    /// Look up a cached response for a semantically similar query.
    ///
    /// `similarity_threshold` overrides the configured threshold for this
    /// call only; it is clamped to `[0, 1]` and must be finite. Expired entries produce a miss but stay in place until a
    /// sweep.
    pub async fn get(
        &self,
        query_text: &str,
        similarity_threshold: Option<f32>,
    ) -> Result<Option<CacheHit>, DomainError> {
        let threshold = match similarity_threshold {
            Some(t) if !t.is_finite() => {
                return Err(DomainError::validation(format!(
                    "similarity threshold must be a finite number, got {}",
                    t
                )));
            }
            Some(t) => t.clamp(0.0, 1.0),
            None => self.config.similarity_threshold,
        };

        if self.state.read().await.index.count() == 0 {
            debug!("Semantic cache miss: cache is empty");
            return Ok(self.state.write().await.record_miss(LookupOutcome::EmptyCache));
        }

        let vector = self.embed(query_text).await?;

        let mut state = self.state.write().await;
        let now = Utc::now();

        let best = state.index.search(&vector, 1).into_iter().next();
        let Some(best) = best else {
            return Ok(state.record_miss(LookupOutcome::NoCandidate));
        };

        if best.similarity < threshold {
            debug!(
                similarity = best.similarity,
                threshold, "Semantic cache miss: below threshold"
            );
            return Ok(state.record_miss(LookupOutcome::BelowThreshold));
        }

        let ttl_hours = self.config.ttl_hours;
        let rejected = match state.store.get(best.ordinal) {
            None => {
                warn!(
                    ordinal = best.ordinal,
                    "Index ordinal has no matching entry, treating as a miss"
                );
                Some(LookupOutcome::NoCandidate)
            }
            Some(entry) if entry.is_expired(now, ttl_hours) => {
                debug!(entry_id = entry.entry_id(), "Semantic cache miss: entry expired");
                Some(LookupOutcome::Expired)
            }
            Some(_) => None,
        };

        if let Some(outcome) = rejected {
            return Ok(state.record_miss(outcome));
        }

        let CacheState { store, metrics, .. } = &mut *state;
        let entry = store
            .get_mut(best.ordinal)
            .ok_or_else(|| DomainError::internal("matched entry disappeared"))?;

        entry.record_hit(now);
        metrics.record_hit(best.similarity);
        record_cache_lookup(LookupOutcome::Hit);

        debug!(
            entry_id = entry.entry_id(),
            similarity = best.similarity,
            hit_count = entry.hit_count(),
            "Semantic cache hit"
        );

        Ok(Some(CacheHit {
            entry_id: entry.entry_id().to_string(),
            query: entry.query().without_embedding(),
            response: entry.response().clone(),
            similarity_score: best.similarity,
            hit_count: entry.hit_count(),
            age_hours: entry.age_hours(now),
        }))
    }

    /// Remove every entry at least `max_age_hours` old (default: the TTL)
    /// and return how many were removed
    pub async fn invalidate_by_age(&self, max_age_hours: Option<f64>) -> Result<usize, DomainError> {
        let max_age = max_age_hours.unwrap_or(self.config.ttl_hours as f64);

        if max_age.is_nan() || max_age < 0.0 {
            return Err(DomainError::validation(format!(
                "max_age_hours must be a non-negative number, got {}",
                max_age
            )));
        }

        let mut state = self.state.write().await;
        let (kept, removed) = state.store.partition_by_age(Utc::now(), max_age);

        if removed.is_empty() {
            return Ok(0);
        }

        let index = self.rebuild_index(state.index.as_ref(), &kept, None).await?;

        state.store = EntryStore::from_entries(kept);
        state.index = index;

        record_cache_sweep(removed.len());
        info!(
            removed = removed.len(),
            remaining = state.store.len(),
            max_age_hours = max_age,
            "Swept aged semantic cache entries"
        );

        self.persist(&state);

        Ok(removed.len())
    }

    /// Drop every entry, reset metrics and persist the empty cache
    pub async fn invalidate_all(&self) {
        let mut state = self.state.write().await;

        let removed = state.store.len();
        let index = state.index.fresh();
        state.store = EntryStore::new();
        state.index = index;
        state.metrics.reset();
        state.evictions = 0;

        info!(removed, "Cleared semantic cache");

        self.persist(&state);
    }

    /// Snapshot of the lookup counters
    pub async fn get_metrics(&self) -> CacheMetrics {
        self.state.read().await.metrics.clone()
    }

    /// Snapshot of contents, counters and configuration
    pub async fn get_stats(&self) -> CacheStats {
        let state = self.state.read().await;
        let now = Utc::now();

        CacheStats {
            total_entries: state.store.len(),
            index_size: state.index.count(),
            expired_entries: state.store.expired_count(now, self.config.ttl_hours),
            evictions: state.evictions,
            oldest_entry: state.store.oldest_created_at(),
            newest_entry: state.store.newest_created_at(),
            metrics: state.metrics.clone(),
            config: CacheStatsConfig {
                model_name: self.config.model_name.clone(),
                similarity_threshold: self.config.similarity_threshold,
                max_cache_size: self.config.max_cache_size,
                ttl_hours: self.config.ttl_hours,
                retain_embeddings: self.config.retain_embeddings,
                index_path: self.config.index_path.clone(),
                store_path: self.config.store_path.clone(),
            },
        }
    }

    /// Number of stored entries
    pub async fn len(&self) -> usize {
        self.state.read().await.store.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Embed and normalize text
    async fn embed(&self, text: &str) -> Result<Vec<f32>, DomainError> {
        let request = EmbeddingRequest::single(&self.config.model_name, text);
        let response = self.embedding_provider.embed(request).await?;

        let vector = response.into_first().ok_or_else(|| {
            DomainError::provider(
                self.embedding_provider.provider_name(),
                "No embedding returned",
            )
        })?;

        Ok(l2_normalize(vector))
    }

    /// Build a fresh index holding one vector per survivor, in order.
    ///
    /// `pending` carries the vector of an entry that was just embedded and
    /// needs no second call to the provider.
    async fn rebuild_index(
        &self,
        template: &dyn VectorIndex,
        survivors: &[CacheEntry],
        pending: Option<(&str, &[f32])>,
    ) -> Result<Box<dyn VectorIndex>, DomainError> {
        let mut index = template.fresh();
        let mut reembedded = 0usize;

        for entry in survivors {
            let vector = match (pending, entry.embedding()) {
                (Some((id, vector)), _) if id == entry.entry_id() => vector.to_vec(),
                (_, Some(retained)) if self.config.retain_embeddings => retained.to_vec(),
                _ => {
                    reembedded += 1;
                    self.embed(entry.query_text()).await?
                }
            };

            index.add(vector)?;
        }

        debug!(
            survivors = survivors.len(),
            reembedded, "Rebuilt semantic cache index"
        );

        Ok(index)
    }

    /// Best-effort snapshot write; in-memory state stays authoritative
    fn persist(&self, state: &CacheState) {
        if let Err(e) = self.persistence.save(&state.snapshot()) {
            warn!(
                error = %e,
                "Failed to persist semantic cache; changes will be lost on restart"
            );
        }
    }

    /// Rebuild state from the last snapshot. Any unusable snapshot, including
    /// one written with a different embedding dimension, yields an empty cache.
    fn restore_state(
        config: &SemanticCacheConfig,
        persistence: &dyn CacheSnapshotStore,
        template: &dyn VectorIndex,
        expected_dimension: Option<usize>,
    ) -> CacheState {
        let snapshot = match persistence.load() {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                info!("No semantic cache snapshot found, starting empty");
                return CacheState::empty(template);
            }
            Err(e) => {
                warn!(error = %e, "Failed to load semantic cache snapshot, starting empty");
                return CacheState::empty(template);
            }
        };

        if let Err(e) = snapshot.ensure_aligned() {
            warn!(error = %e, "Semantic cache snapshot is inconsistent, starting empty");
            return CacheState::empty(template);
        }

        if let (Some(saved), Some(expected)) = (snapshot.index.dimension, expected_dimension) {
            if saved != expected {
                warn!(
                    saved,
                    expected,
                    model = %config.model_name,
                    "Semantic cache snapshot was built with a different embedding dimension, starting empty"
                );
                return CacheState::empty(template);
            }
        }

        let CacheSnapshot {
            mut entries,
            index: mut index_snapshot,
        } = snapshot;

        if !config.retain_embeddings {
            entries.iter_mut().for_each(|e| e.set_embedding(None));
        }

        // A smaller capacity than the snapshot was written with: drop the
        // oldest rows from both artifacts, which keeps them aligned.
        let mut store = EntryStore::from_entries(entries);
        while store.len() > config.max_cache_size {
            let Some(oldest) = store.oldest_position() else {
                break;
            };
            store.remove(oldest);
            index_snapshot.vectors.remove(oldest);
        }

        let index = match template.restore(index_snapshot) {
            Ok(index) => index,
            Err(e) => {
                warn!(error = %e, "Failed to restore semantic cache index, starting empty");
                return CacheState::empty(template);
            }
        };

        info!(entries = store.len(), "Loaded semantic cache snapshot");

        CacheState {
            store,
            index,
            metrics: CacheMetrics::new(),
            evictions: 0,
        }
    }

    /// Shift an entry's creation time into the past
    #[cfg(test)]
    async fn backdate(&self, entry_id: &str, hours: i64) {
        let mut state = self.state.write().await;
        let position = state
            .store
            .entries()
            .iter()
            .position(|e| e.entry_id() == entry_id)
            .expect("entry to backdate");

        if let Some(entry) = state.store.get_mut(position) {
            entry.backdate(chrono::Duration::hours(hours));
        }
    }
}

/// Suffix the base id until it is unused
fn unique_entry_id(store: &EntryStore, base: &str) -> String {
    if !store.contains_id(base) {
        return base.to_string();
    }

    (1..)
        .map(|n| format!("{}-{}", base, n))
        .find(|candidate| !store.contains_id(candidate))
        .unwrap_or_else(|| base.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::embedding::MockEmbeddingProvider;
    use crate::domain::semantic_cache::{IndexSnapshot, TokenUsage};
    use crate::infrastructure::semantic_cache::{FileSnapshotStore, InMemorySnapshotStore};

    const DIMS: usize = 64;

    fn config() -> SemanticCacheConfig {
        SemanticCacheConfig::new().with_paths("unused/index.bin", "unused/entries.jsonl")
    }

    fn service_with(
        config: SemanticCacheConfig,
        provider: MockEmbeddingProvider,
    ) -> (
        SemanticCacheService,
        Arc<MockEmbeddingProvider>,
        Arc<InMemorySnapshotStore>,
    ) {
        let provider = Arc::new(provider);
        let persistence = Arc::new(InMemorySnapshotStore::new());
        let service =
            SemanticCacheService::new(config, provider.clone(), persistence.clone()).unwrap();

        (service, provider, persistence)
    }

    fn service(config: SemanticCacheConfig) -> SemanticCacheService {
        service_with(config, MockEmbeddingProvider::new("mock", DIMS)).0
    }

    #[tokio::test]
    async fn test_store_then_get_identical_query() {
        let service = service(config());

        let entry_id = service
            .store(CacheStoreRequest::new(
                "What is Python?",
                "Python is a programming language.",
            ))
            .await
            .unwrap();

        let hit = service.get("What is Python?", None).await.unwrap().unwrap();

        assert_eq!(hit.entry_id, entry_id);
        assert!((hit.similarity_score - 1.0).abs() < 1e-4);
        assert_eq!(hit.hit_count, 1);
        assert_eq!(hit.response.response_text, "Python is a programming language.");
        assert_eq!(hit.query.query_text, "What is Python?");
        assert!(hit.query.embedding.is_none());
        assert!(hit.age_hours >= 0.0);
    }

    #[tokio::test]
    async fn test_get_on_empty_cache() {
        let (service, provider, _) = service_with(config(), MockEmbeddingProvider::new("mock", DIMS));

        assert!(service.get("How to cook pasta?", None).await.unwrap().is_none());

        let metrics = service.get_metrics().await;
        assert_eq!(metrics.total_queries, 1);
        assert_eq!(metrics.cache_hits, 0);
        assert_eq!(metrics.cache_misses, 1);
        assert_eq!(metrics.hit_rate, 0.0);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_capacity_evicts_earliest_created() {
        let service = service(config().with_max_cache_size(2));

        service.store(CacheStoreRequest::new("query A", "answer A")).await.unwrap();
        service.store(CacheStoreRequest::new("query B", "answer B")).await.unwrap();
        service.store(CacheStoreRequest::new("query C", "answer C")).await.unwrap();

        assert!(service.get("query A", None).await.unwrap().is_none());
        assert_eq!(
            service.get("query B", None).await.unwrap().unwrap().response.response_text,
            "answer B"
        );
        assert_eq!(
            service.get("query C", None).await.unwrap().unwrap().response.response_text,
            "answer C"
        );

        let stats = service.get_stats().await;
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.index_size, 2);
        assert_eq!(stats.evictions, 1);
    }

    #[tokio::test]
    async fn test_eviction_ignores_recency_of_hits() {
        let service = service(config().with_max_cache_size(2));

        service.store(CacheStoreRequest::new("query A", "answer A")).await.unwrap();
        service.store(CacheStoreRequest::new("query B", "answer B")).await.unwrap();

        for _ in 0..3 {
            assert!(service.get("query A", None).await.unwrap().is_some());
        }

        service.store(CacheStoreRequest::new("query C", "answer C")).await.unwrap();

        assert!(service.get("query A", None).await.unwrap().is_none());
        assert!(service.get("query B", None).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_eviction_reembeds_survivors() {
        let (service, provider, _) = service_with(
            config().with_max_cache_size(2),
            MockEmbeddingProvider::new("mock", DIMS),
        );

        service.store(CacheStoreRequest::new("A", "a")).await.unwrap();
        service.store(CacheStoreRequest::new("B", "b")).await.unwrap();
        assert_eq!(provider.calls(), 2);

        service.store(CacheStoreRequest::new("C", "c")).await.unwrap();

        // C itself plus one re-embedding of surviving B
        assert_eq!(provider.calls(), 4);
    }

    #[tokio::test]
    async fn test_retained_embeddings_skip_reembedding() {
        let (service, provider, persistence) = service_with(
            config().with_max_cache_size(2).with_retain_embeddings(true),
            MockEmbeddingProvider::new("mock", DIMS),
        );

        service.store(CacheStoreRequest::new("A", "a")).await.unwrap();
        service.store(CacheStoreRequest::new("B", "b")).await.unwrap();
        service.store(CacheStoreRequest::new("C", "c")).await.unwrap();

        assert_eq!(provider.calls(), 3);
        assert!(service.get("B", None).await.unwrap().is_some());

        let saved = persistence.latest().unwrap();
        assert!(saved.entries.iter().all(|e| e.embedding().is_some()));
    }

    #[tokio::test]
    async fn test_three_hits_increment_hit_count() {
        let service = service(config());
        service
            .store(CacheStoreRequest::new("What is Rust?", "A systems language."))
            .await
            .unwrap();

        let mut last = None;
        for _ in 0..3 {
            last = service.get("What is Rust?", None).await.unwrap();
        }

        let hit = last.unwrap();
        assert_eq!(hit.hit_count, 3);

        let metrics = service.get_metrics().await;
        assert_eq!(metrics.cache_hits, 3);
        assert_eq!(metrics.total_queries, 3);
        assert!((metrics.avg_similarity_on_hit - 1.0).abs() < 1e-4);
        assert!((metrics.hit_rate - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_invalidate_all_resets_everything() {
        let (service, _, persistence) = service_with(config(), MockEmbeddingProvider::new("mock", DIMS));

        service.store(CacheStoreRequest::new("q1", "r1")).await.unwrap();
        service.store(CacheStoreRequest::new("q2", "r2")).await.unwrap();
        service.get("q1", None).await.unwrap();

        service.invalidate_all().await;

        let stats = service.get_stats().await;
        assert_eq!(stats.total_entries, 0);
        assert_eq!(stats.index_size, 0);
        assert_eq!(stats.metrics, CacheMetrics::default());
        assert!(persistence.latest().unwrap().entries.is_empty());

        assert!(service.get("q1", None).await.unwrap().is_none());
        let metrics = service.get_metrics().await;
        assert_eq!(metrics.total_queries, 1);
        assert_eq!(metrics.cache_misses, 1);
    }

    #[tokio::test]
    async fn test_invalidate_by_age_removes_old_entries() {
        let service = service(config());

        let old = service.store(CacheStoreRequest::new("old", "r")).await.unwrap();
        let edge = service.store(CacheStoreRequest::new("edge", "r")).await.unwrap();
        service.store(CacheStoreRequest::new("young", "r")).await.unwrap();

        service.backdate(&old, 5).await;
        service.backdate(&edge, 3).await;

        let removed = service.invalidate_by_age(Some(3.0)).await.unwrap();

        assert_eq!(removed, 2);
        let stats = service.get_stats().await;
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.index_size, stats.total_entries);
        assert!(service.get("young", None).await.unwrap().is_some());
        assert!(service.get("old", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalidate_by_age_nothing_to_remove() {
        let (service, _, persistence) = service_with(config(), MockEmbeddingProvider::new("mock", DIMS));
        service.store(CacheStoreRequest::new("q", "r")).await.unwrap();
        let saves = persistence.save_count();

        assert_eq!(service.invalidate_by_age(None).await.unwrap(), 0);
        assert_eq!(persistence.save_count(), saves);
        assert!(service.invalidate_by_age(Some(-1.0)).await.is_err());
    }

    #[tokio::test]
    async fn test_expired_entry_misses_but_stays_present() {
        let service = service(config().with_ttl_hours(1));

        let id = service
            .store(CacheStoreRequest::new("What is Python?", "A language."))
            .await
            .unwrap();
        service.backdate(&id, 2).await;

        assert!(service.get("What is Python?", None).await.unwrap().is_none());

        let stats = service.get_stats().await;
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.expired_entries, 1);
        assert_eq!(stats.metrics.cache_misses, 1);

        assert_eq!(service.invalidate_by_age(None).await.unwrap(), 1);
        assert!(service.is_empty().await);
    }

    #[tokio::test]
    async fn test_threshold_override_is_per_call() {
        let other = (1.0f32 - 0.85 * 0.85).sqrt();
        let provider = MockEmbeddingProvider::new("mock", 2)
            .with_vector("stored question", vec![1.0, 0.0])
            .with_vector("similar question", vec![0.85, other]);
        let (service, _, _) = service_with(config(), provider);

        service
            .store(CacheStoreRequest::new("stored question", "stored answer"))
            .await
            .unwrap();

        assert!(service.get("similar question", None).await.unwrap().is_none());

        let hit = service
            .get("similar question", Some(0.8))
            .await
            .unwrap()
            .unwrap();
        assert!((hit.similarity_score - 0.85).abs() < 1e-4);

        assert!(service.get("similar question", None).await.unwrap().is_none());
        assert!((service.config().similarity_threshold - 0.9).abs() < f32::EPSILON);

        let metrics = service.get_metrics().await;
        assert_eq!(metrics.total_queries, 3);
        assert_eq!(metrics.cache_hits, 1);
        assert!((metrics.avg_similarity_on_hit - 0.85).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_non_finite_threshold_rejected() {
        let provider = MockEmbeddingProvider::new("mock", 2)
            .with_vector("stored", vec![1.0, 0.0])
            .with_vector("unrelated", vec![-1.0, 0.0]);
        let (service, _, _) = service_with(config(), provider);

        service
            .store(CacheStoreRequest::new("stored", "answer"))
            .await
            .unwrap();

        for threshold in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            let result = service.get("unrelated", Some(threshold)).await;
            assert!(matches!(result, Err(DomainError::Validation { .. })));
        }

        assert!(service.get("unrelated", Some(1.5)).await.unwrap().is_none());
        assert_eq!(service.get_metrics().await.cache_hits, 0);
    }

    #[tokio::test]
    async fn test_store_embedding_failure_commits_nothing() {
        let (service, _, persistence) = service_with(
            config(),
            MockEmbeddingProvider::new("mock", DIMS).failing_on("bad query"),
        );

        let result = service.store(CacheStoreRequest::new("bad query", "r")).await;

        assert!(matches!(result, Err(DomainError::Provider { .. })));
        assert!(service.is_empty().await);
        assert_eq!(persistence.save_count(), 0);
    }

    #[tokio::test]
    async fn test_get_embedding_failure_propagates() {
        let (service, _, _) = service_with(
            config(),
            MockEmbeddingProvider::new("mock", DIMS).failing_on("bad query"),
        );
        service.store(CacheStoreRequest::new("good query", "r")).await.unwrap();

        assert!(service.get("bad query", None).await.is_err());
        assert_eq!(service.get_metrics().await.total_queries, 0);
    }

    #[tokio::test]
    async fn test_failed_rebuild_leaves_cache_untouched() {
        let now = Utc::now();
        let entries: Vec<CacheEntry> = ["first", "second"]
            .iter()
            .map(|q| {
                let (query, response) = CacheStoreRequest::new(*q, "r").into_parts(now);
                let id = entry_id_for(&query.query_hash, now);
                CacheEntry::new(format!("{}-{}", id, q), query, response)
            })
            .collect();
        let vectors = vec![
            l2_normalize((0..DIMS).map(|i| i as f32).collect()),
            l2_normalize((0..DIMS).map(|i| (DIMS - i) as f32).collect()),
        ];
        let persistence = Arc::new(InMemorySnapshotStore::with_snapshot(CacheSnapshot::new(
            entries,
            IndexSnapshot {
                dimension: Some(DIMS),
                vectors,
            },
        )));
        let provider = Arc::new(MockEmbeddingProvider::new("mock", DIMS).failing_on("second"));
        let service = SemanticCacheService::new(
            config().with_max_cache_size(2),
            provider,
            persistence.clone(),
        )
        .unwrap();

        let result = service.store(CacheStoreRequest::new("third", "r")).await;

        assert!(result.is_err());
        let stats = service.get_stats().await;
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.index_size, 2);
        assert_eq!(stats.evictions, 0);
        assert_eq!(persistence.save_count(), 0);
    }

    #[tokio::test]
    async fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let index_path = dir.path().join("cache/index.bin");
        let store_path = dir.path().join("cache/entries.jsonl");
        let config = SemanticCacheConfig::new().with_paths(&index_path, &store_path);
        let provider = Arc::new(MockEmbeddingProvider::new("mock", DIMS));

        {
            let persistence = Arc::new(FileSnapshotStore::new(&index_path, &store_path));
            let service =
                SemanticCacheService::new(config.clone(), provider.clone(), persistence).unwrap();
            service
                .store(
                    CacheStoreRequest::new("What is Python?", "A language.")
                        .with_task_id("task-7")
                        .with_usage(TokenUsage::new(12, 30)),
                )
                .await
                .unwrap();
            service
                .store(CacheStoreRequest::new("What is Rust?", "Another language."))
                .await
                .unwrap();
        }

        let persistence = Arc::new(FileSnapshotStore::new(&index_path, &store_path));
        let service = SemanticCacheService::new(config, provider, persistence).unwrap();

        let stats = service.get_stats().await;
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.index_size, 2);
        assert_eq!(stats.metrics.total_queries, 0);

        let hit = service.get("What is Python?", None).await.unwrap().unwrap();
        assert_eq!(hit.response.usage.total_tokens, 42);
        assert_eq!(hit.query.task_id.as_deref(), Some("task-7"));
    }

    #[tokio::test]
    async fn test_snapshot_with_other_dimension_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let index_path = dir.path().join("index.bin");
        let store_path = dir.path().join("entries.jsonl");
        let config = SemanticCacheConfig::new().with_paths(&index_path, &store_path);

        {
            let persistence = Arc::new(FileSnapshotStore::new(&index_path, &store_path));
            let service = SemanticCacheService::new(
                config.clone(),
                Arc::new(MockEmbeddingProvider::new("mock", 8)),
                persistence,
            )
            .unwrap();
            service.store(CacheStoreRequest::new("q1", "r1")).await.unwrap();
        }

        let persistence = Arc::new(FileSnapshotStore::new(&index_path, &store_path));
        let service = SemanticCacheService::new(
            config,
            Arc::new(MockEmbeddingProvider::new("mock", 4)),
            persistence,
        )
        .unwrap();

        assert!(service.is_empty().await);

        let entry_id = service.store(CacheStoreRequest::new("q2", "r2")).await.unwrap();
        let hit = service.get("q2", None).await.unwrap().unwrap();
        assert_eq!(hit.entry_id, entry_id);
        assert_eq!(service.get_stats().await.total_entries, 1);
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_falls_back_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let index_path = dir.path().join("index.bin");
        let store_path = dir.path().join("entries.jsonl");
        std::fs::write(&index_path, b"not bincode").unwrap();
        std::fs::write(&store_path, b"{not json}\n").unwrap();

        let service = SemanticCacheService::new(
            SemanticCacheConfig::new().with_paths(&index_path, &store_path),
            Arc::new(MockEmbeddingProvider::new("mock", DIMS)),
            Arc::new(FileSnapshotStore::new(&index_path, &store_path)),
        )
        .unwrap();

        assert!(service.is_empty().await);
        service.store(CacheStoreRequest::new("q", "r")).await.unwrap();
        assert_eq!(service.len().await, 1);
    }

    #[tokio::test]
    async fn test_write_failure_keeps_memory_state() {
        let (service, _, persistence) = service_with(config(), MockEmbeddingProvider::new("mock", DIMS));
        persistence.set_fail_writes(true);

        service.store(CacheStoreRequest::new("q", "r")).await.unwrap();

        assert!(service.get("q", None).await.unwrap().is_some());
        assert_eq!(persistence.save_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_config_is_fatal() {
        let result = SemanticCacheService::new(
            config().with_max_cache_size(0),
            Arc::new(MockEmbeddingProvider::new("mock", DIMS)),
            Arc::new(InMemorySnapshotStore::new()),
        );

        assert!(matches!(result, Err(DomainError::Configuration { .. })));
    }

    #[tokio::test]
    async fn test_load_trims_to_capacity() {
        let source = Arc::new(InMemorySnapshotStore::new());
        let provider = Arc::new(MockEmbeddingProvider::new("mock", DIMS));
        {
            let service =
                SemanticCacheService::new(config(), provider.clone(), source.clone()).unwrap();
            for q in ["one", "two", "three"] {
                service.store(CacheStoreRequest::new(q, "r")).await.unwrap();
            }
        }

        let service = SemanticCacheService::new(
            config().with_max_cache_size(2),
            provider,
            Arc::new(InMemorySnapshotStore::with_snapshot(source.latest().unwrap())),
        )
        .unwrap();

        let stats = service.get_stats().await;
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.index_size, 2);
        assert!(service.get("one", None).await.unwrap().is_none());
        assert!(service.get("three", None).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_stats_are_read_only() {
        let service = service(config());
        service.store(CacheStoreRequest::new("q", "r")).await.unwrap();

        let before = service.get_metrics().await;
        let stats = service.get_stats().await;
        let after = service.get_metrics().await;

        assert_eq!(before, after);
        assert_eq!(stats.config.max_cache_size, 1000);
        assert_eq!(stats.config.ttl_hours, 24);
        assert!(stats.oldest_entry.is_some());
    }

    #[tokio::test]
    async fn test_duplicate_queries_get_distinct_ids() {
        let service = service(config());

        let first = service.store(CacheStoreRequest::new("same", "r1")).await.unwrap();
        let second = service.store(CacheStoreRequest::new("same", "r2")).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(service.len().await, 2);
    }

    #[tokio::test]
    async fn test_concurrent_operations_keep_alignment() {
        let service = Arc::new(service(config().with_max_cache_size(5)));

        let mut handles = Vec::new();
        for i in 0..20 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                service
                    .store(CacheStoreRequest::new(format!("query {}", i), "r"))
                    .await
                    .unwrap();
                service.get(&format!("query {}", i % 7), None).await.unwrap();
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        let stats = service.get_stats().await;
        assert_eq!(stats.total_entries, 5);
        assert_eq!(stats.index_size, stats.total_entries);
        assert_eq!(stats.metrics.total_queries, 20);
        assert_eq!(
            stats.metrics.total_queries,
            stats.metrics.cache_hits + stats.metrics.cache_misses
        );
    }

    #[test]
    fn test_unique_entry_id_suffix() {
        let now = Utc::now();
        let (query, response) = CacheStoreRequest::new("q", "r").into_parts(now);
        let base = entry_id_for(&query.query_hash, now);
        let store = EntryStore::from_entries(vec![CacheEntry::new(base.clone(), query, response)]);

        assert_eq!(unique_entry_id(&store, &base), format!("{}-1", base));
        assert_eq!(unique_entry_id(&store, "other"), "other");
    }
}
