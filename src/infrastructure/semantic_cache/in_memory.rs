//! In-memory snapshot persistence

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use crate::domain::semantic_cache::{CacheSnapshot, CacheSnapshotStore};
use crate::domain::DomainError;

/// Keeps the last saved snapshot in memory.
///
/// Suitable for ephemeral caches and tests; nothing survives the process.
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    snapshot: RwLock<Option<CacheSnapshot>>,
    fail_writes: AtomicBool,
    saves: AtomicUsize,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a previously saved snapshot
    pub fn with_snapshot(snapshot: CacheSnapshot) -> Self {
        Self {
            snapshot: RwLock::new(Some(snapshot)),
            ..Default::default()
        }
    }

    /// Make subsequent saves fail, simulating an unwritable disk
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// The most recently saved snapshot
    pub fn latest(&self) -> Option<CacheSnapshot> {
        self.snapshot.read().ok().and_then(|s| s.clone())
    }
}

impl CacheSnapshotStore for InMemorySnapshotStore {
    fn save(&self, snapshot: &CacheSnapshot) -> Result<(), DomainError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DomainError::persistence("simulated write failure"));
        }

        snapshot.ensure_aligned()?;

        let mut slot = self.snapshot.write().map_err(|e| {
            DomainError::internal(format!("Failed to acquire write lock: {}", e))
        })?;
        *slot = Some(snapshot.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);

        Ok(())
    }

    fn load(&self) -> Result<Option<CacheSnapshot>, DomainError> {
        let slot = self.snapshot.read().map_err(|e| {
            DomainError::internal(format!("Failed to acquire read lock: {}", e))
        })?;

        match slot.as_ref() {
            Some(snapshot) => {
                snapshot.ensure_aligned()?;
                Ok(Some(snapshot.clone()))
            }
            None => Ok(None),
        }
    }
}
