//! Snapshot persistence trait

use std::fmt::Debug;

use super::{CacheEntry, IndexSnapshot};
use crate::domain::DomainError;

/// Entries plus the index vectors they align with, by ordinal
#[derive(Debug, Clone, Default)]
pub struct CacheSnapshot {
    pub entries: Vec<CacheEntry>,
    pub index: IndexSnapshot,
}

impl CacheSnapshot {
    pub fn new(entries: Vec<CacheEntry>, index: IndexSnapshot) -> Self {
        Self { entries, index }
    }

    /// Check that entries and vectors can be re-associated by position
    pub fn ensure_aligned(&self) -> Result<(), DomainError> {
        if self.entries.len() != self.index.len() {
            return Err(DomainError::persistence(format!(
                "entry table holds {} rows but index snapshot holds {} vectors",
                self.entries.len(),
                self.index.len()
            )));
        }

        Ok(())
    }
}

/// Durable storage for the entry table and the index snapshot
pub trait CacheSnapshotStore: Send + Sync + Debug {
    /// Write both artifacts
    fn save(&self, snapshot: &CacheSnapshot) -> Result<(), DomainError>;

    /// Read both artifacts; `Ok(None)` means nothing has been saved yet
    fn load(&self) -> Result<Option<CacheSnapshot>, DomainError>;
}
