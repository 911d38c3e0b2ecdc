//! Ordered entry store

use chrono::{DateTime, Utc};

use super::CacheEntry;

/// Entries in insertion order; position `n` pairs with index ordinal `n`
#[derive(Debug, Clone, Default)]
pub struct EntryStore {
    entries: Vec<CacheEntry>,
}

impl EntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<CacheEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[CacheEntry] {
        &self.entries
    }

    pub fn get(&self, position: usize) -> Option<&CacheEntry> {
        self.entries.get(position)
    }

    pub fn get_mut(&mut self, position: usize) -> Option<&mut CacheEntry> {
        self.entries.get_mut(position)
    }

    pub fn contains_id(&self, entry_id: &str) -> bool {
        self.entries.iter().any(|e| e.entry_id() == entry_id)
    }

    pub fn push(&mut self, entry: CacheEntry) {
        self.entries.push(entry);
    }

    /// Remove and return the entry at `position`, shifting later entries down
    pub fn remove(&mut self, position: usize) -> CacheEntry {
        self.entries.remove(position)
    }

    /// Position of the entry with the smallest `created_at`; the first such
    /// entry in store order wins ties
    pub fn oldest_position(&self) -> Option<usize> {
        self.entries
            .iter()
            .enumerate()
            .min_by_key(|(position, entry)| (entry.created_at(), *position))
            .map(|(position, _)| position)
    }

    /// Split into entries younger than `max_age_hours` and the rest, keeping order
    pub fn partition_by_age(
        &self,
        now: DateTime<Utc>,
        max_age_hours: f64,
    ) -> (Vec<CacheEntry>, Vec<CacheEntry>) {
        self.entries
            .iter()
            .cloned()
            .partition(|entry| entry.age_hours(now) < max_age_hours)
    }

    /// Count entries past the TTL that still occupy capacity
    pub fn expired_count(&self, now: DateTime<Utc>, ttl_hours: u64) -> usize {
        self.entries
            .iter()
            .filter(|e| e.is_expired(now, ttl_hours))
            .count()
    }

    pub fn oldest_created_at(&self) -> Option<DateTime<Utc>> {
        self.entries.iter().map(|e| e.created_at()).min()
    }

    pub fn newest_created_at(&self) -> Option<DateTime<Utc>> {
        self.entries.iter().map(|e| e.created_at()).max()
    }

    pub fn into_entries(self) -> Vec<CacheEntry> {
        self.entries
    }
}
