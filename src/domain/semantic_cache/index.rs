//! Vector index abstraction

use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// A single search match: similarity and the ordinal of the stored vector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexMatch {
    pub similarity: f32,
    pub ordinal: usize,
}

/// Serializable view of an index's contents, in ordinal order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub dimension: Option<usize>,
    pub vectors: Vec<Vec<f32>>,
}

impl IndexSnapshot {
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

/// Append-only similarity search over normalized vectors.
///
/// A vector's ordinal is its insertion position. There is no delete: removing
/// anything means building a fresh index and re-adding the survivors in order.
pub trait VectorIndex: Send + Sync + Debug {
    /// Append a vector and return its ordinal
    fn add(&mut self, vector: Vec<f32>) -> Result<usize, DomainError>;

    /// Up to `k` matches sorted by descending similarity
    fn search(&self, query: &[f32], k: usize) -> Vec<IndexMatch>;

    /// Number of stored vectors
    fn count(&self) -> usize;

    /// Vector length fixed by the first insert
    fn dimension(&self) -> Option<usize>;

    /// Copy out the stored vectors
    fn snapshot(&self) -> IndexSnapshot;

    /// An empty index of the same kind
    fn fresh(&self) -> Box<dyn VectorIndex>;

    /// Build an index of the same kind holding the snapshot's vectors
    fn restore(&self, snapshot: IndexSnapshot) -> Result<Box<dyn VectorIndex>, DomainError> {
        let mut index = self.fresh();

        for vector in snapshot.vectors {
            index.add(vector)?;
        }

        if let (Some(expected), Some(actual)) = (snapshot.dimension, index.dimension()) {
            if expected != actual {
                return Err(DomainError::persistence(format!(
                    "index snapshot declares dimension {} but holds vectors of length {}",
                    expected, actual
                )));
            }
        }

        Ok(index)
    }
}
