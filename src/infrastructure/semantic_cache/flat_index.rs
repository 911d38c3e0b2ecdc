//! Exhaustive inner-product index

use crate::domain::embedding::inner_product;
use crate::domain::semantic_cache::{IndexMatch, IndexSnapshot, VectorIndex};
use crate::domain::DomainError;

/// Flat index scanning every vector on search.
///
/// Vectors are expected to be L2-normalized so the inner product is the
/// cosine similarity.
#[derive(Debug, Clone, Default)]
pub struct FlatInnerProductIndex {
    dimension: Option<usize>,
    vectors: Vec<Vec<f32>>,
}

impl FlatInnerProductIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VectorIndex for FlatInnerProductIndex {
    fn add(&mut self, vector: Vec<f32>) -> Result<usize, DomainError> {
        if vector.is_empty() {
            return Err(DomainError::validation("cannot index an empty vector"));
        }

        match self.dimension {
            Some(dimension) if dimension != vector.len() => {
                return Err(DomainError::validation(format!(
                    "vector has {} dimensions, index expects {}",
                    vector.len(),
                    dimension
                )));
            }
            Some(_) => {}
            None => self.dimension = Some(vector.len()),
        }

        self.vectors.push(vector);
        Ok(self.vectors.len() - 1)
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<IndexMatch> {
        if k == 0 || self.dimension != Some(query.len()) {
            return Vec::new();
        }

        let mut matches: Vec<IndexMatch> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(ordinal, vector)| IndexMatch {
                similarity: inner_product(query, vector),
                ordinal,
            })
            .collect();

        // Stable sort keeps lower ordinals first among equal scores
        matches.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(k);

        matches
    }

    fn count(&self) -> usize {
        self.vectors.len()
    }

    fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    fn snapshot(&self) -> IndexSnapshot {
        IndexSnapshot {
            dimension: self.dimension,
            vectors: self.vectors.clone(),
        }
    }

    fn fresh(&self) -> Box<dyn VectorIndex> {
        Box::new(Self::new())
    }
}
