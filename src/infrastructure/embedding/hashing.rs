//! Offline embedding provider based on signed feature hashing
//!
//! Each lowercase token is hashed into one of `dimensions` buckets with a
//! hash-derived sign. Texts sharing vocabulary end up with a high inner
//! product after normalization, which is enough for exact and near-exact
//! repeats without a model server.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::domain::embedding::{Embedding, EmbeddingProvider, EmbeddingRequest, EmbeddingResponse};
use crate::domain::DomainError;

pub const DEFAULT_HASHING_DIMENSIONS: usize = 384;

#[derive(Debug, Clone)]
pub struct HashingEmbeddingProvider {
    dimensions: usize,
}

impl HashingEmbeddingProvider {
    pub fn new(dimensions: usize) -> Result<Self, DomainError> {
        if dimensions == 0 {
            return Err(DomainError::configuration(
                "Hashing embedding dimensions must be greater than 0",
            ));
        }

        Ok(Self { dimensions })
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        for token in tokenize(text) {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimensions as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        vector
    }
}

impl Default for HashingEmbeddingProvider {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_HASHING_DIMENSIONS,
        }
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

#[async_trait]
impl EmbeddingProvider for HashingEmbeddingProvider {
    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, DomainError> {
        let data = request
            .inputs()
            .into_iter()
            .enumerate()
            .map(|(i, text)| Embedding::new(i, self.embed_text(text)))
            .collect();

        Ok(EmbeddingResponse::new(request.model().to_string(), data))
    }

    fn provider_name(&self) -> &'static str {
        "hashing"
    }

    fn dimensions(&self, _model: &str) -> Option<usize> {
        Some(self.dimensions)
    }
}
