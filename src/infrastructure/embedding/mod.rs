//! Embedding provider implementations

mod factory;
mod hashing;
mod http_client;
mod openai;

pub use factory::{build_embedding_provider, EmbeddingSettings};
pub use hashing::{HashingEmbeddingProvider, DEFAULT_HASHING_DIMENSIONS};
pub use http_client::{HttpClient, HttpClientTrait};
pub use openai::OpenAiEmbeddingProvider;

#[cfg(test)]
pub use http_client::mock::MockHttpClient;
