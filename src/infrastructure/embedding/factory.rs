use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use super::hashing::{HashingEmbeddingProvider, DEFAULT_HASHING_DIMENSIONS};
use super::openai::{OpenAiEmbeddingProvider, DEFAULT_OPENAI_BASE_URL};
use super::HttpClient;
use crate::domain::embedding::EmbeddingProvider;
use crate::domain::DomainError;

const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Embedding backend settings
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingSettings {
    /// `hashing` (offline) or `openai`
    #[serde(default = "default_provider")]
    pub provider: String,
    /// API key for HTTP providers; falls back to `OPENAI_API_KEY`
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Vector size of the hashing provider
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_provider() -> String {
    "hashing".to_string()
}

fn default_base_url() -> String {
    DEFAULT_OPENAI_BASE_URL.to_string()
}

fn default_dimensions() -> usize {
    DEFAULT_HASHING_DIMENSIONS
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: None,
            base_url: default_base_url(),
            dimensions: default_dimensions(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Create the configured embedding provider
pub fn build_embedding_provider(
    settings: &EmbeddingSettings,
) -> Result<Arc<dyn EmbeddingProvider>, DomainError> {
    build_with_env_key(settings, std::env::var(OPENAI_API_KEY_ENV).ok())
}

fn build_with_env_key(
    settings: &EmbeddingSettings,
    env_key: Option<String>,
) -> Result<Arc<dyn EmbeddingProvider>, DomainError> {
    match settings.provider.to_lowercase().as_str() {
        "hashing" => Ok(Arc::new(HashingEmbeddingProvider::new(settings.dimensions)?)),
        "openai" => {
            let api_key = settings
                .api_key
                .clone()
                .or(env_key)
                .filter(|key| !key.trim().is_empty())
                .ok_or_else(|| {
                    DomainError::configuration(format!(
                        "embedding.api_key or {} is required for the openai provider",
                        OPENAI_API_KEY_ENV
                    ))
                })?;

            let client = HttpClient::with_timeout(Duration::from_secs(settings.timeout_secs))?;
            Ok(Arc::new(OpenAiEmbeddingProvider::with_base_url(
                client,
                api_key,
                &settings.base_url,
            )))
        }
        other => Err(DomainError::configuration(format!(
            "Unknown embedding provider: {}",
            other
        ))),
    }
}
