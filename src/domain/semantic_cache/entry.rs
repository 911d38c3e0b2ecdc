//! Cache entry types

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Token accounting reported by the generation step that produced a response
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// The query half of a cache entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedQuery {
    pub query_text: String,
    /// SHA-256 of the query text, hex encoded
    pub query_hash: String,
    /// Normalized vector; only populated when embeddings are retained
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub task_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl CachedQuery {
    /// Copy of this query without its vector
    pub fn without_embedding(&self) -> Self {
        Self {
            embedding: None,
            ..self.clone()
        }
    }
}

/// The response half of a cache entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub response_text: String,
    #[serde(default)]
    pub tools_used: Vec<String>,
    #[serde(default)]
    pub usage: TokenUsage,
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

fn default_iterations() -> u32 {
    1
}

/// Hash query text the way entries are keyed on disk
pub fn hash_query(query_text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(query_text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Build an entry id from a query hash prefix and the creation instant
pub fn entry_id_for(query_hash: &str, created_at: DateTime<Utc>) -> String {
    let prefix_len = query_hash.len().min(8);
    format!(
        "{}_{}",
        &query_hash[..prefix_len],
        created_at.format("%Y%m%d%H%M%S%6f")
    )
}

/// A stored query/response pair with hit accounting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    entry_id: String,
    query: CachedQuery,
    response: CachedResponse,
    #[serde(default)]
    hit_count: u64,
    #[serde(default)]
    last_hit: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Create a new entry; the query timestamp becomes the creation instant
    pub fn new(entry_id: impl Into<String>, query: CachedQuery, response: CachedResponse) -> Self {
        let created_at = query.timestamp;

        Self {
            entry_id: entry_id.into(),
            query,
            response,
            hit_count: 0,
            last_hit: None,
            created_at,
        }
    }

    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }

    pub fn query(&self) -> &CachedQuery {
        &self.query
    }

    pub fn query_text(&self) -> &str {
        &self.query.query_text
    }

    pub fn response(&self) -> &CachedResponse {
        &self.response
    }

    pub fn hit_count(&self) -> u64 {
        self.hit_count
    }

    pub fn last_hit(&self) -> Option<DateTime<Utc>> {
        self.last_hit
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn embedding(&self) -> Option<&[f32]> {
        self.query.embedding.as_deref()
    }

    pub(crate) fn set_embedding(&mut self, embedding: Option<Vec<f32>>) {
        self.query.embedding = embedding;
    }

    /// Age in fractional hours relative to `now`
    pub fn age_hours(&self, now: DateTime<Utc>) -> f64 {
        (now - self.created_at).num_milliseconds() as f64 / 3_600_000.0
    }

    /// Whether the entry is past the given TTL window
    pub fn is_expired(&self, now: DateTime<Utc>, ttl_hours: u64) -> bool {
        self.age_hours(now) > ttl_hours as f64
    }

    /// Record a qualifying lookup
    pub fn record_hit(&mut self, now: DateTime<Utc>) {
        self.hit_count += 1;
        self.last_hit = Some(now);
    }

    /// Shift the creation instant into the past
    #[cfg(test)]
    pub(crate) fn backdate(&mut self, by: chrono::Duration) {
        self.created_at -= by;
        self.query.timestamp = self.created_at;
    }
}

/// Everything needed to store a response for a query
#[derive(Debug, Clone)]
pub struct CacheStoreRequest {
    pub query_text: String,
    pub response_text: String,
    pub conversation_id: Option<String>,
    pub task_id: Option<String>,
    pub tools_used: Vec<String>,
    pub usage: TokenUsage,
    pub iterations: u32,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl CacheStoreRequest {
    pub fn new(query_text: impl Into<String>, response_text: impl Into<String>) -> Self {
        Self {
            query_text: query_text.into(),
            response_text: response_text.into(),
            conversation_id: None,
            task_id: None,
            tools_used: Vec::new(),
            usage: TokenUsage::default(),
            iterations: 1,
            metadata: HashMap::new(),
        }
    }

    pub fn with_conversation_id(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }

    pub fn with_task_id(mut self, id: impl Into<String>) -> Self {
        self.task_id = Some(id.into());
        self
    }

    pub fn with_tools_used(mut self, tools: Vec<String>) -> Self {
        self.tools_used = tools;
        self
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = usage;
        self
    }

    /// Set the iteration count; values below 1 are raised to 1
    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations.max(1);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Split into the query and response records for an entry created at `now`
    pub fn into_parts(self, now: DateTime<Utc>) -> (CachedQuery, CachedResponse) {
        let query = CachedQuery {
            query_hash: hash_query(&self.query_text),
            query_text: self.query_text,
            embedding: None,
            conversation_id: self.conversation_id,
            task_id: self.task_id,
            timestamp: now,
        };

        let response = CachedResponse {
            response_text: self.response_text,
            tools_used: self.tools_used,
            usage: self.usage,
            iterations: self.iterations.max(1),
            metadata: self.metadata,
        };

        (query, response)
    }
}

/// What a successful lookup returns
#[derive(Debug, Clone, Serialize)]
pub struct CacheHit {
    pub entry_id: String,
    /// Query metadata; never carries the vector
    pub query: CachedQuery,
    pub response: CachedResponse,
    pub similarity_score: f32,
    pub hit_count: u64,
    pub age_hours: f64,
}
