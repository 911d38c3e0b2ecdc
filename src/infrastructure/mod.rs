//! Infrastructure layer - External service implementations

pub mod embedding;
pub mod logging;
pub mod observability;
pub mod semantic_cache;
pub mod services;
