//! Cache-aside layer.
//!
//! [`CacheStore`] is the key-value backend (in-process or Redis).
//! [`EntityCache`] builds typed, namespaced entries on top of it and never
//! lets a backend failure escape: every error is logged and treated as a miss.

mod entity;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use entity::{EntityCache, ENTITY_TTL, JITTER_MAX_SECS, LIST_TTL, jittered};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache backend error: {0}")]
    Backend(String),

    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Shared key-value store with per-key expiry.
///
/// Patterns use glob syntax where `*` matches any run of characters.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;
    async fn set(&self, key: &str, value: String, ttl: Duration) -> CacheResult<()>;
    async fn delete(&self, keys: &[String]) -> CacheResult<()>;
    async fn delete_pattern(&self, pattern: &str) -> CacheResult<()>;
    async fn keys(&self, pattern: &str) -> CacheResult<Vec<String>>;
}
