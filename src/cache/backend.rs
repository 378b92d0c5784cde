//! The consumed cache-backend contract.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Failure reported by the external cache backend.
///
/// Read paths inside this crate absorb these and fall back to the direct
/// data path; write paths surface them to the caller.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("cache backend operation failed: {0}")]
    Operation(String),
}

impl BackendError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    pub fn operation(message: impl Into<String>) -> Self {
        Self::Operation(message.into())
    }
}

/// Key/value cache backend with per-entry TTL.
///
/// Values round-trip as serialized text; serialization happens at this
/// crate's boundary, the backend only ever sees strings. Implementations
/// own their own timeout policy; this crate never retries.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Fetch the value stored under `key`, `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, BackendError>;

    /// Store `value` under `key`, expiring after `ttl`.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), BackendError>;

    /// Delete every listed key, returning how many existed.
    async fn del(&self, keys: &[String]) -> Result<u64, BackendError>;

    /// List live keys matching a Redis-style glob (`*`, `?`).
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, BackendError>;
}
