//! In-process cache backend for tests and single-node deployments.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::cache::{BackendError, CacheBackend};

#[derive(Debug, Clone)]
struct StoredEntry {
    value: String,
    expires_at: OffsetDateTime,
}

impl StoredEntry {
    fn expired(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }
}

/// TTL-aware in-memory key/value store.
///
/// Expiry is lazy: entries past their deadline are dropped when touched by
/// a read, never by a background task.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, StoredEntry>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time left before `key` expires, if present and live.
    pub async fn remaining_ttl(&self, key: &str) -> Option<Duration> {
        let now = OffsetDateTime::now_utc();
        let entries = self.entries.read().await;
        let entry = entries.get(key)?;
        if entry.expired(now) {
            return None;
        }
        let remaining = entry.expires_at - now;
        Some(Duration::from_secs_f64(remaining.as_seconds_f64().max(0.0)))
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        let now = OffsetDateTime::now_utc();

        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if !entry.expired(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }

        // Expired: evict under the write lock, re-checking in case a
        // concurrent set refreshed the entry in between.
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get(key) {
            if !entry.expired(now) {
                return Ok(Some(entry.value.clone()));
            }
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), BackendError> {
        let entry = StoredEntry {
            value: value.to_string(),
            expires_at: OffsetDateTime::now_utc() + ttl,
        };
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<u64, BackendError> {
        let mut entries = self.entries.write().await;
        let mut removed = 0u64;
        for key in keys {
            if entries.remove(key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, BackendError> {
        let matcher = glob_regex(pattern)
            .map_err(|err| BackendError::operation(format!("invalid key pattern: {err}")))?;
        let now = OffsetDateTime::now_utc();

        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|(key, entry)| !entry.expired(now) && matcher.is_match(key))
            .map(|(key, _)| key.clone())
            .collect())
    }
}

/// Translate a glob pattern (`*` any run, `?` any single char) into an
/// anchored regex; every other character matches literally.
fn glob_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut translated = String::with_capacity(pattern.len() + 8);
    translated.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => translated.push_str(".*"),
            '?' => translated.push('.'),
            other => translated.push_str(&regex::escape(&other.to_string())),
        }
    }
    translated.push('$');
    Regex::new(&translated)
}
