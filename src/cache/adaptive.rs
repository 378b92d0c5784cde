//! Frequency-adaptive caching over the backend contract.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future;
use metrics::counter;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::config::CacheSettings;

use super::backend::{BackendError, CacheBackend};
use super::patterns::{AccessKind, CacheStats, PatternStore};

/// Errors surfaced by the adaptive cache's write paths.
///
/// Read paths (`smart_get`, `batch_get`) never return these: backend faults
/// there are absorbed and the fallback result is served instead.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("failed to serialize cache value for `{key}`: {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Per-call options for [`AdaptiveCache::smart_get`].
#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    /// Default TTL for the write-back after a miss; the configured default
    /// applies when unset.
    pub ttl: Option<Duration>,
    /// Skip the write-back after a miss. The read still happens; this is
    /// for callers that must not persist a volatile result.
    pub skip_cache: bool,
}

/// One entry of a cache-warming run.
pub struct WarmStrategy<Fut> {
    pub key: String,
    /// Default TTL for the warmed entry; the configured default applies
    /// when unset.
    pub ttl: Option<Duration>,
    pub generator: Fut,
}

/// How a backend read that produced no value ended.
enum ReadMiss {
    /// The key was genuinely absent; a fallback result may be written back.
    Clean,
    /// The backend or the decode failed; serve the fallback without caching.
    Faulted,
}

/// Write-through cache that adapts per-key TTL to observed access frequency.
///
/// Keys seen more often than `ttl_boost_per_minute` get twice the default
/// TTL; keys below `ttl_decay_per_minute` get half. Every operation records
/// into the owned [`PatternStore`], which feeds the hot/cold classification
/// in [`AdaptiveCache::stats`].
///
/// Known race, accepted: two concurrent `smart_get` calls on one key may
/// both miss and both run the fallback; the last writer of the backend
/// entry and of the statistics wins. Callers must not rely on
/// single-flight behavior.
pub struct AdaptiveCache {
    backend: Arc<dyn CacheBackend>,
    patterns: PatternStore,
    settings: CacheSettings,
}

impl AdaptiveCache {
    pub fn new(backend: Arc<dyn CacheBackend>, settings: CacheSettings) -> Self {
        let patterns = PatternStore::new(settings.max_tracked_keys, settings.pattern_idle_after);
        Self {
            backend,
            patterns,
            settings,
        }
    }

    /// Write through with the frequency-adapted default TTL.
    pub async fn smart_set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), CacheError> {
        self.smart_set_with_ttl(key, value, self.settings.default_ttl)
            .await
    }

    /// Write through, adapting `default_ttl` to the key's observed frequency.
    pub async fn smart_set_with_ttl<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        default_ttl: Duration,
    ) -> Result<(), CacheError> {
        let now = OffsetDateTime::now_utc();
        let ttl = self.adaptive_ttl(key, default_ttl, now);
        let payload = serde_json::to_string(value).map_err(|source| CacheError::Serialize {
            key: key.to_string(),
            source,
        })?;

        self.backend.set(key, &payload, ttl).await?;
        self.patterns.record(key, AccessKind::Set, now);
        debug!(
            target: "brio::cache",
            key,
            ttl_secs = ttl.as_secs(),
            "cache entry written"
        );
        Ok(())
    }

    fn adaptive_ttl(&self, key: &str, default_ttl: Duration, now: OffsetDateTime) -> Duration {
        let Some(pattern) = self.patterns.get(key, now) else {
            return default_ttl;
        };

        let frequency = pattern.frequency_per_minute(now);
        if frequency > self.settings.ttl_boost_per_minute {
            default_ttl * 2
        } else if frequency < self.settings.ttl_decay_per_minute {
            default_ttl / 2
        } else {
            default_ttl
        }
    }

    /// Read through the backend, running `fallback` on a miss.
    ///
    /// Backend and decode failures on the read are absorbed: the fallback
    /// runs and its value is returned without caching. Fallback errors
    /// propagate verbatim. A failed write-back after a successful fallback
    /// is logged, never surfaced.
    pub async fn smart_get<T, E, F, Fut>(
        &self,
        key: &str,
        options: GetOptions,
        fallback: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let now = OffsetDateTime::now_utc();

        let miss = match self.backend.get(key).await {
            Ok(Some(payload)) => match serde_json::from_str::<T>(&payload) {
                Ok(value) => {
                    counter!("brio_cache_hit_total").increment(1);
                    self.patterns.record(key, AccessKind::Hit, now);
                    return Ok(value);
                }
                Err(err) => {
                    warn!(
                        target: "brio::cache",
                        key,
                        error = %err,
                        "cached payload failed to decode, falling back"
                    );
                    ReadMiss::Faulted
                }
            },
            Ok(None) => ReadMiss::Clean,
            Err(err) => {
                counter!("brio_cache_backend_error_total").increment(1);
                warn!(
                    target: "brio::cache",
                    key,
                    error = %err,
                    "cache backend read failed, falling back"
                );
                ReadMiss::Faulted
            }
        };

        counter!("brio_cache_miss_total").increment(1);
        self.patterns.record(key, AccessKind::Miss, now);

        let value = fallback().await?;

        if matches!(miss, ReadMiss::Clean) && !options.skip_cache {
            let ttl = options.ttl.unwrap_or(self.settings.default_ttl);
            if let Err(err) = self.smart_set_with_ttl(key, &value, ttl).await {
                warn!(
                    target: "brio::cache",
                    key,
                    error = %err,
                    "write-back after fallback failed"
                );
            }
        }

        Ok(value)
    }

    /// Resolve many keys at once.
    ///
    /// Every key is first classified against the backend (read failures
    /// count as misses), then the missing keys' fallbacks run concurrently
    /// and their results are written back. The fan-out is unbounded; a
    /// caller issuing very many keys is responsible for sizing its backend
    /// connections. The returned map covers every requested key, `None`
    /// where neither the backend nor a fallback had a value. The first
    /// fallback error aborts the batch and propagates.
    pub async fn batch_get<T, E, Fut>(
        &self,
        keys: &[String],
        mut fallbacks: HashMap<String, Fut>,
    ) -> Result<HashMap<String, Option<T>>, E>
    where
        T: Serialize + DeserializeOwned,
        Fut: Future<Output = Result<T, E>>,
    {
        let now = OffsetDateTime::now_utc();
        let mut resolved: HashMap<String, Option<T>> = HashMap::with_capacity(keys.len());
        let mut pending = Vec::new();

        for key in keys {
            match self.backend.get(key).await {
                Ok(Some(payload)) => match serde_json::from_str::<T>(&payload) {
                    Ok(value) => {
                        counter!("brio_cache_hit_total").increment(1);
                        self.patterns.record(key, AccessKind::Hit, now);
                        resolved.insert(key.clone(), Some(value));
                        continue;
                    }
                    Err(err) => {
                        warn!(
                            target: "brio::cache",
                            key = %key,
                            error = %err,
                            "cached payload failed to decode, falling back"
                        );
                    }
                },
                Ok(None) => {}
                Err(err) => {
                    counter!("brio_cache_backend_error_total").increment(1);
                    warn!(
                        target: "brio::cache",
                        key = %key,
                        error = %err,
                        "cache backend read failed, falling back"
                    );
                }
            }

            counter!("brio_cache_miss_total").increment(1);
            self.patterns.record(key, AccessKind::Miss, now);

            match fallbacks.remove(key) {
                Some(generator) => {
                    let key = key.clone();
                    pending.push(async move { generator.await.map(|value| (key, value)) });
                }
                None => {
                    resolved.insert(key.clone(), None);
                }
            }
        }

        let fetched = future::try_join_all(pending).await?;

        for (key, value) in fetched {
            if let Err(err) = self.smart_set(&key, &value).await {
                warn!(
                    target: "brio::cache",
                    key = %key,
                    error = %err,
                    "write-back after batch fallback failed"
                );
            }
            resolved.insert(key, Some(value));
        }

        Ok(resolved)
    }

    /// Run warm-up strategies in order, unconditionally overwriting entries.
    ///
    /// A failing generator or backend write is logged and skipped; the
    /// remaining strategies still run. Returns how many entries were warmed.
    pub async fn warm_cache<T, E, Fut>(&self, strategies: Vec<WarmStrategy<Fut>>) -> usize
    where
        T: Serialize,
        E: std::fmt::Display,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut warmed = 0;

        for strategy in strategies {
            let value = match strategy.generator.await {
                Ok(value) => value,
                Err(err) => {
                    counter!("brio_warm_failed_total").increment(1);
                    warn!(
                        target: "brio::cache",
                        key = %strategy.key,
                        error = %err,
                        "warm generator failed, skipping strategy"
                    );
                    continue;
                }
            };

            let ttl = strategy.ttl.unwrap_or(self.settings.default_ttl);
            match self.smart_set_with_ttl(&strategy.key, &value, ttl).await {
                Ok(()) => {
                    info!(target: "brio::cache", key = %strategy.key, "cache entry warmed");
                    warmed += 1;
                }
                Err(err) => {
                    counter!("brio_warm_failed_total").increment(1);
                    warn!(
                        target: "brio::cache",
                        key = %strategy.key,
                        error = %err,
                        "warm write failed, skipping strategy"
                    );
                }
            }
        }

        warmed
    }

    /// Delete every backend key matching a glob pattern.
    ///
    /// Idempotent: a pattern with no matches deletes nothing and succeeds.
    pub async fn invalidate_pattern(&self, pattern: &str) -> Result<u64, CacheError> {
        let keys = self.backend.keys(pattern).await?;
        if keys.is_empty() {
            return Ok(0);
        }

        let deleted = self.backend.del(&keys).await?;
        info!(target: "brio::cache", pattern, deleted, "invalidated cache entries");
        Ok(deleted)
    }

    /// Aggregate statistics and hot/cold classification over tracked keys.
    pub fn stats(&self) -> CacheStats {
        self.patterns.stats(
            &self.settings.activity_thresholds(),
            OffsetDateTime::now_utc(),
        )
    }
}
