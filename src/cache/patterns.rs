//! Per-key access statistics behind the adaptive cache.

use std::num::NonZeroUsize;
use std::time::Duration;

use dashmap::DashMap;
use metrics::counter;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::debug;

/// What one observation of a key represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Hit,
    Miss,
    Set,
}

/// Cumulative access statistics for a single cache key.
///
/// Invariant: `hits + misses <= count`. Set observations bump `count`
/// without touching the hit/miss split.
#[derive(Debug, Clone)]
pub struct AccessPattern {
    pub count: u64,
    pub hits: u64,
    pub misses: u64,
    pub first_access: OffsetDateTime,
    pub last_access: OffsetDateTime,
}

impl AccessPattern {
    fn new(kind: AccessKind, now: OffsetDateTime) -> Self {
        let mut pattern = Self {
            count: 0,
            hits: 0,
            misses: 0,
            first_access: now,
            last_access: now,
        };
        pattern.observe(kind, now);
        pattern
    }

    fn observe(&mut self, kind: AccessKind, now: OffsetDateTime) {
        self.count += 1;
        match kind {
            AccessKind::Hit => self.hits += 1,
            AccessKind::Miss => self.misses += 1,
            AccessKind::Set => {}
        }
        self.last_access = now;
    }

    /// Observations per minute since the key was first seen.
    ///
    /// Elapsed time is clamped to one minute so a brand-new key reads as its
    /// raw observation count rather than an unbounded rate.
    pub fn frequency_per_minute(&self, now: OffsetDateTime) -> f64 {
        let minutes = ((now - self.first_access).as_seconds_f64() / 60.0).max(1.0);
        self.count as f64 / minutes
    }

    /// Share of observations that were cache hits.
    pub fn hit_rate(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.hits as f64 / self.count as f64
        }
    }

    fn idle_longer_than(&self, idle: Duration, now: OffsetDateTime) -> bool {
        (now - self.last_access).whole_seconds() > idle.as_secs() as i64
    }
}

/// Classification cutoffs for [`PatternStore::stats`].
#[derive(Debug, Clone, Copy)]
pub struct ActivityThresholds {
    pub hot_frequency: f64,
    pub hot_hit_rate: f64,
    pub cold_frequency: f64,
    pub cold_hit_rate: f64,
}

/// Frequency and hit rate of a single key, as classified by
/// [`PatternStore::stats`].
#[derive(Debug, Clone, Serialize)]
pub struct KeyActivity {
    pub key: String,
    pub frequency_per_minute: f64,
    pub hit_rate: f64,
}

/// Aggregate snapshot over all tracked keys.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub tracked_keys: usize,
    /// `Σhits / Σcount` across every tracked pattern.
    pub overall_hit_rate: f64,
    /// Frequently and successfully accessed keys, busiest first.
    pub hot_keys: Vec<KeyActivity>,
    /// Rarely or unreliably accessed keys, quietest first.
    pub cold_keys: Vec<KeyActivity>,
}

/// Process-local store of per-key [`AccessPattern`]s.
///
/// Bounded two ways: entries idle longer than `idle_after` are swept inline
/// before an insertion that would cross `max_keys`, and a stale entry is
/// dropped lazily when it is read. State is discardable on restart.
///
/// The sharded map gives atomic per-key read-modify-write; cross-key
/// operations (sweep, stats) see a best-effort snapshot.
pub struct PatternStore {
    entries: DashMap<String, AccessPattern>,
    max_keys: usize,
    idle_after: Duration,
}

impl PatternStore {
    pub fn new(max_keys: NonZeroUsize, idle_after: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            max_keys: max_keys.get(),
            idle_after,
        }
    }

    /// Record one observation of `key`, creating the pattern on first sight.
    pub fn record(&self, key: &str, kind: AccessKind, now: OffsetDateTime) {
        if !self.entries.contains_key(key) && self.entries.len() >= self.max_keys {
            self.sweep(now);
        }

        self.entries
            .entry(key.to_string())
            .and_modify(|pattern| pattern.observe(kind, now))
            .or_insert_with(|| AccessPattern::new(kind, now));
    }

    /// Snapshot the pattern for `key`, dropping it first when it has idled out.
    pub fn get(&self, key: &str, now: OffsetDateTime) -> Option<AccessPattern> {
        let stale = match self.entries.get(key) {
            Some(pattern) if pattern.idle_longer_than(self.idle_after, now) => true,
            Some(pattern) => return Some(pattern.clone()),
            None => return None,
        };

        if stale {
            self.entries.remove(key);
        }
        None
    }

    /// Drop every entry idle longer than the configured window.
    pub fn sweep(&self, now: OffsetDateTime) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, pattern| !pattern.idle_longer_than(self.idle_after, now));

        let pruned = before.saturating_sub(self.entries.len());
        if pruned > 0 {
            counter!("brio_patterns_pruned_total").increment(pruned as u64);
            debug!(
                pruned,
                remaining = self.entries.len(),
                "pruned idle access patterns"
            );
        }
        pruned
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Aggregate statistics plus hot/cold key classification.
    pub fn stats(&self, thresholds: &ActivityThresholds, now: OffsetDateTime) -> CacheStats {
        let mut total_count = 0u64;
        let mut total_hits = 0u64;
        let mut hot = Vec::new();
        let mut cold = Vec::new();

        for entry in self.entries.iter() {
            let pattern = entry.value();
            total_count += pattern.count;
            total_hits += pattern.hits;

            let activity = KeyActivity {
                key: entry.key().clone(),
                frequency_per_minute: pattern.frequency_per_minute(now),
                hit_rate: pattern.hit_rate(),
            };

            if activity.frequency_per_minute > thresholds.hot_frequency
                && activity.hit_rate > thresholds.hot_hit_rate
            {
                hot.push(activity);
            } else if activity.frequency_per_minute < thresholds.cold_frequency
                || activity.hit_rate < thresholds.cold_hit_rate
            {
                cold.push(activity);
            }
        }

        hot.sort_by(|a, b| b.frequency_per_minute.total_cmp(&a.frequency_per_minute));
        cold.sort_by(|a, b| a.frequency_per_minute.total_cmp(&b.frequency_per_minute));

        CacheStats {
            tracked_keys: self.entries.len(),
            overall_hit_rate: if total_count == 0 {
                0.0
            } else {
                total_hits as f64 / total_count as f64
            },
            hot_keys: hot,
            cold_keys: cold,
        }
    }
}
