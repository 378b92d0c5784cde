//! Per-query-shape timing statistics and the slow-query log.

use std::collections::VecDeque;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use std::time::Duration;

use lru::LruCache;
use metrics::{counter, histogram};
use serde::Serialize;
use time::OffsetDateTime;

use crate::cache::lock::mutex_lock;
use crate::config::QuerySettings;

const SOURCE: &str = "query::metrics";
const SAMPLE_TEXT_CHARS: usize = 100;
const SLOW_TEXT_CHARS: usize = 200;
const TOP_SLOWEST: usize = 5;

/// Stable grouping hash over full query text.
///
/// Collision-tolerant: only ever used to group metrics by query shape,
/// never for correctness-sensitive lookups.
pub fn query_shape_hash(query: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    query.hash(&mut hasher);
    hasher.finish()
}

/// Cumulative timing statistics for one query shape.
#[derive(Debug, Clone, Serialize)]
pub struct QueryMetric {
    /// Leading fragment of the query text, for diagnostics.
    pub sample_text: String,
    pub count: u64,
    pub total_duration: Duration,
    pub max_duration: Duration,
    pub min_duration: Duration,
}

impl QueryMetric {
    fn new(query: &str, duration: Duration) -> Self {
        Self {
            sample_text: truncate_chars(query, SAMPLE_TEXT_CHARS),
            count: 1,
            total_duration: duration,
            max_duration: duration,
            min_duration: duration,
        }
    }

    fn observe(&mut self, duration: Duration) {
        self.count += 1;
        self.total_duration += duration;
        self.max_duration = self.max_duration.max(duration);
        self.min_duration = self.min_duration.min(duration);
    }

    /// Mean execution time; `min <= avg <= max` holds once `count >= 1`.
    pub fn avg_duration(&self) -> Duration {
        if self.count == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.total_duration.as_secs_f64() / self.count as f64)
    }
}

/// One slow execution, kept in a fixed-capacity FIFO log.
#[derive(Debug, Clone, Serialize)]
pub struct SlowQueryRecord {
    pub query_text: String,
    pub duration: Duration,
    pub timestamp: OffsetDateTime,
    pub result_count: u64,
}

/// Aggregate snapshot across all tracked shapes.
#[derive(Debug, Clone, Serialize)]
pub struct QueryStats {
    /// Total tracked executions.
    pub total_queries: u64,
    /// Duration-weighted mean across every execution.
    pub avg_duration: Duration,
    /// Current slow-query log length.
    pub slow_query_count: usize,
    /// Up to five shapes with the highest `max_duration`.
    pub slowest: Vec<QueryMetric>,
}

/// Bounded store of query-shape metrics plus the slow-query log.
///
/// Shape metrics live under an LRU cap: once the budget is reached, the
/// least-recently-updated shape is evicted. The slow log is a FIFO ring,
/// oldest evicted first. State is discardable on restart.
pub struct QueryMetricsStore {
    metrics: Mutex<LruCache<u64, QueryMetric>>,
    slow_log: Mutex<VecDeque<SlowQueryRecord>>,
    slow_threshold: Duration,
    slow_capacity: usize,
}

impl QueryMetricsStore {
    pub fn new(settings: &QuerySettings) -> Self {
        Self {
            metrics: Mutex::new(LruCache::new(settings.max_tracked_shapes)),
            slow_log: Mutex::new(VecDeque::with_capacity(settings.slow_log_capacity.get())),
            slow_threshold: settings.slow_query_threshold,
            slow_capacity: settings.slow_log_capacity.get(),
        }
    }

    /// Record one execution of `query`.
    pub fn record(&self, query: &str, duration: Duration, result_count: u64) {
        let shape = query_shape_hash(query);

        {
            let mut metrics = mutex_lock(&self.metrics, SOURCE, "record.metrics");
            match metrics.get_mut(&shape) {
                Some(metric) => metric.observe(duration),
                None => {
                    metrics.put(shape, QueryMetric::new(query, duration));
                }
            }
        }

        histogram!("brio_query_duration_ms").record(duration.as_secs_f64() * 1_000.0);

        if duration > self.slow_threshold {
            counter!("brio_slow_query_total").increment(1);

            let mut slow_log = mutex_lock(&self.slow_log, SOURCE, "record.slow_log");
            if slow_log.len() == self.slow_capacity {
                slow_log.pop_front();
            }
            slow_log.push_back(SlowQueryRecord {
                query_text: truncate_chars(query, SLOW_TEXT_CHARS),
                duration,
                timestamp: OffsetDateTime::now_utc(),
                result_count,
            });
        }
    }

    /// Snapshot the metric for one query shape, if tracked.
    pub fn metric_for(&self, query: &str) -> Option<QueryMetric> {
        let metrics = mutex_lock(&self.metrics, SOURCE, "metric_for");
        metrics.peek(&query_shape_hash(query)).cloned()
    }

    /// Snapshot of the slow-query log, oldest first.
    pub fn slow_queries(&self) -> Vec<SlowQueryRecord> {
        mutex_lock(&self.slow_log, SOURCE, "slow_queries")
            .iter()
            .cloned()
            .collect()
    }

    /// Aggregate statistics across all tracked shapes.
    pub fn stats(&self) -> QueryStats {
        let metrics = mutex_lock(&self.metrics, SOURCE, "stats.metrics");

        let mut total_queries = 0u64;
        let mut total_duration = Duration::ZERO;
        let mut snapshot: Vec<QueryMetric> = Vec::with_capacity(metrics.len());

        for (_, metric) in metrics.iter() {
            total_queries += metric.count;
            total_duration += metric.total_duration;
            snapshot.push(metric.clone());
        }
        drop(metrics);

        snapshot.sort_by(|a, b| b.max_duration.cmp(&a.max_duration));
        snapshot.truncate(TOP_SLOWEST);

        QueryStats {
            total_queries,
            avg_duration: if total_queries == 0 {
                Duration::ZERO
            } else {
                Duration::from_secs_f64(total_duration.as_secs_f64() / total_queries as f64)
            },
            slow_query_count: mutex_lock(&self.slow_log, SOURCE, "stats.slow_log").len(),
            slowest: snapshot,
        }
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}
