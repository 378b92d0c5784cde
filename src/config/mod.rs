//! Configuration layer: typed settings with layered precedence (file → environment).

use std::num::NonZeroUsize;
use std::str::FromStr;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::cache::ActivityThresholds;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "brio";

const DEFAULT_CACHE_TTL_SECS: u64 = 3_600;
const DEFAULT_TTL_BOOST_PER_MINUTE: f64 = 10.0;
const DEFAULT_TTL_DECAY_PER_MINUTE: f64 = 1.0;
const DEFAULT_HOT_FREQUENCY_PER_MINUTE: f64 = 5.0;
const DEFAULT_HOT_HIT_RATE: f64 = 0.8;
const DEFAULT_COLD_FREQUENCY_PER_MINUTE: f64 = 0.5;
const DEFAULT_COLD_HIT_RATE: f64 = 0.3;
const DEFAULT_MAX_TRACKED_KEYS: usize = 1_000;
const DEFAULT_PATTERN_IDLE_SECS: u64 = 3_600;

const DEFAULT_SLOW_QUERY_THRESHOLD_MS: u64 = 1_000;
const DEFAULT_SLOW_LOG_CAPACITY: usize = 100;
const DEFAULT_MAX_TRACKED_SHAPES: usize = 1_000;
const DEFAULT_LARGE_OFFSET_WARNING: u64 = 10_000;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub query: QuerySettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

/// Tuning for the adaptive cache and its pattern store.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// TTL used when a key's access frequency gives no reason to adapt.
    pub default_ttl: Duration,
    /// Frequency above which the default TTL is doubled.
    pub ttl_boost_per_minute: f64,
    /// Frequency below which the default TTL is halved.
    pub ttl_decay_per_minute: f64,
    pub hot_frequency_per_minute: f64,
    pub hot_hit_rate: f64,
    pub cold_frequency_per_minute: f64,
    pub cold_hit_rate: f64,
    /// Pattern-store key budget; an insertion past it triggers an idle sweep.
    pub max_tracked_keys: NonZeroUsize,
    /// Idle window after which a tracked pattern is swept.
    pub pattern_idle_after: Duration,
}

impl CacheSettings {
    pub fn activity_thresholds(&self) -> ActivityThresholds {
        ActivityThresholds {
            hot_frequency: self.hot_frequency_per_minute,
            hot_hit_rate: self.hot_hit_rate,
            cold_frequency: self.cold_frequency_per_minute,
            cold_hit_rate: self.cold_hit_rate,
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            ttl_boost_per_minute: DEFAULT_TTL_BOOST_PER_MINUTE,
            ttl_decay_per_minute: DEFAULT_TTL_DECAY_PER_MINUTE,
            hot_frequency_per_minute: DEFAULT_HOT_FREQUENCY_PER_MINUTE,
            hot_hit_rate: DEFAULT_HOT_HIT_RATE,
            cold_frequency_per_minute: DEFAULT_COLD_FREQUENCY_PER_MINUTE,
            cold_hit_rate: DEFAULT_COLD_HIT_RATE,
            max_tracked_keys: NonZeroUsize::new(DEFAULT_MAX_TRACKED_KEYS)
                .expect("default key budget is non-zero"),
            pattern_idle_after: Duration::from_secs(DEFAULT_PATTERN_IDLE_SECS),
        }
    }
}

/// Tuning for query tracking and pagination warnings.
#[derive(Debug, Clone)]
pub struct QuerySettings {
    /// Executions longer than this land in the slow-query log.
    pub slow_query_threshold: Duration,
    pub slow_log_capacity: NonZeroUsize,
    /// Shape-metric budget; least-recently-updated shapes are evicted past it.
    pub max_tracked_shapes: NonZeroUsize,
    /// LIMIT/OFFSET offsets above this are flagged as a scalability smell.
    pub large_offset_warning: u64,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            slow_query_threshold: Duration::from_millis(DEFAULT_SLOW_QUERY_THRESHOLD_MS),
            slow_log_capacity: NonZeroUsize::new(DEFAULT_SLOW_LOG_CAPACITY)
                .expect("default slow-log capacity is non-zero"),
            max_tracked_shapes: NonZeroUsize::new(DEFAULT_MAX_TRACKED_SHAPES)
                .expect("default shape budget is non-zero"),
            large_offset_warning: DEFAULT_LARGE_OFFSET_WARNING,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment).
pub fn load() -> Result<Settings, LoadError> {
    let raw: RawSettings = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false))
        .add_source(Environment::with_prefix("BRIO").separator("__"))
        .build()?
        .try_deserialize()?;

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    query: RawQuerySettings,
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            cache,
            query,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            cache: build_cache_settings(cache)?,
            query: build_query_settings(query)?,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let defaults = CacheSettings::default();

    let default_ttl_secs = cache.default_ttl_seconds.unwrap_or(DEFAULT_CACHE_TTL_SECS);
    if default_ttl_secs == 0 {
        return Err(LoadError::invalid(
            "cache.default_ttl_seconds",
            "must be greater than zero",
        ));
    }

    let ttl_boost = cache
        .ttl_boost_per_minute
        .unwrap_or(DEFAULT_TTL_BOOST_PER_MINUTE);
    let ttl_decay = cache
        .ttl_decay_per_minute
        .unwrap_or(DEFAULT_TTL_DECAY_PER_MINUTE);
    if ttl_boost <= ttl_decay {
        return Err(LoadError::invalid(
            "cache.ttl_boost_per_minute",
            "must exceed cache.ttl_decay_per_minute",
        ));
    }

    let hot_hit_rate = cache.hot_hit_rate.unwrap_or(DEFAULT_HOT_HIT_RATE);
    let cold_hit_rate = cache.cold_hit_rate.unwrap_or(DEFAULT_COLD_HIT_RATE);
    validate_rate(hot_hit_rate, "cache.hot_hit_rate")?;
    validate_rate(cold_hit_rate, "cache.cold_hit_rate")?;

    let max_tracked_keys = non_zero_usize(
        cache.max_tracked_keys.unwrap_or(DEFAULT_MAX_TRACKED_KEYS),
        "cache.max_tracked_keys",
    )?;

    let pattern_idle_secs = cache
        .pattern_idle_seconds
        .unwrap_or(DEFAULT_PATTERN_IDLE_SECS);
    if pattern_idle_secs == 0 {
        return Err(LoadError::invalid(
            "cache.pattern_idle_seconds",
            "must be greater than zero",
        ));
    }

    Ok(CacheSettings {
        default_ttl: Duration::from_secs(default_ttl_secs),
        ttl_boost_per_minute: ttl_boost,
        ttl_decay_per_minute: ttl_decay,
        hot_frequency_per_minute: cache
            .hot_frequency_per_minute
            .unwrap_or(defaults.hot_frequency_per_minute),
        hot_hit_rate,
        cold_frequency_per_minute: cache
            .cold_frequency_per_minute
            .unwrap_or(defaults.cold_frequency_per_minute),
        cold_hit_rate,
        max_tracked_keys,
        pattern_idle_after: Duration::from_secs(pattern_idle_secs),
    })
}

fn build_query_settings(query: RawQuerySettings) -> Result<QuerySettings, LoadError> {
    let threshold_ms = query
        .slow_query_threshold_ms
        .unwrap_or(DEFAULT_SLOW_QUERY_THRESHOLD_MS);
    if threshold_ms == 0 {
        return Err(LoadError::invalid(
            "query.slow_query_threshold_ms",
            "must be greater than zero",
        ));
    }

    Ok(QuerySettings {
        slow_query_threshold: Duration::from_millis(threshold_ms),
        slow_log_capacity: non_zero_usize(
            query.slow_log_capacity.unwrap_or(DEFAULT_SLOW_LOG_CAPACITY),
            "query.slow_log_capacity",
        )?,
        max_tracked_shapes: non_zero_usize(
            query
                .max_tracked_shapes
                .unwrap_or(DEFAULT_MAX_TRACKED_SHAPES),
            "query.max_tracked_shapes",
        )?,
        large_offset_warning: query
            .large_offset_warning
            .unwrap_or(DEFAULT_LARGE_OFFSET_WARNING),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    default_ttl_seconds: Option<u64>,
    ttl_boost_per_minute: Option<f64>,
    ttl_decay_per_minute: Option<f64>,
    hot_frequency_per_minute: Option<f64>,
    hot_hit_rate: Option<f64>,
    cold_frequency_per_minute: Option<f64>,
    cold_hit_rate: Option<f64>,
    max_tracked_keys: Option<usize>,
    pattern_idle_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawQuerySettings {
    slow_query_threshold_ms: Option<u64>,
    slow_log_capacity: Option<usize>,
    max_tracked_shapes: Option<usize>,
    large_offset_warning: Option<u64>,
}

fn validate_rate(value: f64, key: &'static str) -> Result<(), LoadError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(LoadError::invalid(key, "must be between 0 and 1"));
    }
    Ok(())
}

fn non_zero_usize(value: usize, key: &'static str) -> Result<NonZeroUsize, LoadError> {
    NonZeroUsize::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
