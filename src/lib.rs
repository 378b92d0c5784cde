//! Brio query acceleration core.
//!
//! Three cooperating pieces sit between application use-cases and two
//! external collaborators: a TTL key/value cache backend and a relational
//! store reached via query text.
//!
//! - [`cache::AdaptiveCache`] adapts per-key TTLs to observed access
//!   frequency and absorbs backend faults on its read paths.
//! - [`query::QueryOptimizer`] builds pagination, search, join, and batch
//!   insert query text, scores queries heuristically, and tracks execution
//!   timings reported back by the caller.
//! - [`search`] validates raw search input and builds accent-insensitive
//!   regex patterns over the Vietnamese alphabet.
//!
//! The crate owns no I/O besides the injected [`cache::CacheBackend`]. The
//! relational store is driven by the caller: it executes the query text
//! built here and reports durations through
//! [`query::QueryOptimizer::track_query`].

pub mod cache;
pub mod config;
pub mod infra;
pub mod query;
pub mod search;

pub use cache::{AdaptiveCache, BackendError, CacheBackend, CacheError, CacheStats};
pub use config::{CacheSettings, LoadError, LoggingSettings, QuerySettings, Settings};
pub use query::{QueryMetricsStore, QueryOptimizer, QueryPlan, QueryStats};
pub use search::{SearchError, SearchToken};
