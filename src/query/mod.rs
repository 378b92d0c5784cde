//! Query shaping, heuristic analysis, and execution tracking.
//!
//! [`QueryOptimizer`] builds query text (pagination, search, joins, batch
//! inserts) for an external relational store; the caller executes it and
//! reports timing back through [`QueryOptimizer::track_query`], which feeds
//! [`QueryMetricsStore`]. Analysis is deliberately text-pattern based; see
//! the analyzer module notes.

mod analyzer;
mod metrics;
mod optimizer;

pub use analyzer::{Complexity, IndexAdvice, QueryPlan, analyze_for_indexes, analyze_plan};
pub use metrics::{
    QueryMetric, QueryMetricsStore, QueryStats, SlowQueryRecord, query_shape_hash,
};
pub use optimizer::{
    JoinKind, JoinQueryOptions, JoinSpec, PaginatedQuery, PaginationOptions, QueryOptimizer,
    SearchQueryOptions,
};
