//! Query-text builders and execution tracking.
//!
//! Everything here emits plain query text for an external executor; the
//! optimizer never runs a query itself. Timing flows back in through
//! [`QueryOptimizer::track_query`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::QuerySettings;

use super::analyzer::{self, IndexAdvice, QueryPlan};
use super::metrics::{QueryMetricsStore, QueryStats, SlowQueryRecord};

const MIN_RANKED_TERM_CHARS: usize = 3;
const DEFAULT_SEARCH_LIMIT: u64 = 20;
const DEFAULT_JOIN_ROW_ESTIMATE: u64 = 1_000;
const DEFAULT_BATCH_INSERT_SIZE: usize = 1_000;

/// Options for [`QueryOptimizer::optimize_pagination`].
#[derive(Debug, Clone, Default)]
pub struct PaginationOptions {
    /// Last seen value of `cursor_field`; both must be set for the
    /// cursor-bounded rewrite.
    pub cursor: Option<String>,
    pub cursor_field: Option<String>,
}

/// Pagination rewrite output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginatedQuery {
    pub sql: String,
    /// Set when LIMIT/OFFSET pagination was emitted with an offset past the
    /// configured warning threshold. Surfaced, not blocked.
    pub large_offset: bool,
}

/// Options for [`QueryOptimizer::optimize_search_query`].
#[derive(Debug, Clone, Default)]
pub struct SearchQueryOptions {
    /// Short terms match with `ILIKE` contains instead of equality.
    pub fuzzy: bool,
    /// Per-field relevance weights for ranked search; absent fields weigh 1.
    pub boost_fields: BTreeMap<String, f64>,
    /// Equality filters appended to every generated query, in key order.
    pub filters: BTreeMap<String, Value>,
    /// Row limit; 20 when unset.
    pub limit: Option<u64>,
}

/// One join clause for [`QueryOptimizer::optimize_join_query`].
#[derive(Debug, Clone)]
pub struct JoinSpec {
    pub table: String,
    /// Join condition text, e.g. `posts.tag_id = tags.id`.
    pub on: String,
    pub kind: JoinKind,
    /// Estimated row count used for join ordering; unknown tables assume
    /// 1000 rows.
    pub estimated_rows: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinKind {
    #[default]
    Inner,
    Left,
}

impl JoinKind {
    fn keyword(self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
        }
    }
}

/// Options for [`QueryOptimizer::optimize_join_query`].
#[derive(Debug, Clone, Default)]
pub struct JoinQueryOptions {
    /// Projection columns; `*` when unset or empty.
    pub select_fields: Option<Vec<String>>,
}

/// Builds optimized query text and records execution timings into the
/// injected [`QueryMetricsStore`].
pub struct QueryOptimizer {
    metrics: Arc<QueryMetricsStore>,
    settings: QuerySettings,
}

impl QueryOptimizer {
    pub fn new(metrics: Arc<QueryMetricsStore>, settings: QuerySettings) -> Self {
        Self { metrics, settings }
    }

    /// Rewrite pagination onto `base_query`.
    ///
    /// With a cursor and cursor field the query becomes cursor-bounded: a
    /// `field > cursor` condition lands before the ordering clause and only
    /// `LIMIT` is emitted. Otherwise `LIMIT/OFFSET` is appended; offsets
    /// past the warning threshold are flagged in the result and logged.
    pub fn optimize_pagination(
        &self,
        base_query: &str,
        limit: u64,
        offset: u64,
        options: &PaginationOptions,
    ) -> PaginatedQuery {
        if let (Some(cursor), Some(field)) =
            (options.cursor.as_deref(), options.cursor_field.as_deref())
        {
            let condition = format!("{field} > '{}'", escape_sql_text(cursor));
            let connector = if analyzer::has_where(base_query) {
                "AND"
            } else {
                "WHERE"
            };

            let sql = match analyzer::order_by_position(base_query) {
                Some(position) => {
                    let (head, ordering) = base_query.split_at(position);
                    format!(
                        "{} {connector} {condition} {ordering} LIMIT {limit}",
                        head.trim_end()
                    )
                }
                None => format!("{base_query} {connector} {condition} LIMIT {limit}"),
            };

            return PaginatedQuery {
                sql,
                large_offset: false,
            };
        }

        let large_offset = offset > self.settings.large_offset_warning;
        if large_offset {
            warn!(
                target: "brio::query",
                offset,
                threshold = self.settings.large_offset_warning,
                "large OFFSET pagination, consider a cursor"
            );
        }

        PaginatedQuery {
            sql: format!("{base_query} LIMIT {limit} OFFSET {offset}"),
            large_offset,
        }
    }

    /// Build a search query over `fields`.
    ///
    /// Terms shorter than three characters use the exact-match builder
    /// (per-field equality, or `ILIKE` contains under `fuzzy`,
    /// OR-combined). Longer terms use the ranked builder: per-field
    /// full-text matches OR-combined, ordered by a weighted `ts_rank` sum
    /// descending. Both append the configured equality filters and a
    /// trailing `LIMIT`.
    pub fn optimize_search_query(
        &self,
        base_query: &str,
        term: &str,
        fields: &[String],
        options: &SearchQueryOptions,
    ) -> String {
        let term = escape_sql_text(term);
        let connector = if analyzer::has_where(base_query) {
            "AND"
        } else {
            "WHERE"
        };

        let ranked = term.chars().count() >= MIN_RANKED_TERM_CHARS;

        let match_clause = if ranked {
            let matches: Vec<String> = fields
                .iter()
                .map(|field| format!("to_tsvector({field}) @@ plainto_tsquery('{term}')"))
                .collect();
            format!("({})", matches.join(" OR "))
        } else {
            let matches: Vec<String> = fields
                .iter()
                .map(|field| {
                    if options.fuzzy {
                        format!("{field} ILIKE '%{term}%'")
                    } else {
                        format!("{field} = '{term}'")
                    }
                })
                .collect();
            format!("({})", matches.join(" OR "))
        };

        let mut conditions = vec![match_clause];
        for (field, value) in &options.filters {
            conditions.push(format!("{field} = {}", sql_literal(value)));
        }

        let mut sql = format!("{base_query} {connector} {}", conditions.join(" AND "));

        if ranked {
            let rank: Vec<String> = fields
                .iter()
                .map(|field| {
                    let weight = options.boost_fields.get(field).copied().unwrap_or(1.0);
                    format!("ts_rank(to_tsvector({field}), plainto_tsquery('{term}')) * {weight}")
                })
                .collect();
            sql.push_str(&format!(" ORDER BY ({}) DESC", rank.join(" + ")));
        }

        sql.push_str(&format!(
            " LIMIT {}",
            options.limit.unwrap_or(DEFAULT_SEARCH_LIMIT)
        ));
        sql
    }

    /// Assemble a join query with smaller estimated tables attached first.
    ///
    /// Joins are sorted ascending by estimated row count (stable for ties)
    /// to bound intermediate result size; conditions are AND-combined after
    /// the join clauses.
    pub fn optimize_join_query(
        &self,
        base_table: &str,
        joins: &[JoinSpec],
        conditions: &[String],
        options: &JoinQueryOptions,
    ) -> String {
        let projection = match options.select_fields.as_deref() {
            Some(fields) if !fields.is_empty() => fields.join(", "),
            _ => "*".to_string(),
        };

        let mut ordered: Vec<&JoinSpec> = joins.iter().collect();
        ordered.sort_by_key(|join| join.estimated_rows.unwrap_or(DEFAULT_JOIN_ROW_ESTIMATE));

        let mut sql = format!("SELECT {projection} FROM {base_table}");
        for join in ordered {
            sql.push_str(&format!(
                " {} {} ON {}",
                join.kind.keyword(),
                join.table,
                join.on
            ));
        }
        if !conditions.is_empty() {
            sql.push_str(&format!(" WHERE {}", conditions.join(" AND ")));
        }
        sql
    }

    /// Chunk `rows` into batched INSERT statements.
    ///
    /// Column order comes from the first row's keys (sorted); row order is
    /// preserved within and across chunks. `batch_size` is clamped to at
    /// least one; zero rows yield zero statements.
    pub fn create_batch_insert(
        &self,
        table: &str,
        rows: &[BTreeMap<String, Value>],
        batch_size: Option<usize>,
    ) -> Vec<String> {
        let Some(first) = rows.first() else {
            return Vec::new();
        };
        let batch_size = batch_size.unwrap_or(DEFAULT_BATCH_INSERT_SIZE).max(1);

        let columns: Vec<&String> = first.keys().collect();
        let column_list = columns
            .iter()
            .map(|column| column.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        rows.chunks(batch_size)
            .map(|chunk| {
                let tuples: Vec<String> = chunk
                    .iter()
                    .map(|row| {
                        let values: Vec<String> = columns
                            .iter()
                            .map(|column| {
                                row.get(*column)
                                    .map_or_else(|| "NULL".to_string(), sql_literal)
                            })
                            .collect();
                        format!("({})", values.join(", "))
                    })
                    .collect();
                format!(
                    "INSERT INTO {table} ({column_list}) VALUES {}",
                    tuples.join(", ")
                )
            })
            .collect()
    }

    /// Syntactic index advisories for a query.
    pub fn analyze_for_indexes(&self, query: &str) -> Vec<IndexAdvice> {
        analyzer::analyze_for_indexes(query)
    }

    /// Heuristic cost/complexity summary plus index advisories.
    pub fn analyze_plan(&self, query: &str) -> QueryPlan {
        analyzer::analyze_plan(query)
    }

    /// Record one execution reported back by the caller.
    ///
    /// The data store's own failures never pass through here: the caller
    /// surfaces those unchanged and simply has nothing to report.
    pub fn track_query(&self, query: &str, duration: Duration, result_count: u64) {
        if duration > self.settings.slow_query_threshold {
            warn!(
                target: "brio::query",
                duration_ms = duration.as_millis() as u64,
                result_count,
                "slow query tracked"
            );
        } else {
            debug!(
                target: "brio::query",
                duration_ms = duration.as_millis() as u64,
                result_count,
                "query tracked"
            );
        }
        self.metrics.record(query, duration, result_count);
    }

    /// Aggregate execution statistics.
    pub fn stats(&self) -> QueryStats {
        self.metrics.stats()
    }

    /// Snapshot of the slow-query log, oldest first.
    pub fn slow_queries(&self) -> Vec<SlowQueryRecord> {
        self.metrics.slow_queries()
    }
}

fn sql_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Number(number) => number.to_string(),
        Value::String(text) => format!("'{}'", escape_sql_text(text)),
        other => format!("'{}'", escape_sql_text(&other.to_string())),
    }
}

fn escape_sql_text(text: &str) -> String {
    text.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn optimizer() -> QueryOptimizer {
        QueryOptimizer::new(
            Arc::new(QueryMetricsStore::new(&QuerySettings::default())),
            QuerySettings::default(),
        )
    }

    #[test]
    fn cursor_pagination_lands_before_the_ordering_clause() {
        let result = optimizer().optimize_pagination(
            "SELECT * FROM posts ORDER BY id ASC",
            25,
            0,
            &PaginationOptions {
                cursor: Some("41".to_string()),
                cursor_field: Some("id".to_string()),
            },
        );

        assert_eq!(
            result.sql,
            "SELECT * FROM posts WHERE id > '41' ORDER BY id ASC LIMIT 25"
        );
        assert!(!result.large_offset);
    }

    #[test]
    fn cursor_pagination_extends_an_existing_where() {
        let result = optimizer().optimize_pagination(
            "SELECT * FROM posts WHERE status = 'published' ORDER BY id",
            10,
            0,
            &PaginationOptions {
                cursor: Some("x".to_string()),
                cursor_field: Some("id".to_string()),
            },
        );

        assert_eq!(
            result.sql,
            "SELECT * FROM posts WHERE status = 'published' AND id > 'x' ORDER BY id LIMIT 10"
        );
    }

    #[test]
    fn offset_pagination_flags_large_offsets() {
        let optimizer = optimizer();

        let small =
            optimizer.optimize_pagination("SELECT * FROM posts", 10, 10_000, &PaginationOptions::default());
        assert_eq!(small.sql, "SELECT * FROM posts LIMIT 10 OFFSET 10000");
        assert!(!small.large_offset);

        let large =
            optimizer.optimize_pagination("SELECT * FROM posts", 10, 10_001, &PaginationOptions::default());
        assert!(large.large_offset);
    }

    #[test]
    fn cursor_values_are_escaped() {
        let result = optimizer().optimize_pagination(
            "SELECT * FROM posts",
            10,
            0,
            &PaginationOptions {
                cursor: Some("o'hare".to_string()),
                cursor_field: Some("slug".to_string()),
            },
        );

        assert!(result.sql.contains("slug > 'o''hare'"));
    }

    #[test]
    fn short_terms_use_exact_matching() {
        let sql = optimizer().optimize_search_query(
            "SELECT * FROM posts",
            "ab",
            &["title".to_string(), "slug".to_string()],
            &SearchQueryOptions::default(),
        );

        assert_eq!(
            sql,
            "SELECT * FROM posts WHERE (title = 'ab' OR slug = 'ab') LIMIT 20"
        );
    }

    #[test]
    fn short_terms_with_fuzzy_use_contains() {
        let options = SearchQueryOptions {
            fuzzy: true,
            ..SearchQueryOptions::default()
        };
        let sql = optimizer().optimize_search_query(
            "SELECT * FROM posts",
            "ab",
            &["title".to_string()],
            &options,
        );

        assert!(sql.contains("title ILIKE '%ab%'"));
    }

    #[test]
    fn long_terms_rank_by_weighted_relevance() {
        let mut boost_fields = BTreeMap::new();
        boost_fields.insert("title".to_string(), 2.0);
        let options = SearchQueryOptions {
            boost_fields,
            limit: Some(5),
            ..SearchQueryOptions::default()
        };

        let sql = optimizer().optimize_search_query(
            "SELECT * FROM posts",
            "rust",
            &["title".to_string(), "body".to_string()],
            &options,
        );

        assert!(sql.contains("to_tsvector(title) @@ plainto_tsquery('rust')"));
        assert!(sql.contains("ts_rank(to_tsvector(title), plainto_tsquery('rust')) * 2"));
        assert!(sql.contains("ts_rank(to_tsvector(body), plainto_tsquery('rust')) * 1"));
        assert!(sql.contains("ORDER BY ("));
        assert!(sql.ends_with("DESC LIMIT 5"));
    }

    #[test]
    fn filters_apply_before_the_ordering_clause() {
        let mut filters = BTreeMap::new();
        filters.insert("status".to_string(), json!("published"));
        filters.insert("author_id".to_string(), json!(7));
        let options = SearchQueryOptions {
            filters,
            ..SearchQueryOptions::default()
        };

        let sql = optimizer().optimize_search_query(
            "SELECT * FROM posts",
            "rust",
            &["title".to_string()],
            &options,
        );

        // Filters in key order, ahead of ORDER BY.
        let filter_pos = sql.find("author_id = 7").expect("filter present");
        assert!(sql.find("status = 'published'").expect("filter present") > filter_pos);
        assert!(sql.find("ORDER BY").expect("ranked") > filter_pos);
    }

    #[test]
    fn joins_are_ordered_by_estimated_rows() {
        let joins = vec![
            JoinSpec {
                table: "events".to_string(),
                on: "events.post_id = posts.id".to_string(),
                kind: JoinKind::Inner,
                estimated_rows: Some(1_000_000),
            },
            JoinSpec {
                table: "tags".to_string(),
                on: "tags.id = posts.tag_id".to_string(),
                kind: JoinKind::Left,
                estimated_rows: Some(50),
            },
            JoinSpec {
                table: "users".to_string(),
                on: "users.id = posts.user_id".to_string(),
                kind: JoinKind::Inner,
                estimated_rows: None,
            },
        ];

        let sql = optimizer().optimize_join_query(
            "posts",
            &joins,
            &["posts.status = 'published'".to_string()],
            &JoinQueryOptions::default(),
        );

        assert_eq!(
            sql,
            "SELECT * FROM posts \
             LEFT JOIN tags ON tags.id = posts.tag_id \
             INNER JOIN users ON users.id = posts.user_id \
             INNER JOIN events ON events.post_id = posts.id \
             WHERE posts.status = 'published'"
        );
    }

    #[test]
    fn join_projection_narrows_with_select_fields() {
        let options = JoinQueryOptions {
            select_fields: Some(vec!["posts.id".to_string(), "posts.title".to_string()]),
        };
        let sql = optimizer().optimize_join_query("posts", &[], &[], &options);

        assert_eq!(sql, "SELECT posts.id, posts.title FROM posts");
    }

    #[test]
    fn batch_insert_chunks_preserve_row_order() {
        let rows: Vec<BTreeMap<String, Value>> = (0..5)
            .map(|index| {
                let mut row = BTreeMap::new();
                row.insert("id".to_string(), json!(index));
                row.insert("name".to_string(), json!(format!("row-{index}")));
                row
            })
            .collect();

        let statements = optimizer().create_batch_insert("items", &rows, Some(2));

        assert_eq!(statements.len(), 3);
        assert_eq!(
            statements[0],
            "INSERT INTO items (id, name) VALUES (0, 'row-0'), (1, 'row-1')"
        );
        assert_eq!(
            statements[2],
            "INSERT INTO items (id, name) VALUES (4, 'row-4')"
        );
    }

    #[test]
    fn batch_insert_clamps_batch_size_and_handles_empty_input() {
        let optimizer = optimizer();
        assert!(optimizer.create_batch_insert("items", &[], Some(10)).is_empty());

        let mut row = BTreeMap::new();
        row.insert("flag".to_string(), json!(true));
        row.insert("note".to_string(), Value::Null);
        let statements = optimizer.create_batch_insert("items", &[row.clone(), row], Some(0));

        // Clamped to one row per statement.
        assert_eq!(statements.len(), 2);
        assert_eq!(
            statements[0],
            "INSERT INTO items (flag, note) VALUES (TRUE, NULL)"
        );
    }

    #[test]
    fn tracked_queries_reach_the_metrics_store() {
        let optimizer = optimizer();
        optimizer.track_query("SELECT 1", Duration::from_millis(10), 1);
        optimizer.track_query("SELECT 1", Duration::from_millis(1_500), 1);

        let stats = optimizer.stats();
        assert_eq!(stats.total_queries, 2);
        assert_eq!(stats.slow_query_count, 1);
        assert_eq!(optimizer.slow_queries().len(), 1);
    }
}
