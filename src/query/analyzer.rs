//! Heuristic, text-pattern query analysis.
//!
//! Deliberately approximate: advisories and cost scores come from regex
//! scans of the query text, never from an execution plan, and they never
//! consult actual index metadata. Consumers stay on this interface so a
//! plan-based source can replace it without changing the advisory contract.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static WHERE_EQUALITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bWHERE\s+([A-Za-z_][\w.]*)\s*=").expect("where-equality pattern")
});
static ORDER_BY_COLUMN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bORDER\s+BY\s+([A-Za-z_][\w.]*)").expect("order-by pattern")
});
static JOIN_ON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\bJOIN\s+[A-Za-z_][\w.]*(?:\s+[A-Za-z_]\w*)?\s+ON\s+([A-Za-z_][\w.]*)\s*=\s*([A-Za-z_][\w.]*)",
    )
    .expect("join-on pattern")
});

static JOIN_KEYWORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bJOIN\b").expect("join keyword"));
static WHERE_KEYWORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bWHERE\b").expect("where keyword"));
static ORDER_BY_KEYWORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bORDER\s+BY\b").expect("order-by keyword"));
static FROM_KEYWORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bFROM\b").expect("from keyword"));
static CONDITION_KEYWORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:WHERE|AND|OR)\b").expect("condition keyword"));
static AGGREGATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:COUNT|SUM|AVG|MIN|MAX)\s*\(|\bGROUP\s+BY\b").expect("aggregation pattern")
});
static SUBQUERY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\(\s*SELECT\b").expect("subquery pattern"));

/// One syntactic index advisory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IndexAdvice {
    /// Equality filter over a column.
    WhereEquality { column: String },
    /// Sort over a column.
    OrderBy { column: String },
    /// Join condition between two columns.
    JoinOn { left: String, right: String },
}

impl IndexAdvice {
    /// Human-readable phrasing for admin surfaces.
    pub fn suggestion(&self) -> String {
        match self {
            Self::WhereEquality { column } => {
                format!("consider an index on `{column}` for equality filtering")
            }
            Self::OrderBy { column } => {
                format!("consider an index on `{column}` to avoid a sort")
            }
            Self::JoinOn { left, right } => {
                format!("consider indexes on `{left}` and `{right}` for the join")
            }
        }
    }
}

/// Complexity bucket over a weighted structural score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

/// Heuristic cost and complexity summary for one query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryPlan {
    pub estimated_cost: f64,
    pub complexity: Complexity,
    pub index_advice: Vec<IndexAdvice>,
}

/// Scan query text for index opportunities; one advisory per match.
pub fn analyze_for_indexes(query: &str) -> Vec<IndexAdvice> {
    let mut advice = Vec::new();

    for captures in WHERE_EQUALITY.captures_iter(query) {
        advice.push(IndexAdvice::WhereEquality {
            column: captures[1].to_string(),
        });
    }
    for captures in ORDER_BY_COLUMN.captures_iter(query) {
        advice.push(IndexAdvice::OrderBy {
            column: captures[1].to_string(),
        });
    }
    for captures in JOIN_ON.captures_iter(query) {
        advice.push(IndexAdvice::JoinOn {
            left: captures[1].to_string(),
            right: captures[2].to_string(),
        });
    }

    advice
}

/// Score a query from text structure alone.
///
/// Cost is `1 + 2×joins + 0.5×wheres + 1.5×order-bys + 3×subqueries`; the
/// complexity bucket weighs `tables + conditions + 2×aggregations +
/// 3×subqueries` (low < 10, medium ≤ 20, high above).
pub fn analyze_plan(query: &str) -> QueryPlan {
    let joins = JOIN_KEYWORD.find_iter(query).count();
    let wheres = WHERE_KEYWORD.find_iter(query).count();
    let order_bys = ORDER_BY_KEYWORD.find_iter(query).count();
    let subqueries = SUBQUERY.find_iter(query).count();

    let estimated_cost = 1.0
        + 2.0 * joins as f64
        + 0.5 * wheres as f64
        + 1.5 * order_bys as f64
        + 3.0 * subqueries as f64;

    let tables = FROM_KEYWORD.find_iter(query).count() + joins;
    let conditions = CONDITION_KEYWORD.find_iter(query).count();
    let aggregations = AGGREGATION.find_iter(query).count();
    let score = tables + conditions + 2 * aggregations + 3 * subqueries;

    let complexity = if score < 10 {
        Complexity::Low
    } else if score <= 20 {
        Complexity::Medium
    } else {
        Complexity::High
    };

    QueryPlan {
        estimated_cost,
        complexity,
        index_advice: analyze_for_indexes(query),
    }
}

/// Whether the query already carries a WHERE clause.
pub(crate) fn has_where(query: &str) -> bool {
    WHERE_KEYWORD.is_match(query)
}

/// Byte position of the first ORDER BY clause, if any.
pub(crate) fn order_by_position(query: &str) -> Option<usize> {
    ORDER_BY_KEYWORD.find(query).map(|found| found.start())
}
