//! End-to-end flow over the public API: search input validation feeding the
//! query builders, execution tracking, and the adaptive cache over the
//! in-memory backend.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use regex::Regex;
use serde_json::json;

use brio::cache::{AdaptiveCache, GetOptions, generate_key, KeyOptions};
use brio::config::{CacheSettings, QuerySettings};
use brio::infra::MemoryBackend;
use brio::query::{QueryMetricsStore, QueryOptimizer, SearchQueryOptions};
use brio::search::{SearchToken, accent_insensitive_pattern};

fn optimizer() -> QueryOptimizer {
    let settings = QuerySettings::default();
    QueryOptimizer::new(Arc::new(QueryMetricsStore::new(&settings)), settings)
}

#[test]
fn validated_search_input_drives_the_ranked_builder() {
    let token = SearchToken::parse("  cà phê  ").expect("valid term");
    assert_eq!(token.as_str(), "cà phê");

    let sql = optimizer().optimize_search_query(
        "SELECT * FROM posts",
        token.as_str(),
        &["title".to_string(), "body".to_string()],
        &SearchQueryOptions::default(),
    );

    assert!(sql.contains("plainto_tsquery('cà phê')"));
    assert!(sql.contains("ORDER BY"));
    assert!(sql.ends_with("LIMIT 20"));
}

#[test]
fn accent_insensitive_pattern_matches_folded_text() {
    let token = SearchToken::parse("ca phe").expect("valid term");
    let pattern = accent_insensitive_pattern(&token);
    let regex = Regex::new(&pattern).expect("valid regex");

    assert!(regex.is_match("cà phê"));
    assert!(regex.is_match("cá phé"));
    assert!(regex.is_match("ca phe"));
    assert!(!regex.is_match("co phe"));
}

#[test]
fn tracked_executions_surface_in_stats_and_the_slow_log() {
    let optimizer = optimizer();
    let query = "SELECT * FROM posts WHERE status = 'published'";

    optimizer.track_query(query, Duration::from_millis(12), 40);
    optimizer.track_query(query, Duration::from_millis(1_800), 40);

    let stats = optimizer.stats();
    assert_eq!(stats.total_queries, 2);
    assert_eq!(stats.slow_query_count, 1);

    let slow = optimizer.slow_queries();
    assert_eq!(slow.len(), 1);
    assert!(slow[0].query_text.starts_with("SELECT * FROM posts"));
}

#[tokio::test]
async fn cache_flow_from_generated_key_to_invalidation() {
    let cache = AdaptiveCache::new(
        Arc::new(MemoryBackend::new()),
        CacheSettings::default(),
    );

    let mut params = serde_json::Map::new();
    params.insert("tag".to_string(), json!("rust"));
    params.insert("limit".to_string(), json!(20));
    let key = generate_key("posts:list", &params, &KeyOptions::default());
    assert_eq!(key, "posts:list:limit=20:tag=rust");

    // First read misses and runs the fallback.
    let ran = AtomicBool::new(false);
    let fetched: Result<Vec<String>, Infallible> = cache
        .smart_get(&key, GetOptions::default(), || async {
            ran.store(true, Ordering::SeqCst);
            Ok(vec!["post-1".to_string()])
        })
        .await;
    assert_eq!(fetched.expect("fallback value"), ["post-1"]);
    assert!(ran.load(Ordering::SeqCst));

    // Second read is served from cache.
    let ran_again = AtomicBool::new(false);
    let cached: Result<Vec<String>, Infallible> = cache
        .smart_get(&key, GetOptions::default(), || async {
            ran_again.store(true, Ordering::SeqCst);
            Ok(Vec::new())
        })
        .await;
    assert_eq!(cached.expect("cached value"), ["post-1"]);
    assert!(!ran_again.load(Ordering::SeqCst));

    let stats = cache.stats();
    assert!(stats.tracked_keys >= 1);

    assert_eq!(
        cache.invalidate_pattern("posts:list:*").await.expect("first"),
        1
    );
    assert_eq!(
        cache.invalidate_pattern("posts:list:*").await.expect("second"),
        0
    );
}

#[tokio::test]
async fn batch_get_mixes_cached_and_generated_values() {
    let cache = AdaptiveCache::new(
        Arc::new(MemoryBackend::new()),
        CacheSettings::default(),
    );
    cache.smart_set("views:1", &10u64).await.expect("set");

    let keys = ["views:1", "views:2"].map(String::from);
    let mut fallbacks = HashMap::new();
    fallbacks.insert("views:2".to_string(), async { Ok::<u64, Infallible>(20) });

    let resolved = cache.batch_get(&keys, fallbacks).await.expect("batch");
    assert_eq!(resolved["views:1"], Some(10));
    assert_eq!(resolved["views:2"], Some(20));
}
