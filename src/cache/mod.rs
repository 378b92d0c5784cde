//! Adaptive caching over an external key/value backend.
//!
//! The backend (Redis-shaped: get/set/del/keys with per-entry TTL) is an
//! injected collaborator behind [`CacheBackend`]. On top of it,
//! [`AdaptiveCache`] adapts per-key TTLs to observed access frequency and
//! classifies keys as hot or cold from the statistics kept in
//! [`PatternStore`].
//!
//! ## Configuration
//!
//! Tuning lives in `brio.toml`:
//!
//! ```toml
//! [cache]
//! default_ttl_seconds = 3600
//! ttl_boost_per_minute = 10.0
//! ttl_decay_per_minute = 1.0
//! max_tracked_keys = 1000
//! # ... see config for all options
//! ```

mod adaptive;
mod backend;
mod keys;
pub(crate) mod lock;
mod patterns;

pub use adaptive::{AdaptiveCache, CacheError, GetOptions, WarmStrategy};
pub use backend::{BackendError, CacheBackend};
pub use keys::{KeyOptions, generate_key};
pub use patterns::{
    AccessKind, AccessPattern, ActivityThresholds, CacheStats, KeyActivity, PatternStore,
};
