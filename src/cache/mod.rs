//! Result cache
//!
//! - **lru**: Bounded, expiring LRU store with lifetime counters
//! - **key**: Canonical `(operation, parameters)` keys
//!
//! The cache holds values as `Arc<V>`; nothing handed out can mutate a
//! cached result.

mod key;
mod lru;

pub use key::CacheKey;
pub use lru::{CacheStats, ResultCache, DEFAULT_MAX_SIZE, DEFAULT_TTL};
