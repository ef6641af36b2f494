//! # Almanac
//!
//! Trend analytics over daily GitHub trending rankings: which repositories
//! and developers keep reappearing, who is new, who holds the longest
//! consecutive-day streak.
//!
//! ## Features
//!
//! - **Partitioned storage**: Year-partitioned columnar segments with LZ4 compression
//! - **Rollup fast path**: Precomputed per-day presence, with transparent fallback
//! - **Manifest validation**: Requests checked against known dates and languages
//! - **Result cache**: Bounded LRU with expiry, statistics and next-day prewarming
//!
//! ## Modules
//!
//! - [`storage`]: Entry log, presence rollup and the rollup batch job
//! - [`manifest`]: Catalog of dates and languages per kind
//! - [`query`]: Query engine and ranking algorithms
//! - [`cache`]: Result cache and canonical keys
//! - [`service`]: Cached async front of the query engine
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use almanac::{QueryConfig, QueryEngine, ResultCache, TrendService};
//! use almanac::query::DayRequest;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = QueryEngine::new(QueryConfig::new("./analytics"))?;
//!     let service = TrendService::new(Arc::new(engine), Arc::new(ResultCache::default()));
//!
//!     let listing = service
//!         .get_day(DayRequest::new("repository", "2025-01-01").language("rust"))
//!         .await?;
//!     println!("{} entries", listing.len());
//!
//!     // Let the next-day prewarm finish before exiting
//!     service.drain_prewarm().await;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod manifest;
pub mod query;
pub mod service;
pub mod storage;

// Re-export top-level types for convenience
pub use storage::{
    build_rollup, DateRange, Entry, EntryLog, Identity, Kind, RollupRow, RollupStore,
    RollupSummary, StorageError, StorageResult,
};

pub use manifest::{Manifest, ManifestKind};

pub use query::{
    AnalyticsError, AnalyticsResult, LanguageFilter, Presence, QueryConfig, QueryEngine,
    TrendQueries,
};

pub use cache::{CacheKey, CacheStats, ResultCache};

pub use service::{QueryOutput, TrendService};

pub use config::{generate_default_config, Config, ConfigError, LoggingConfig};
