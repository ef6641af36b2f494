//! Trend Query Engine
//!
//! Answers the analytical questions over the entry log:
//!
//! - **params**: Closed boundary types (Presence, LanguageFilter, limits)
//! - **request**: Raw caller requests, validated by the engine
//! - **rows**: Typed result rows
//! - **aggregate**: Ranking algorithms (reappearance, owners, languages,
//!   newcomers, gap-and-island streaks)
//! - **executor**: Validation, rollup fast path and entry log fallback
//!
//! # Example
//!
//! ```rust,no_run
//! use almanac::query::{QueryConfig, QueryEngine, ReappearingRequest, TrendQueries};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = QueryEngine::new(QueryConfig::new("./analytics"))?;
//!
//!     let rows = engine.top_reappearing(
//!         &ReappearingRequest::new("repository", "2025-01-01", "2025-01-31")
//!             .presence("occurrence")
//!             .limit(10),
//!     )?;
//!
//!     for row in rows {
//!         println!("{} {}", row.identity.name(), row.days_present);
//!     }
//!     Ok(())
//! }
//! ```

pub mod aggregate;
mod error;
mod executor;
pub mod params;
mod request;
mod rows;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{AnalyticsError, AnalyticsResult};
pub use executor::{QueryConfig, QueryEngine, TrendQueries};
pub use params::{LanguageFilter, Presence, ALL_LANGUAGES, DEFAULT_LIMIT, MAX_LIMIT};
pub use request::{DayRequest, LanguagesRequest, OwnersRequest, RangeRequest, ReappearingRequest};
pub use rows::{
    LanguageRow, NewcomerRow, OwnerRow, RankedEntry, ReappearingRow, StreakRow, Tabular,
};
