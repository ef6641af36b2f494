//! Boundary parameter types
//!
//! Strings arriving from callers are turned into closed types here so the
//! query logic never sees an unchecked kind, presence, date or language.

use crate::query::{AnalyticsError, AnalyticsResult};
use crate::storage::{DateRange, Entry, Kind};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Language parameter value meaning "no specific language"
pub const ALL_LANGUAGES: &str = "__all__";

/// Result limit when the caller does not pass one
pub const DEFAULT_LIMIT: usize = 50;

/// Largest accepted result limit
pub const MAX_LIMIT: usize = 1000;

impl FromStr for Kind {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "repository" => Ok(Kind::Repository),
            "developer" => Ok(Kind::Developer),
            other => Err(AnalyticsError::InvalidRequest(format!("Unsupported kind: {}", other))),
        }
    }
}

/// Counting mode for reappearance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    /// Distinct days; a multi-language day counts once
    #[default]
    Day,
    /// Matching rows; a multi-language day counts once per bucket
    Occurrence,
}

impl Presence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Presence::Day => "day",
            Presence::Occurrence => "occurrence",
        }
    }
}

impl FromStr for Presence {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(Presence::Day),
            "occurrence" => Ok(Presence::Occurrence),
            other => Err(AnalyticsError::InvalidRequest(format!(
                "Unsupported presence: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Presence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which language buckets a query reads
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LanguageFilter {
    /// No specific language, absent-language rows included
    All,
    /// No specific language, absent-language rows dropped
    ExcludeAbsent,
    /// Exactly one language bucket
    Language(String),
}

impl LanguageFilter {
    /// Filter for range queries
    pub fn from_params(language: Option<&str>, include_all_languages: bool) -> Self {
        match language {
            None | Some(ALL_LANGUAGES) if include_all_languages => LanguageFilter::All,
            None | Some(ALL_LANGUAGES) => LanguageFilter::ExcludeAbsent,
            Some(language) => LanguageFilter::Language(language.to_string()),
        }
    }

    /// Filter for the single-day listing
    pub fn for_day(language: Option<&str>) -> Self {
        match language {
            None | Some(ALL_LANGUAGES) => LanguageFilter::All,
            Some(language) => LanguageFilter::Language(language.to_string()),
        }
    }

    /// The specific language requested, if any
    pub fn language(&self) -> Option<&str> {
        match self {
            LanguageFilter::Language(language) => Some(language),
            LanguageFilter::All | LanguageFilter::ExcludeAbsent => None,
        }
    }

    pub fn includes_absent(&self) -> bool {
        matches!(self, LanguageFilter::All)
    }

    /// Row predicate for range queries
    pub fn matches(&self, entry: &Entry) -> bool {
        match self {
            LanguageFilter::All => true,
            LanguageFilter::ExcludeAbsent => entry.language.is_some(),
            LanguageFilter::Language(language) => entry.language.as_deref() == Some(language),
        }
    }

    /// Row predicate for the single-day listing
    ///
    /// "All" selects the absent-language bucket, which already ranks every
    /// language together; it never pulls in the per-language buckets.
    pub fn matches_day(&self, entry: &Entry) -> bool {
        match self {
            LanguageFilter::All => entry.language.is_none(),
            LanguageFilter::ExcludeAbsent => entry.language.is_some(),
            LanguageFilter::Language(language) => entry.language.as_deref() == Some(language),
        }
    }
}

/// Parse a `YYYY-MM-DD` date
pub fn parse_date(value: &str) -> AnalyticsResult<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| AnalyticsError::InvalidRequest(format!("Invalid date (expected YYYY-MM-DD): {}", value)))
}

impl DateRange {
    /// Parse and order-check an inclusive range
    pub fn parse(start: &str, end: &str) -> AnalyticsResult<Self> {
        let start = parse_date(start)?;
        let end = parse_date(end)?;
        if start > end {
            return Err(AnalyticsError::InvalidRequest(
                "Start date must be <= end date".to_string(),
            ));
        }
        Ok(DateRange::new(start, end))
    }
}

/// Check a caller-supplied result limit
pub fn validate_limit(limit: usize) -> AnalyticsResult<usize> {
    match limit {
        0 => Err(AnalyticsError::InvalidRequest("Limit must be at least 1".to_string())),
        n if n > MAX_LIMIT => Err(AnalyticsError::InvalidRequest(format!(
            "Limit must be at most {}",
            MAX_LIMIT
        ))),
        n => Ok(n),
    }
}
