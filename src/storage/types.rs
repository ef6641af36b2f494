//! Core data types for the trend entry log
//!
//! This module defines the fundamental types used throughout the storage layer:
//! - `Kind`: Which trending ranking an entry belongs to
//! - `Identity`: The ranked repository or developer
//! - `Entry`: One ranked appearance on one day under one language bucket
//! - `RollupRow`: Per-identity-per-day aggregate across language buckets
//! - `DateRange`: An inclusive calendar-day interval

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Entity category being ranked
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    /// Trending repositories
    Repository,
    /// Trending developers
    Developer,
}

impl Kind {
    /// Get all kinds for iteration
    pub fn all() -> &'static [Kind] {
        &[Kind::Repository, Kind::Developer]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Repository => "repository",
            Kind::Developer => "developer",
        }
    }

    /// Table name of the entry log partitions for this kind
    pub fn entry_table(&self) -> &'static str {
        match self {
            Kind::Repository => "repo_trend_entry",
            Kind::Developer => "dev_trend_entry",
        }
    }

    /// Table name of the presence rollup partitions for this kind
    pub fn rollup_table(&self) -> &'static str {
        match self {
            Kind::Repository => "repo_day_presence",
            Kind::Developer => "dev_day_presence",
        }
    }

    pub(crate) fn tag(&self) -> u8 {
        match self {
            Kind::Repository => 1,
            Kind::Developer => 2,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Kind> {
        match tag {
            1 => Some(Kind::Repository),
            2 => Some(Kind::Developer),
            _ => None,
        }
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The ranked entity of an entry
///
/// Serializes flat: `{"full_name", "owner"}` for repositories and
/// `{"username"}` for developers.
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(untagged)]
pub enum Identity {
    Repository { full_name: String, owner: String },
    Developer { username: String },
}

impl Identity {
    /// Repository identity; the owner is the `full_name` prefix before `/`
    pub fn repository(full_name: impl Into<String>) -> Self {
        let full_name = full_name.into();
        let owner = full_name
            .split_once('/')
            .map(|(owner, _)| owner.to_string())
            .unwrap_or_else(|| full_name.clone());
        Identity::Repository { full_name, owner }
    }

    pub fn developer(username: impl Into<String>) -> Self {
        Identity::Developer {
            username: username.into(),
        }
    }

    /// Name used for grouping and tie-breaks (full name or username)
    pub fn name(&self) -> &str {
        match self {
            Identity::Repository { full_name, .. } => full_name,
            Identity::Developer { username } => username,
        }
    }

    pub fn owner(&self) -> Option<&str> {
        match self {
            Identity::Repository { owner, .. } => Some(owner),
            Identity::Developer { .. } => None,
        }
    }

    /// Repository name without the owner prefix
    pub fn repo(&self) -> Option<&str> {
        match self {
            Identity::Repository { full_name, .. } => {
                Some(full_name.split_once('/').map(|(_, repo)| repo).unwrap_or(full_name))
            }
            Identity::Developer { .. } => None,
        }
    }

    pub fn kind(&self) -> Kind {
        match self {
            Identity::Repository { .. } => Kind::Repository,
            Identity::Developer { .. } => Kind::Developer,
        }
    }
}

/// One ranked appearance of an identity
///
/// The same identity may appear several times on one day, once per
/// language bucket; `rank` is relative to the bucket.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Entry {
    pub date: NaiveDate,
    pub kind: Kind,
    /// Language bucket, `None` for the all-languages ranking
    pub language: Option<String>,
    /// 1 is best
    pub rank: u32,
    pub identity: Identity,
}

impl Entry {
    /// Create an entry; the kind follows the identity
    pub fn new(date: NaiveDate, language: Option<&str>, rank: u32, identity: Identity) -> Self {
        Self {
            date,
            kind: identity.kind(),
            language: language.map(str::to_string),
            rank,
            identity,
        }
    }

    pub fn repository(date: NaiveDate, language: Option<&str>, rank: u32, full_name: &str) -> Self {
        Self::new(date, language, rank, Identity::repository(full_name))
    }

    pub fn developer(date: NaiveDate, language: Option<&str>, rank: u32, username: &str) -> Self {
        Self::new(date, language, rank, Identity::developer(username))
    }
}

/// Precomputed per-identity-per-day aggregate across language buckets
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RollupRow {
    pub date: NaiveDate,
    pub identity: Identity,
    /// Distinct non-null languages the identity appeared under that day
    pub non_null_languages: u32,
    /// Best rank over every bucket, including the absent-language one
    pub best_rank_any: u32,
    /// Best rank over language-specific buckets only
    pub best_rank_non_null: Option<u32>,
}

/// Inclusive calendar-day interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Create a range; callers validate `start <= end`
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn single(day: NaiveDate) -> Self {
        Self::new(day, day)
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        day >= self.start && day <= self.end
    }

    /// Calendar years touched by the range (partition keys)
    pub fn years(&self) -> RangeInclusive<i32> {
        self.start.year()..=self.end.year()
    }
}

/// Day number used in partition files
pub(crate) fn day_number(date: NaiveDate) -> i32 {
    date.num_days_from_ce()
}

pub(crate) fn from_day_number(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days)
}
