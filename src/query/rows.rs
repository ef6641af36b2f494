//! Result rows returned by the query engine

use crate::storage::Identity;
use chrono::NaiveDate;
use serde::Serialize;

/// Rows that can be rendered as a flat table (CLI table/CSV output)
pub trait Tabular {
    fn headers(&self) -> Vec<&'static str>;
    fn cells(&self) -> Vec<String>;
}

fn identity_headers(identity: &Identity) -> Vec<&'static str> {
    match identity {
        Identity::Repository { .. } => vec!["full_name", "owner"],
        Identity::Developer { .. } => vec!["username"],
    }
}

fn identity_cells(identity: &Identity) -> Vec<String> {
    match identity {
        Identity::Repository { full_name, owner } => vec![full_name.clone(), owner.clone()],
        Identity::Developer { username } => vec![username.clone()],
    }
}

/// One entry of a single-day listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedEntry {
    pub rank: u32,
    #[serde(flatten)]
    pub identity: Identity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
}

impl RankedEntry {
    pub fn new(rank: u32, identity: Identity) -> Self {
        let repo = identity.repo().map(str::to_string);
        Self { rank, identity, repo }
    }
}

impl Tabular for RankedEntry {
    fn headers(&self) -> Vec<&'static str> {
        let mut headers = vec!["rank"];
        headers.extend(identity_headers(&self.identity));
        headers
    }

    fn cells(&self) -> Vec<String> {
        let mut cells = vec![self.rank.to_string()];
        cells.extend(identity_cells(&self.identity));
        cells
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReappearingRow {
    #[serde(flatten)]
    pub identity: Identity,
    pub days_present: u64,
    pub best_rank: u32,
}

impl Tabular for ReappearingRow {
    fn headers(&self) -> Vec<&'static str> {
        let mut headers = identity_headers(&self.identity);
        headers.extend(["days_present", "best_rank"]);
        headers
    }

    fn cells(&self) -> Vec<String> {
        let mut cells = identity_cells(&self.identity);
        cells.extend([self.days_present.to_string(), self.best_rank.to_string()]);
        cells
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OwnerRow {
    pub owner: String,
    pub repos_present: u64,
    pub best_rank: u32,
}

impl Tabular for OwnerRow {
    fn headers(&self) -> Vec<&'static str> {
        vec!["owner", "repos_present", "best_rank"]
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.owner.clone(),
            self.repos_present.to_string(),
            self.best_rank.to_string(),
        ]
    }
}

/// Entry count of one language bucket; `None` is the absent-language bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LanguageRow {
    pub language: Option<String>,
    pub entries: u64,
}

impl Tabular for LanguageRow {
    fn headers(&self) -> Vec<&'static str> {
        vec!["language", "entries"]
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.language.clone().unwrap_or_default(),
            self.entries.to_string(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewcomerRow {
    #[serde(flatten)]
    pub identity: Identity,
    pub first_seen: NaiveDate,
    pub best_rank: u32,
}

impl Tabular for NewcomerRow {
    fn headers(&self) -> Vec<&'static str> {
        let mut headers = identity_headers(&self.identity);
        headers.extend(["first_seen", "best_rank"]);
        headers
    }

    fn cells(&self) -> Vec<String> {
        let mut cells = identity_cells(&self.identity);
        cells.extend([self.first_seen.to_string(), self.best_rank.to_string()]);
        cells
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreakRow {
    #[serde(flatten)]
    pub identity: Identity,
    pub streak_start: NaiveDate,
    pub streak_end: NaiveDate,
    pub streak_len: u32,
    pub best_rank: u32,
}

impl Tabular for StreakRow {
    fn headers(&self) -> Vec<&'static str> {
        let mut headers = identity_headers(&self.identity);
        headers.extend(["streak_start", "streak_end", "streak_len", "best_rank"]);
        headers
    }

    fn cells(&self) -> Vec<String> {
        let mut cells = identity_cells(&self.identity);
        cells.extend([
            self.streak_start.to_string(),
            self.streak_end.to_string(),
            self.streak_len.to_string(),
            self.best_rank.to_string(),
        ]);
        cells
    }
}
