//! Presence rollup batch job
//!
//! Collapses each day's language buckets into one row per identity:
//! distinct non-null languages, best rank overall, best rank among
//! language-specific buckets. Output is one rollup partition per entry log
//! year. Rebuilding is idempotent.

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::partition::{EntryLog, RollupStore};
use crate::storage::types::{DateRange, Entry, Identity, Kind, RollupRow};
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Outcome of a rollup build
#[derive(Debug, Clone, Serialize)]
pub struct RollupSummary {
    pub kind: Kind,
    pub partitions: Vec<PathBuf>,
    pub rows: usize,
}

#[derive(Default)]
struct DayPresence<'a> {
    languages: BTreeSet<&'a str>,
    best_rank_any: Option<u32>,
    best_rank_non_null: Option<u32>,
}

/// Aggregate entries into one rollup row per (date, identity)
pub fn presence_rows(entries: &[Entry]) -> Vec<RollupRow> {
    let mut days: BTreeMap<(NaiveDate, &Identity), DayPresence<'_>> = BTreeMap::new();

    for entry in entries {
        let acc = days.entry((entry.date, &entry.identity)).or_default();
        acc.best_rank_any = Some(acc.best_rank_any.map_or(entry.rank, |r| r.min(entry.rank)));
        if let Some(language) = entry.language.as_deref() {
            acc.languages.insert(language);
            acc.best_rank_non_null =
                Some(acc.best_rank_non_null.map_or(entry.rank, |r| r.min(entry.rank)));
        }
    }

    days.into_iter()
        .filter_map(|((date, identity), acc)| {
            Some(RollupRow {
                date,
                identity: identity.clone(),
                non_null_languages: acc.languages.len() as u32,
                best_rank_any: acc.best_rank_any?,
                best_rank_non_null: acc.best_rank_non_null,
            })
        })
        .collect()
}

/// Build the presence rollup for `kind` from the entry log
///
/// With `from`, only years at or after `from`'s year are rebuilt.
pub fn build_rollup(
    analytics_root: impl AsRef<Path>,
    kind: Kind,
    from: Option<NaiveDate>,
) -> StorageResult<RollupSummary> {
    let root = analytics_root.as_ref();
    let log = EntryLog::open(root);
    let store = RollupStore::at(root);

    let years = log
        .partition_years(kind)
        .map_err(|e| StorageError::RollupBuild(e.to_string()))?;

    let mut summary = RollupSummary {
        kind,
        partitions: Vec::new(),
        rows: 0,
    };

    for year in years {
        if from.is_some_and(|from| year < from.year()) {
            continue;
        }

        let (Some(start), Some(end)) = (
            NaiveDate::from_ymd_opt(year, 1, 1),
            NaiveDate::from_ymd_opt(year, 12, 31),
        ) else {
            return Err(StorageError::RollupBuild(format!("year out of range: {}", year)));
        };

        let entries = log
            .scan(kind, Some(&DateRange::new(start, end)))
            .map_err(|e| StorageError::RollupBuild(format!("kind={} year={}: {}", kind, year, e)))?;

        let rows = presence_rows(&entries);
        summary.rows += rows.len();
        summary.partitions.push(store.write_partition(kind, year, rows)?);

        tracing::info!(kind = %kind, year, entries = entries.len(), "Rolled up partition");
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_presence_rows_collapse_buckets() {
        let d = day("2025-01-01");
        let entries = vec![
            Entry::repository(d, None, 4, "alpha/one"),
            Entry::repository(d, Some("python"), 2, "alpha/one"),
            Entry::repository(d, Some("rust"), 6, "alpha/one"),
            Entry::repository(d, None, 1, "omega/all"),
        ];

        let rows = presence_rows(&entries);
        assert_eq!(rows.len(), 2);

        let alpha = rows.iter().find(|r| r.identity.name() == "alpha/one").unwrap();
        assert_eq!(alpha.non_null_languages, 2);
        assert_eq!(alpha.best_rank_any, 2);
        assert_eq!(alpha.best_rank_non_null, Some(2));

        let omega = rows.iter().find(|r| r.identity.name() == "omega/all").unwrap();
        assert_eq!(omega.non_null_languages, 0);
        assert_eq!(omega.best_rank_any, 1);
        assert_eq!(omega.best_rank_non_null, None);
    }

    #[test]
    fn test_build_rollup_outputs_files() {
        let dir = tempdir().unwrap();
        let log = EntryLog::open(dir.path());
        log.write_entries(
            Kind::Repository,
            vec![
                Entry::repository(day("2025-01-01"), Some("python"), 1, "alpha/one"),
                Entry::repository(day("2025-01-02"), Some("python"), 1, "alpha/one"),
            ],
        )
        .unwrap();

        let summary = build_rollup(dir.path(), Kind::Repository, None).unwrap();

        assert_eq!(summary.rows, 2);
        let expected = dir
            .path()
            .join("rollups/repository/year=2025/repo_day_presence.seg");
        assert_eq!(summary.partitions, vec![expected.clone()]);
        assert!(expected.exists());

        // Idempotent rebuild
        let first = std::fs::read(&expected).unwrap();
        build_rollup(dir.path(), Kind::Repository, None).unwrap();
        assert_eq!(std::fs::read(&expected).unwrap(), first);
    }

    #[test]
    fn test_build_rollup_from_skips_earlier_years() {
        let dir = tempdir().unwrap();
        let log = EntryLog::open(dir.path());
        log.write_entries(
            Kind::Developer,
            vec![
                Entry::developer(day("2024-06-01"), None, 1, "octocat"),
                Entry::developer(day("2025-06-01"), None, 1, "octocat"),
            ],
        )
        .unwrap();

        let summary = build_rollup(dir.path(), Kind::Developer, Some(day("2025-01-01"))).unwrap();
        assert_eq!(summary.partitions.len(), 1);
        assert_eq!(
            RollupStore::at(dir.path()).partition_years(Kind::Developer).unwrap(),
            vec![2025]
        );
    }

    #[test]
    fn test_build_rollup_bad_input() {
        let dir = tempdir().unwrap();
        let bad = EntryLog::open(dir.path())
            .manifest_path()
            .with_file_name("repository/year=2025/repo_trend_entry.seg");
        std::fs::create_dir_all(bad.parent().unwrap()).unwrap();
        std::fs::write(&bad, b"definitely not a segment").unwrap();

        let err = build_rollup(dir.path(), Kind::Repository, None).unwrap_err();
        assert!(matches!(err, StorageError::RollupBuild(_)));
        assert!(err.to_string().starts_with("Rollup build failed"));
    }
}
