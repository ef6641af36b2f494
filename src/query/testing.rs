//! Shared on-disk fixture for engine and service tests

use crate::manifest::Manifest;
use crate::storage::{Entry, EntryLog, Kind};
use chrono::NaiveDate;
use std::path::Path;

pub(crate) fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

/// Repository rows: alpha/one appears on two days across five buckets;
/// omega/all only in the absent-language bucket.
pub(crate) fn repository_entries() -> Vec<Entry> {
    vec![
        Entry::repository(day("2025-01-01"), None, 1, "omega/all"),
        Entry::repository(day("2025-01-01"), None, 2, "alpha/one"),
        Entry::repository(day("2025-01-01"), Some("python"), 1, "alpha/one"),
        Entry::repository(day("2025-01-01"), Some("rust"), 2, "alpha/one"),
        Entry::repository(day("2025-01-01"), Some("python"), 2, "beta/two"),
        Entry::repository(day("2025-01-02"), None, 1, "alpha/one"),
        Entry::repository(day("2025-01-02"), Some("python"), 1, "alpha/one"),
        Entry::repository(day("2025-01-02"), Some("go"), 1, "gamma/three"),
    ]
}

/// Developer rows: octocat runs 01-01..01-03, misses 01-04, returns 01-05
pub(crate) fn developer_entries() -> Vec<Entry> {
    vec![
        Entry::developer(day("2025-01-01"), None, 1, "octocat"),
        Entry::developer(day("2025-01-01"), Some("rust"), 1, "octocat"),
        Entry::developer(day("2025-01-01"), Some("rust"), 2, "hubot"),
        Entry::developer(day("2025-01-02"), Some("rust"), 1, "octocat"),
        Entry::developer(day("2025-01-03"), Some("rust"), 3, "octocat"),
        Entry::developer(day("2025-01-03"), Some("rust"), 1, "hubot"),
        Entry::developer(day("2025-01-05"), Some("rust"), 1, "octocat"),
    ]
}

/// Write both kinds and the manifest under `root`
pub(crate) fn build_fixture(root: &Path) -> Manifest {
    let log = EntryLog::open(root);
    let mut manifest = Manifest::default();

    for (kind, entries) in [
        (Kind::Repository, repository_entries()),
        (Kind::Developer, developer_entries()),
    ] {
        for entry in &entries {
            manifest
                .kind_mut(kind)
                .record(entry.date, entry.language.as_deref());
        }
        log.write_entries(kind, entries).unwrap();
    }

    manifest.save(log.manifest_path()).unwrap();
    manifest
}
