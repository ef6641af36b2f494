//! Year-partitioned datasets on disk
//!
//! ```text
//! <analytics_root>/
//!   log/manifest.json
//!   log/<kind>/year=<YYYY>/<repo|dev>_trend_entry.seg
//!   rollups/<kind>/year=<YYYY>/<repo|dev>_day_presence.seg
//! ```
//!
//! Partitions are write-once: writers build a temporary file next to the
//! target and rename it into place, so readers never observe a half-written
//! partition.

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::segment::{Segment, SegmentBuilder, SegmentRecord};
use crate::storage::types::{DateRange, Entry, Kind, RollupRow};
use chrono::Datelike;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// Directory holding the entry log and manifest
pub const LOG_DIR: &str = "log";

/// Directory holding the presence rollup
pub const ROLLUP_DIR: &str = "rollups";

/// Manifest file name inside the log directory
pub const MANIFEST_FILE: &str = "manifest.json";

const PARTITION_EXT: &str = "seg";

/// A set of year partitions of one dataset, for every kind
#[derive(Debug, Clone)]
pub struct PartitionSet<R: SegmentRecord> {
    base: PathBuf,
    _records: PhantomData<fn() -> R>,
}

impl<R: SegmentRecord> PartitionSet<R> {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            _records: PhantomData,
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Path of the partition file for one kind and year
    pub fn path(&self, kind: Kind, year: i32) -> PathBuf {
        self.base
            .join(kind.as_str())
            .join(format!("year={}", year))
            .join(format!("{}.{}", R::table_name(kind), PARTITION_EXT))
    }

    /// Years that have a partition file for `kind`, ascending
    pub fn years(&self, kind: Kind) -> StorageResult<Vec<i32>> {
        let kind_dir = self.base.join(kind.as_str());
        if !kind_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut years = Vec::new();
        for entry in std::fs::read_dir(&kind_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(year) = name
                .to_str()
                .and_then(|n| n.strip_prefix("year="))
                .and_then(|y| y.parse::<i32>().ok())
            else {
                continue;
            };
            if self.path(kind, year).is_file() {
                years.push(year);
            }
        }

        years.sort_unstable();
        Ok(years)
    }

    /// Read every row of `kind`, or only rows inside `range`
    pub fn scan(&self, kind: Kind, range: Option<&DateRange>) -> StorageResult<Vec<R>> {
        let mut rows = Vec::new();

        for year in self.years(kind)? {
            if let Some(range) = range {
                if !range.years().contains(&year) {
                    continue;
                }
            }

            let path = self.path(kind, year);
            let mut segment = Segment::<R>::open(&path, kind)?;
            match range {
                Some(range) if !segment.overlaps(range) => {}
                Some(range) => rows.extend(segment.read_range(range)?),
                None => rows.extend(segment.read_all()?),
            }
            tracing::trace!(path = %path.display(), rows = rows.len(), "Scanned partition");
        }

        Ok(rows)
    }

    /// Replace the partition for `kind` and `year` with `rows`
    pub fn write(&self, kind: Kind, year: i32, rows: Vec<R>) -> StorageResult<PathBuf> {
        if let Some(stray) = rows.iter().find(|r| r.day().year() != year) {
            return Err(StorageError::InvalidPartition(format!(
                "row dated {} does not belong to year={}",
                stray.day(),
                year
            )));
        }

        let path = self.path(kind, year);
        let tmp = path.with_extension(format!("{}.tmp", PARTITION_EXT));
        if tmp.exists() {
            std::fs::remove_file(&tmp)?;
        }

        let row_count = rows.len();
        let mut builder = SegmentBuilder::<R>::new(&tmp, kind);
        builder.add_rows(rows)?;
        builder.finish()?;
        std::fs::rename(&tmp, &path)?;

        tracing::debug!(
            path = %path.display(),
            rows = row_count,
            schema = R::SCHEMA_NAME,
            "Wrote partition"
        );
        Ok(path)
    }
}

/// The partitioned trend entry log, read-only for queries
#[derive(Debug, Clone)]
pub struct EntryLog {
    root: PathBuf,
    partitions: PartitionSet<Entry>,
}

impl EntryLog {
    pub fn open(analytics_root: impl AsRef<Path>) -> Self {
        let root = analytics_root.as_ref().to_path_buf();
        Self {
            partitions: PartitionSet::new(root.join(LOG_DIR)),
            root,
        }
    }

    pub fn analytics_root(&self) -> &Path {
        &self.root
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.partitions.base().join(MANIFEST_FILE)
    }

    pub fn partition_years(&self, kind: Kind) -> StorageResult<Vec<i32>> {
        self.partitions.years(kind)
    }

    /// Entries of `kind`, optionally restricted to an inclusive range
    pub fn scan(&self, kind: Kind, range: Option<&DateRange>) -> StorageResult<Vec<Entry>> {
        self.partitions.scan(kind, range)
    }

    /// Write one year partition (ETL side)
    pub fn write_partition(&self, kind: Kind, year: i32, entries: Vec<Entry>) -> StorageResult<PathBuf> {
        self.partitions.write(kind, year, entries)
    }

    /// Group entries by year and write one partition per year
    pub fn write_entries(&self, kind: Kind, entries: Vec<Entry>) -> StorageResult<Vec<PathBuf>> {
        let mut by_year: std::collections::BTreeMap<i32, Vec<Entry>> = Default::default();
        for entry in entries {
            by_year.entry(entry.date.year()).or_default().push(entry);
        }
        by_year
            .into_iter()
            .map(|(year, rows)| self.write_partition(kind, year, rows))
            .collect()
    }
}

/// The optional precomputed presence rollup
#[derive(Debug, Clone)]
pub struct RollupStore {
    partitions: PartitionSet<RollupRow>,
}

impl RollupStore {
    /// Rollup location under an analytics root, whether or not it exists
    pub fn at(analytics_root: impl AsRef<Path>) -> Self {
        Self {
            partitions: PartitionSet::new(analytics_root.as_ref().join(ROLLUP_DIR)),
        }
    }

    /// Open the rollup if its directory exists; absence is normal
    pub fn open(analytics_root: impl AsRef<Path>) -> Option<Self> {
        let store = Self::at(analytics_root);
        store.exists().then_some(store)
    }

    pub fn exists(&self) -> bool {
        self.partitions.base().is_dir()
    }

    pub fn partition_path(&self, kind: Kind, year: i32) -> PathBuf {
        self.partitions.path(kind, year)
    }

    pub fn partition_years(&self, kind: Kind) -> StorageResult<Vec<i32>> {
        self.partitions.years(kind)
    }

    /// Rollup rows of `kind` inside `range`
    ///
    /// `log_years` are the entry log's partition years for `kind`; any of
    /// them inside the range without a rollup partition makes the rollup
    /// stale and the scan fails.
    pub fn scan(&self, kind: Kind, range: &DateRange, log_years: &[i32]) -> StorageResult<Vec<RollupRow>> {
        let rollup_years = self.partitions.years(kind)?;
        if rollup_years.is_empty() {
            return Err(StorageError::MissingPartition(format!(
                "no rollup partitions for kind={} under {}",
                kind,
                self.partitions.base().display()
            )));
        }

        if let Some(year) = log_years
            .iter()
            .find(|y| range.years().contains(*y) && !rollup_years.contains(*y))
        {
            return Err(StorageError::MissingPartition(format!(
                "rollup for kind={} lacks year={}",
                kind, year
            )));
        }

        self.partitions.scan(kind, Some(range))
    }

    pub fn write_partition(&self, kind: Kind, year: i32, rows: Vec<RollupRow>) -> StorageResult<PathBuf> {
        self.partitions.write(kind, year, rows)
    }
}
