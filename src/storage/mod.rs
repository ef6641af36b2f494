//! Trend storage
//!
//! This module provides the on-disk datasets the query engine reads:
//!
//! - **types**: Core data structures (Kind, Identity, Entry, RollupRow, DateRange)
//! - **compression**: Columnar block encoding + LZ4 compression
//! - **segment**: Segment file format
//! - **partition**: Year-partitioned entry log and rollup store
//! - **rollup**: Batch job deriving the presence rollup from the entry log
//! - **error**: Error types
//!
//! # Architecture
//!
//! ```text
//! ETL Path:
//!   Entries → Group by year → Encode blocks → Segment (tmp + rename)
//!
//! Rollup Path:
//!   Entry log year → Collapse language buckets → Rollup segment
//!
//! Read Path:
//!   Query → Partition years in range → Block index → Decompress → Filter
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use almanac::storage::{build_rollup, DateRange, Entry, EntryLog, Kind};
//! use chrono::NaiveDate;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let log = EntryLog::open("./analytics");
//!     let day = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
//!
//!     log.write_entries(Kind::Repository, vec![
//!         Entry::repository(day, Some("rust"), 1, "alpha/one"),
//!     ])?;
//!     build_rollup("./analytics", Kind::Repository, None)?;
//!
//!     let entries = log.scan(Kind::Repository, Some(&DateRange::single(day)))?;
//!     assert_eq!(entries.len(), 1);
//!     Ok(())
//! }
//! ```

pub mod compression;
pub mod error;
pub mod partition;
pub mod rollup;
pub mod segment;
pub mod types;

// Re-export commonly used types
pub use compression::{ENTRY_SCHEMA, ROLLUP_SCHEMA};
pub use error::{StorageError, StorageResult};
pub use partition::{EntryLog, PartitionSet, RollupStore, LOG_DIR, MANIFEST_FILE, ROLLUP_DIR};
pub use rollup::{build_rollup, presence_rows, RollupSummary};
pub use segment::{BlockMeta, Segment, SegmentBuilder, SegmentHeader, SegmentRecord};
pub use types::{DateRange, Entry, Identity, Kind, RollupRow};
