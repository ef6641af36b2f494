//! Segment file format for partition files
//!
//! Every partition (one year of one kind of one dataset) is a single segment
//! file holding compressed columnar blocks.
//!
//! Layout:
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ HEADER (64 bytes)                       │
//! │   magic: [u8; 4] = "ALMN"               │
//! │   version: u16                          │
//! │   schema: u8                            │
//! │   kind: u8                              │
//! │   block_count: u32                      │
//! │   min_day: i32                          │
//! │   max_day: i32                          │
//! │   row_count: u64                        │
//! │   reserved: [u8; 32]                    │
//! │   checksum: u32                         │
//! ├─────────────────────────────────────────┤
//! │ BLOCKS (variable)                       │
//! │   For each block:                       │
//! │     block_size: u32                     │
//! │     compressed_data: [u8; block_size]   │
//! │     block_checksum: u32                 │
//! ├─────────────────────────────────────────┤
//! │ FOOTER                                  │
//! │   block metadata: 24 bytes per block    │
//! │   footer_size: u32                      │
//! │   footer_checksum: u32                  │
//! └─────────────────────────────────────────┘
//! ```

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{day_number, DateRange, Kind};
use chrono::NaiveDate;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// Magic bytes for segment file identification
const SEGMENT_MAGIC: [u8; 4] = *b"ALMN";

/// Current segment format version
const SEGMENT_VERSION: u16 = 1;

/// Header size in bytes
const HEADER_SIZE: usize = 64;

/// Footer bytes per block
const BLOCK_META_SIZE: usize = 24;

/// A record type that can be stored in segment blocks
pub trait SegmentRecord: Sized {
    /// Schema tag written to the header
    const SCHEMA: u8;
    /// Human-readable schema name for error messages
    const SCHEMA_NAME: &'static str;

    /// File stem of this dataset's partitions for `kind`
    fn table_name(kind: Kind) -> &'static str;

    fn day(&self) -> NaiveDate;
    fn kind(&self) -> Kind;
    fn encode_block(records: &[Self]) -> StorageResult<Vec<u8>>;
    fn decode_block(data: &[u8]) -> StorageResult<Vec<Self>>;
}

/// Segment file header
#[derive(Debug, Clone)]
pub struct SegmentHeader {
    pub magic: [u8; 4],
    pub version: u16,
    /// Dataset stored in this segment
    pub schema: u8,
    pub kind: Kind,
    pub block_count: u32,
    /// Smallest day number across all rows
    pub min_day: i32,
    /// Largest day number across all rows
    pub max_day: i32,
    pub row_count: u64,
}

impl SegmentHeader {
    pub fn new(schema: u8, kind: Kind) -> Self {
        Self {
            magic: SEGMENT_MAGIC,
            version: SEGMENT_VERSION,
            schema,
            kind,
            block_count: 0,
            min_day: i32::MAX,
            max_day: i32::MIN,
            row_count: 0,
        }
    }

    /// Serialize header to bytes
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];

        buf[0..4].copy_from_slice(&self.magic);
        buf[4..6].copy_from_slice(&self.version.to_le_bytes());
        buf[6] = self.schema;
        buf[7] = self.kind.tag();
        buf[8..12].copy_from_slice(&self.block_count.to_le_bytes());
        buf[12..16].copy_from_slice(&self.min_day.to_le_bytes());
        buf[16..20].copy_from_slice(&self.max_day.to_le_bytes());
        buf[20..28].copy_from_slice(&self.row_count.to_le_bytes());
        // bytes 28-59 reserved

        let checksum = crc32fast::hash(&buf[0..60]);
        buf[60..64].copy_from_slice(&checksum.to_le_bytes());

        buf
    }

    /// Parse header from bytes
    pub fn from_bytes(buf: &[u8; HEADER_SIZE]) -> StorageResult<Self> {
        let stored_checksum = u32::from_le_bytes([buf[60], buf[61], buf[62], buf[63]]);
        let computed_checksum = crc32fast::hash(&buf[0..60]);

        if stored_checksum != computed_checksum {
            return Err(StorageError::Corruption(format!(
                "Header checksum mismatch: stored={}, computed={}",
                stored_checksum, computed_checksum
            )));
        }

        let mut magic = [0u8; 4];
        magic.copy_from_slice(&buf[0..4]);
        if magic != SEGMENT_MAGIC {
            return Err(StorageError::InvalidSegment(format!("Invalid magic: {:?}", magic)));
        }

        let version = u16::from_le_bytes([buf[4], buf[5]]);
        if version > SEGMENT_VERSION {
            return Err(StorageError::InvalidSegment(format!(
                "Unsupported version: {}",
                version
            )));
        }

        let kind = Kind::from_tag(buf[7])
            .ok_or_else(|| StorageError::InvalidSegment(format!("Unknown kind tag: {}", buf[7])))?;

        Ok(Self {
            magic,
            version,
            schema: buf[6],
            kind,
            block_count: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
            min_day: i32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]),
            max_day: i32::from_le_bytes([buf[16], buf[17], buf[18], buf[19]]),
            row_count: u64::from_le_bytes([
                buf[20], buf[21], buf[22], buf[23], buf[24], buf[25], buf[26], buf[27],
            ]),
        })
    }
}

/// Metadata for a single block within a segment
#[derive(Debug, Clone)]
pub struct BlockMeta {
    /// Offset from start of file
    pub offset: u64,
    /// Size of compressed data
    pub size: u32,
    pub row_count: u32,
    pub min_day: i32,
    pub max_day: i32,
}

impl BlockMeta {
    /// Check if block overlaps with a day range
    pub fn overlaps(&self, range: &DateRange) -> bool {
        self.min_day <= day_number(range.end) && self.max_day >= day_number(range.start)
    }

    fn to_bytes(&self) -> [u8; BLOCK_META_SIZE] {
        let mut buf = [0u8; BLOCK_META_SIZE];
        buf[0..8].copy_from_slice(&self.offset.to_le_bytes());
        buf[8..12].copy_from_slice(&self.size.to_le_bytes());
        buf[12..16].copy_from_slice(&self.row_count.to_le_bytes());
        buf[16..20].copy_from_slice(&self.min_day.to_le_bytes());
        buf[20..24].copy_from_slice(&self.max_day.to_le_bytes());
        buf
    }

    fn from_bytes(buf: &[u8]) -> Self {
        let u32_at = |i: usize| u32::from_le_bytes([buf[i], buf[i + 1], buf[i + 2], buf[i + 3]]);
        let i32_at = |i: usize| i32::from_le_bytes([buf[i], buf[i + 1], buf[i + 2], buf[i + 3]]);
        let mut offset = [0u8; 8];
        offset.copy_from_slice(&buf[0..8]);
        Self {
            offset: u64::from_le_bytes(offset),
            size: u32_at(8),
            row_count: u32_at(12),
            min_day: i32_at(16),
            max_day: i32_at(20),
        }
    }
}

/// A segment file containing compressed blocks of `R`
pub struct Segment<R: SegmentRecord> {
    pub path: PathBuf,
    pub header: SegmentHeader,
    pub blocks: Vec<BlockMeta>,
    reader: Option<BufReader<File>>,
    _records: PhantomData<R>,
}

impl<R: SegmentRecord> Segment<R> {
    /// Create a new, empty segment file
    pub fn create(path: impl AsRef<Path>, kind: Kind) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = BufWriter::new(File::create(&path)?);
        let header = SegmentHeader::new(R::SCHEMA, kind);
        file.write_all(&header.to_bytes())?;
        file.flush()?;

        Ok(Self {
            path,
            header,
            blocks: Vec::new(),
            reader: None,
            _records: PhantomData,
        })
    }

    /// Open an existing segment, checking it holds `R` records of `kind`
    pub fn open(path: impl AsRef<Path>, kind: Kind) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file_len = std::fs::metadata(&path)?.len();
        let mut file = BufReader::new(File::open(&path)?);

        let mut header_buf = [0u8; HEADER_SIZE];
        file.read_exact(&mut header_buf)?;
        let header = SegmentHeader::from_bytes(&header_buf)?;

        if header.schema != R::SCHEMA {
            return Err(StorageError::SchemaMismatch(format!(
                "{} holds schema {}, expected {} ({})",
                path.display(),
                header.schema,
                R::SCHEMA,
                R::SCHEMA_NAME
            )));
        }
        if header.kind != kind {
            return Err(StorageError::SchemaMismatch(format!(
                "{} holds {} rows, expected {}",
                path.display(),
                header.kind,
                kind
            )));
        }

        let blocks = Self::read_footer(&mut file, &header, file_len)?;

        Ok(Self {
            path,
            header,
            blocks,
            reader: Some(file),
            _records: PhantomData,
        })
    }

    /// Read footer from segment file
    fn read_footer(
        file: &mut BufReader<File>,
        header: &SegmentHeader,
        file_len: u64,
    ) -> StorageResult<Vec<BlockMeta>> {
        if header.block_count == 0 {
            return Ok(Vec::new());
        }

        file.seek(SeekFrom::End(-8))?;

        let mut footer_size_buf = [0u8; 4];
        file.read_exact(&mut footer_size_buf)?;
        let footer_size = u32::from_le_bytes(footer_size_buf) as usize;

        let mut checksum_buf = [0u8; 4];
        file.read_exact(&mut checksum_buf)?;
        let stored_checksum = u32::from_le_bytes(checksum_buf);

        let expected_size = header.block_count as usize * BLOCK_META_SIZE;
        if footer_size != expected_size || (footer_size + 8 + HEADER_SIZE) as u64 > file_len {
            return Err(StorageError::Corruption(format!(
                "Footer size {} does not match {} blocks",
                footer_size, header.block_count
            )));
        }

        file.seek(SeekFrom::End(-(footer_size as i64) - 8))?;
        let mut footer_data = vec![0u8; footer_size];
        file.read_exact(&mut footer_data)?;

        let computed_checksum = crc32fast::hash(&footer_data);
        if stored_checksum != computed_checksum {
            return Err(StorageError::Corruption("Footer checksum mismatch".into()));
        }

        let blocks = footer_data
            .chunks_exact(BLOCK_META_SIZE)
            .map(BlockMeta::from_bytes)
            .collect();

        file.seek(SeekFrom::Start(HEADER_SIZE as u64))?;

        Ok(blocks)
    }

    /// Append a block of records to the segment
    pub fn append_block(&mut self, records: &[R]) -> StorageResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        if let Some(stray) = records.iter().find(|r| r.kind() != self.header.kind) {
            return Err(StorageError::InvalidPartition(format!(
                "{} row in a {} segment",
                stray.kind(),
                self.header.kind
            )));
        }

        let compressed = R::encode_block(records)?;

        let (min_day, max_day) = records.iter().fold((i32::MAX, i32::MIN), |(min, max), r| {
            let d = day_number(r.day());
            (min.min(d), max.max(d))
        });

        let file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        let mut writer = BufWriter::new(file);

        // After header + existing blocks (+8 per block for size and checksum)
        let block_offset = self
            .blocks
            .last()
            .map_or(HEADER_SIZE as u64, |last| last.offset + last.size as u64 + 8);

        writer.seek(SeekFrom::Start(block_offset))?;

        let checksum = crc32fast::hash(&compressed);
        writer.write_all(&(compressed.len() as u32).to_le_bytes())?;
        writer.write_all(&compressed)?;
        writer.write_all(&checksum.to_le_bytes())?;

        self.blocks.push(BlockMeta {
            offset: block_offset,
            size: compressed.len() as u32,
            row_count: records.len() as u32,
            min_day,
            max_day,
        });

        self.header.block_count = self.blocks.len() as u32;
        self.header.min_day = self.header.min_day.min(min_day);
        self.header.max_day = self.header.max_day.max(max_day);
        self.header.row_count += records.len() as u64;

        self.write_footer(&mut writer)?;

        writer.seek(SeekFrom::Start(0))?;
        writer.write_all(&self.header.to_bytes())?;

        writer.flush()?;

        Ok(())
    }

    /// Write footer with block metadata
    fn write_footer<W: Write + Seek>(&self, writer: &mut W) -> StorageResult<()> {
        let mut footer_data = Vec::with_capacity(self.blocks.len() * BLOCK_META_SIZE);
        for block in &self.blocks {
            footer_data.extend_from_slice(&block.to_bytes());
        }

        let checksum = crc32fast::hash(&footer_data);

        writer.write_all(&footer_data)?;
        writer.write_all(&(footer_data.len() as u32).to_le_bytes())?;
        writer.write_all(&checksum.to_le_bytes())?;

        Ok(())
    }

    /// Read and decode a specific block
    pub fn read_block(&mut self, block_idx: usize) -> StorageResult<Vec<R>> {
        let block_meta = self.blocks.get(block_idx).cloned().ok_or_else(|| {
            StorageError::InvalidSegment(format!("Block index out of range: {}", block_idx))
        })?;

        let reader = match self.reader.take() {
            Some(reader) => reader,
            None => BufReader::new(File::open(&self.path)?),
        };
        let reader = self.reader.insert(reader);

        reader.seek(SeekFrom::Start(block_meta.offset))?;

        let mut size_buf = [0u8; 4];
        reader.read_exact(&mut size_buf)?;
        let size = u32::from_le_bytes(size_buf);
        if size != block_meta.size {
            return Err(StorageError::Corruption(format!(
                "Block {} size mismatch: stored={}, footer={}",
                block_idx, size, block_meta.size
            )));
        }

        let mut data = vec![0u8; size as usize];
        reader.read_exact(&mut data)?;

        let mut checksum_buf = [0u8; 4];
        reader.read_exact(&mut checksum_buf)?;
        let stored_checksum = u32::from_le_bytes(checksum_buf);
        let computed_checksum = crc32fast::hash(&data);

        if stored_checksum != computed_checksum {
            return Err(StorageError::Corruption(format!(
                "Block {} checksum mismatch",
                block_idx
            )));
        }

        R::decode_block(&data)
    }

    /// Read every row of the segment
    pub fn read_all(&mut self) -> StorageResult<Vec<R>> {
        let mut results = Vec::with_capacity(self.header.row_count as usize);
        for idx in 0..self.blocks.len() {
            results.extend(self.read_block(idx)?);
        }
        Ok(results)
    }

    /// Read all rows whose day falls inside a range
    pub fn read_range(&mut self, range: &DateRange) -> StorageResult<Vec<R>> {
        let mut results = Vec::new();

        for idx in 0..self.blocks.len() {
            if self.blocks[idx].overlaps(range) {
                let rows = self.read_block(idx)?;
                results.extend(rows.into_iter().filter(|r| range.contains(r.day())));
            }
        }

        Ok(results)
    }

    /// Check if this segment overlaps with a day range
    pub fn overlaps(&self, range: &DateRange) -> bool {
        self.header.block_count > 0
            && self.header.min_day <= day_number(range.end)
            && self.header.max_day >= day_number(range.start)
    }

    pub fn row_count(&self) -> u64 {
        self.header.row_count
    }
}

/// Builder for creating segments with multiple blocks
pub struct SegmentBuilder<R: SegmentRecord> {
    path: PathBuf,
    kind: Kind,
    rows_per_block: usize,
    buffer: Vec<R>,
    segment: Option<Segment<R>>,
}

impl<R: SegmentRecord> SegmentBuilder<R> {
    pub fn new(path: impl AsRef<Path>, kind: Kind) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            kind,
            rows_per_block: 8 * 1024,
            buffer: Vec::new(),
            segment: None,
        }
    }

    pub fn rows_per_block(mut self, rows: usize) -> Self {
        self.rows_per_block = rows.max(1);
        self
    }

    /// Add rows, flushing full blocks as needed
    pub fn add_rows(&mut self, rows: impl IntoIterator<Item = R>) -> StorageResult<()> {
        for row in rows {
            self.buffer.push(row);
            if self.buffer.len() >= self.rows_per_block {
                self.flush_buffer()?;
            }
        }
        Ok(())
    }

    fn flush_buffer(&mut self) -> StorageResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let segment = match self.segment.take() {
            Some(segment) => segment,
            None => Segment::create(&self.path, self.kind)?,
        };
        let segment = self.segment.insert(segment);
        let rows = std::mem::take(&mut self.buffer);
        segment.append_block(&rows)
    }

    /// Finish building; an empty builder still produces an empty segment
    pub fn finish(mut self) -> StorageResult<Segment<R>> {
        self.flush_buffer()?;
        match self.segment.take() {
            Some(segment) => Ok(segment),
            None => Segment::create(&self.path, self.kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::{Entry, RollupRow};
    use tempfile::tempdir;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn entries_for(days: &[&str]) -> Vec<Entry> {
        days.iter()
            .enumerate()
            .map(|(i, d)| Entry::repository(day(d), Some("rust"), i as u32 + 1, "alpha/one"))
            .collect()
    }

    #[test]
    fn test_segment_header_roundtrip() {
        let mut header = SegmentHeader::new(1, Kind::Developer);
        header.block_count = 5;
        header.min_day = 1000;
        header.max_day = 5000;
        header.row_count = 42;

        let restored = SegmentHeader::from_bytes(&header.to_bytes()).unwrap();

        assert_eq!(restored.magic, SEGMENT_MAGIC);
        assert_eq!(restored.version, SEGMENT_VERSION);
        assert_eq!(restored.kind, Kind::Developer);
        assert_eq!(restored.block_count, 5);
        assert_eq!(restored.min_day, 1000);
        assert_eq!(restored.max_day, 5000);
        assert_eq!(restored.row_count, 42);
    }

    #[test]
    fn test_segment_create_and_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("repo_trend_entry.seg");

        {
            let mut segment = Segment::<Entry>::create(&path, Kind::Repository).unwrap();
            segment
                .append_block(&entries_for(&["2025-01-01", "2025-01-02"]))
                .unwrap();
            segment.append_block(&entries_for(&["2025-01-03"])).unwrap();
            assert_eq!(segment.header.block_count, 2);
        }

        let mut segment = Segment::<Entry>::open(&path, Kind::Repository).unwrap();
        assert_eq!(segment.blocks.len(), 2);
        assert_eq!(segment.row_count(), 3);
        assert_eq!(segment.read_all().unwrap().len(), 3);
    }

    #[test]
    fn test_segment_range_query() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("repo_trend_entry.seg");

        let mut builder = SegmentBuilder::<Entry>::new(&path, Kind::Repository).rows_per_block(2);
        builder
            .add_rows(entries_for(&[
                "2025-01-01",
                "2025-01-02",
                "2025-01-03",
                "2025-01-04",
                "2025-01-05",
            ]))
            .unwrap();
        let segment = builder.finish().unwrap();
        assert_eq!(segment.header.block_count, 3);

        let mut segment = Segment::<Entry>::open(&path, Kind::Repository).unwrap();
        let range = DateRange::new(day("2025-01-02"), day("2025-01-04"));
        let rows = segment.read_range(&range).unwrap();

        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| range.contains(r.date)));
        assert!(!segment.overlaps(&DateRange::single(day("2025-02-01"))));
    }

    #[test]
    fn test_schema_mismatch_detected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("repo_trend_entry.seg");

        let mut segment = Segment::<Entry>::create(&path, Kind::Repository).unwrap();
        segment.append_block(&entries_for(&["2025-01-01"])).unwrap();

        let err = Segment::<RollupRow>::open(&path, Kind::Repository).err().unwrap();
        assert!(matches!(err, StorageError::SchemaMismatch(_)));

        let err = Segment::<Entry>::open(&path, Kind::Developer).err().unwrap();
        assert!(matches!(err, StorageError::SchemaMismatch(_)));
    }

    #[test]
    fn test_corrupt_block_detected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("repo_trend_entry.seg");

        let mut segment = Segment::<Entry>::create(&path, Kind::Repository).unwrap();
        segment.append_block(&entries_for(&["2025-01-01"])).unwrap();

        // Flip a byte inside the first block payload
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[HEADER_SIZE + 6] ^= 0xff;
        std::fs::write(&path, bytes).unwrap();

        let mut segment = Segment::<Entry>::open(&path, Kind::Repository).unwrap();
        let err = segment.read_block(0).unwrap_err();
        assert!(matches!(err, StorageError::Corruption(_)));
    }

    #[test]
    fn test_truncated_file_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("repo_day_presence.seg");
        std::fs::write(&path, "corrupt").unwrap();

        let err = Segment::<RollupRow>::open(&path, Kind::Repository).err().unwrap();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_kind_enforced_on_append() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dev_trend_entry.seg");

        let mut segment = Segment::<Entry>::create(&path, Kind::Developer).unwrap();
        let err = segment.append_block(&entries_for(&["2025-01-01"])).unwrap_err();
        assert!(matches!(err, StorageError::InvalidPartition(_)));
    }
}
