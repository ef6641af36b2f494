//! Columnar block encoding for partition files
//!
//! Each block is a columnar batch of records:
//! 1. Sort records by day
//! 2. Delta-encode day numbers
//! 3. Intern identity and language strings into one table
//! 4. Serialize the columns with bincode
//! 5. LZ4 compress the result

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::segment::SegmentRecord;
use crate::storage::types::{day_number, from_day_number, Entry, Identity, Kind, RollupRow};
use chrono::NaiveDate;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;

/// Schema tag for trend entry partitions
pub const ENTRY_SCHEMA: u8 = 1;

/// Schema tag for day presence rollup partitions
pub const ROLLUP_SCHEMA: u8 = 2;

/// String intern table shared by every string column of a block
#[derive(Debug, Default, Serialize, Deserialize)]
struct StringTable {
    strings: Vec<String>,
    #[serde(skip)]
    lookup: HashMap<String, u32>,
}

impl StringTable {
    /// Intern a string, returning its index
    fn intern(&mut self, s: &str) -> u32 {
        if let Some(&idx) = self.lookup.get(s) {
            return idx;
        }
        let idx = self.strings.len() as u32;
        self.strings.push(s.to_string());
        self.lookup.insert(s.to_string(), idx);
        idx
    }

    fn resolve(&self, idx: u32) -> StorageResult<&str> {
        self.strings
            .get(idx as usize)
            .map(String::as_str)
            .ok_or_else(|| StorageError::Corruption(format!("String index out of range: {}", idx)))
    }
}

/// Delta-encoded day column
#[derive(Debug, Serialize, Deserialize)]
struct DayColumn {
    base: i32,
    deltas: Vec<i32>,
}

impl DayColumn {
    fn encode(days: impl Iterator<Item = NaiveDate>) -> Self {
        let days: Vec<i32> = days.map(day_number).collect();
        let base = days.first().copied().unwrap_or(0);
        let mut prev = base;
        let deltas = days
            .iter()
            .map(|&d| {
                let delta = d - prev;
                prev = d;
                delta
            })
            .collect();
        Self { base, deltas }
    }

    fn decode(&self) -> StorageResult<Vec<NaiveDate>> {
        let mut current = self.base;
        self.deltas
            .iter()
            .map(|delta| {
                current = current
                    .checked_add(*delta)
                    .ok_or_else(|| StorageError::Corruption("Day delta overflow".into()))?;
                from_day_number(current)
                    .ok_or_else(|| StorageError::Corruption(format!("Invalid day number: {}", current)))
            })
            .collect()
    }
}

/// Identity columns: name plus optional owner (present for repositories)
#[derive(Debug, Default, Serialize, Deserialize)]
struct IdentityColumns {
    names: Vec<u32>,
    owners: Vec<Option<u32>>,
}

impl IdentityColumns {
    fn push(&mut self, identity: &Identity, strings: &mut StringTable) {
        self.names.push(strings.intern(identity.name()));
        self.owners.push(identity.owner().map(|owner| strings.intern(owner)));
    }

    fn decode(&self, idx: usize, strings: &StringTable) -> StorageResult<Identity> {
        let name = strings.resolve(self.names[idx])?.to_string();
        Ok(match self.owners[idx] {
            Some(owner) => Identity::Repository {
                full_name: name,
                owner: strings.resolve(owner)?.to_string(),
            },
            None => Identity::Developer { username: name },
        })
    }

    fn len_matches(&self, len: usize) -> bool {
        self.names.len() == len && self.owners.len() == len
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct EncodedEntryBlock {
    days: DayColumn,
    ranks: Vec<u32>,
    languages: Vec<Option<u32>>,
    identities: IdentityColumns,
    strings: StringTable,
}

#[derive(Debug, Serialize, Deserialize)]
struct EncodedRollupBlock {
    days: DayColumn,
    identities: IdentityColumns,
    non_null_languages: Vec<u32>,
    best_rank_any: Vec<u32>,
    best_rank_non_null: Vec<Option<u32>>,
    strings: StringTable,
}

fn pack<T: Serialize>(block: &T) -> StorageResult<Vec<u8>> {
    let serialized =
        bincode::serialize(block).map_err(|e| StorageError::Serialization(e.to_string()))?;
    Ok(lz4_flex::compress_prepend_size(&serialized))
}

fn unpack<T: DeserializeOwned>(data: &[u8]) -> StorageResult<T> {
    let decompressed = lz4_flex::decompress_size_prepended(data)
        .map_err(|e| StorageError::Compression(format!("LZ4 decompression failed: {}", e)))?;
    bincode::deserialize(&decompressed).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn sorted_by_day<R: SegmentRecord>(records: &[R]) -> Vec<&R> {
    let mut sorted: Vec<&R> = records.iter().collect();
    sorted.sort_by_key(|r| r.day());
    sorted
}

impl SegmentRecord for Entry {
    const SCHEMA: u8 = ENTRY_SCHEMA;
    const SCHEMA_NAME: &'static str = "trend entry";

    fn table_name(kind: Kind) -> &'static str {
        kind.entry_table()
    }

    fn day(&self) -> NaiveDate {
        self.date
    }

    fn kind(&self) -> Kind {
        self.kind
    }

    fn encode_block(records: &[Self]) -> StorageResult<Vec<u8>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let sorted = sorted_by_day(records);
        let mut strings = StringTable::default();
        let mut identities = IdentityColumns::default();
        let mut languages = Vec::with_capacity(sorted.len());

        for entry in &sorted {
            identities.push(&entry.identity, &mut strings);
            languages.push(entry.language.as_deref().map(|l| strings.intern(l)));
        }

        pack(&EncodedEntryBlock {
            days: DayColumn::encode(sorted.iter().map(|e| e.date)),
            ranks: sorted.iter().map(|e| e.rank).collect(),
            languages,
            identities,
            strings,
        })
    }

    fn decode_block(data: &[u8]) -> StorageResult<Vec<Self>> {
        if data.is_empty() {
            return Ok(Vec::new());
        }

        let block: EncodedEntryBlock = unpack(data)?;
        let dates = block.days.decode()?;
        let len = dates.len();
        if block.ranks.len() != len || block.languages.len() != len || !block.identities.len_matches(len) {
            return Err(StorageError::Corruption("Entry block column lengths differ".into()));
        }

        let mut entries = Vec::with_capacity(len);
        for (i, date) in dates.into_iter().enumerate() {
            let language = block.languages[i]
                .map(|idx| block.strings.resolve(idx))
                .transpose()?;
            let identity = block.identities.decode(i, &block.strings)?;
            entries.push(Entry::new(date, language, block.ranks[i], identity));
        }

        Ok(entries)
    }
}

impl SegmentRecord for RollupRow {
    const SCHEMA: u8 = ROLLUP_SCHEMA;
    const SCHEMA_NAME: &'static str = "day presence rollup";

    fn table_name(kind: Kind) -> &'static str {
        kind.rollup_table()
    }

    fn day(&self) -> NaiveDate {
        self.date
    }

    fn kind(&self) -> Kind {
        self.identity.kind()
    }

    fn encode_block(records: &[Self]) -> StorageResult<Vec<u8>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let sorted = sorted_by_day(records);
        let mut strings = StringTable::default();
        let mut identities = IdentityColumns::default();
        for row in &sorted {
            identities.push(&row.identity, &mut strings);
        }

        pack(&EncodedRollupBlock {
            days: DayColumn::encode(sorted.iter().map(|r| r.date)),
            identities,
            non_null_languages: sorted.iter().map(|r| r.non_null_languages).collect(),
            best_rank_any: sorted.iter().map(|r| r.best_rank_any).collect(),
            best_rank_non_null: sorted.iter().map(|r| r.best_rank_non_null).collect(),
            strings,
        })
    }

    fn decode_block(data: &[u8]) -> StorageResult<Vec<Self>> {
        if data.is_empty() {
            return Ok(Vec::new());
        }

        let block: EncodedRollupBlock = unpack(data)?;
        let dates = block.days.decode()?;
        let len = dates.len();
        if block.non_null_languages.len() != len
            || block.best_rank_any.len() != len
            || block.best_rank_non_null.len() != len
            || !block.identities.len_matches(len)
        {
            return Err(StorageError::Corruption("Rollup block column lengths differ".into()));
        }

        dates
            .into_iter()
            .enumerate()
            .map(|(i, date)| {
                Ok(RollupRow {
                    date,
                    identity: block.identities.decode(i, &block.strings)?,
                    non_null_languages: block.non_null_languages[i],
                    best_rank_any: block.best_rank_any[i],
                    best_rank_non_null: block.best_rank_non_null[i],
                })
            })
            .collect()
    }
}
