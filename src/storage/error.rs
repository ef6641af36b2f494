//! Storage layer error types
//!
//! Defines all errors that can occur while reading or writing partition files.

use thiserror::Error;

/// Errors that can occur in the storage layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Compression or decompression failed
    #[error("Compression error: {0}")]
    Compression(String),

    /// Data corruption detected (checksum mismatch, truncated block, etc.)
    #[error("Corrupt data: {0}")]
    Corruption(String),

    /// Segment file format error (magic, version, layout)
    #[error("Invalid segment format: {0}")]
    InvalidSegment(String),

    /// Segment holds a different dataset or kind than requested
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// A required partition file does not exist
    #[error("Missing partition: {0}")]
    MissingPartition(String),

    /// Records handed to a writer do not fit the partition
    #[error("Invalid partition contents: {0}")]
    InvalidPartition(String),

    /// The rollup batch job could not read its input
    #[error("Rollup build failed: {0}")]
    RollupBuild(String),
}

impl StorageError {
    /// Whether this is an expected failure of an optional dataset.
    ///
    /// Missing files, schema mismatches and malformed or corrupt files are
    /// expected; anything else (permissions, exhausted descriptors) is not.
    pub fn is_recoverable(&self) -> bool {
        match self {
            StorageError::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::NotFound | std::io::ErrorKind::UnexpectedEof
            ),
            StorageError::Serialization(_)
            | StorageError::Compression(_)
            | StorageError::Corruption(_)
            | StorageError::InvalidSegment(_)
            | StorageError::SchemaMismatch(_)
            | StorageError::MissingPartition(_) => true,
            StorageError::InvalidPartition(_) | StorageError::RollupBuild(_) => false,
        }
    }
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::MissingPartition("rollups/repository/year=2025".to_string());
        assert_eq!(
            err.to_string(),
            "Missing partition: rollups/repository/year=2025"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let storage_err: StorageError = io_err.into();
        assert!(matches!(storage_err, StorageError::Io(_)));
        assert!(storage_err.is_recoverable());
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(StorageError::Corruption("bad crc".into()).is_recoverable());
        assert!(StorageError::SchemaMismatch("entry vs rollup".into()).is_recoverable());

        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(!StorageError::Io(denied).is_recoverable());
        assert!(!StorageError::InvalidPartition("year".into()).is_recoverable());
    }
}
