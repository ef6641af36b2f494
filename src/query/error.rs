//! Query error types
//!
//! Two user-facing kinds (`InvalidRequest`, `NotFound`) plus internal
//! failures that callers should report as server errors.

use thiserror::Error;

/// Errors that can occur during analytics queries
#[derive(Error, Debug)]
pub enum AnalyticsError {
    /// Malformed or semantically illegal input
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Well-formed request for data that does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Manifest could not be read or written
    #[error("Manifest error: {0}")]
    Manifest(String),

    /// Entry log read failed
    #[error("Storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),

    /// Unexpected failure on the primary query path
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AnalyticsError {
    /// Whether the caller can fix this by correcting the request
    pub fn is_client_error(&self) -> bool {
        matches!(self, AnalyticsError::InvalidRequest(_) | AnalyticsError::NotFound(_))
    }
}

/// Result type for analytics operations
pub type AnalyticsResult<T> = Result<T, AnalyticsError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageError;

    #[test]
    fn test_client_errors() {
        assert!(AnalyticsError::InvalidRequest("bad kind".to_string()).is_client_error());
        assert!(AnalyticsError::NotFound("no such date".to_string()).is_client_error());
        assert!(!AnalyticsError::Internal("boom".to_string()).is_client_error());
        assert!(!AnalyticsError::Manifest("unreadable".to_string()).is_client_error());

        let storage: AnalyticsError = StorageError::Corruption("bad block".to_string()).into();
        assert!(!storage.is_client_error());
    }
}
