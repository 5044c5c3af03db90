use rusqlite::ErrorCode;

pub type Result<T> = std::result::Result<T, MemoryError>;

#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("memory not found: {id}")]
    NotFound { id: i64 },

    #[error("memory {id} is not eligible: {reason}")]
    NotEligible { id: i64, reason: String },

    #[error("memory store unavailable: {0}")]
    StorageUnavailable(#[source] rusqlite::Error),

    #[error("full-text index unavailable")]
    IndexUnavailable,

    #[error("database error: {0}")]
    Storage(#[source] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl MemoryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Unavailable storage may clear up (lock released, file restored);
    /// everything else is a definite answer.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }

    /// Classify a failure raised by a full-text statement. A missing fts5
    /// module or shadow table means the index is gone, not the store.
    pub(crate) fn from_index(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(_, Some(msg)) = &err
            && (msg.contains("no such module") || msg.contains("no such table"))
        {
            return Self::IndexUnavailable;
        }
        Self::from(err)
    }
}

impl From<rusqlite::Error> for MemoryError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(
                ErrorCode::CannotOpen
                | ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::NotADatabase
                | ErrorCode::PermissionDenied
                | ErrorCode::ReadOnly
                | ErrorCode::SystemIoFailure,
            ) => Self::StorageUnavailable(err),
            _ => Self::Storage(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(code: std::os::raw::c_int, msg: &str) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(code), Some(msg.to_string()))
    }

    #[test]
    fn locked_database_is_unavailable() {
        let err = MemoryError::from(failure(rusqlite::ffi::SQLITE_BUSY, "database is locked"));
        assert!(matches!(err, MemoryError::StorageUnavailable(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn constraint_failure_is_plain_storage_error() {
        let err = MemoryError::from(failure(rusqlite::ffi::SQLITE_CONSTRAINT, "NOT NULL"));
        assert!(matches!(err, MemoryError::Storage(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn missing_fts_table_maps_to_index_unavailable() {
        let err = MemoryError::from_index(failure(
            rusqlite::ffi::SQLITE_ERROR,
            "no such table: regression_memory_fts",
        ));
        assert!(matches!(err, MemoryError::IndexUnavailable));
    }
}
