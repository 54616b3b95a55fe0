//! Error types for the Tessera engine.
//!
//! All fallible operations return [`Result<T>`], whose error side is the
//! [`TesseraError`] enum. Lookups that simply find nothing are not errors:
//! they come back as `Ok(None)`, an empty `Vec` or `Ok(false)`.
//!
//! # Examples
//!
//! ```
//! use tessera::{Result, TesseraError};
//!
//! fn example_operation() -> Result<()> {
//!     Err(TesseraError::schema("field `year` already exists"))
//! }
//!
//! assert!(example_operation().is_err());
//! ```

use std::io;

use thiserror::Error;

/// The main error type for Tessera operations.
#[derive(Error, Debug)]
pub enum TesseraError {
    /// I/O errors (file open, write, mmap).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Index-level errors (unknown index, closed index, duplicate names).
    #[error("Index error: {0}")]
    Index(String),

    /// Schema errors (field not found, field already exists, missing primary key).
    #[error("Schema error: {0}")]
    Schema(String),

    /// Field storage errors.
    #[error("Field error: {0}")]
    Field(String),

    /// Query parsing errors.
    #[error("Query error: {0}")]
    Query(String),

    /// On-disk format errors (truncated or corrupt files).
    #[error("Storage error: {0}")]
    Storage(String),

    /// Caller supplied an argument outside the accepted domain.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// An ordering invariant was violated, e.g. a docId mismatch on append.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// A document or key required by the operation does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// FST construction or decoding errors.
    #[error("FST error: {0}")]
    Fst(#[from] fst::Error),

    /// JSON serialization/deserialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Redb(#[from] redb::Error),

    #[error("database open error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    /// Generic error for other cases.
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for operations that may fail with [`TesseraError`].
pub type Result<T> = std::result::Result<T, TesseraError>;

impl TesseraError {
    /// Create a new index error.
    pub fn index<S: Into<String>>(msg: S) -> Self {
        TesseraError::Index(msg.into())
    }

    /// Create a new schema error.
    pub fn schema<S: Into<String>>(msg: S) -> Self {
        TesseraError::Schema(msg.into())
    }

    /// Create a new field error.
    pub fn field<S: Into<String>>(msg: S) -> Self {
        TesseraError::Field(msg.into())
    }

    /// Create a new query error.
    pub fn query<S: Into<String>>(msg: S) -> Self {
        TesseraError::Query(msg.into())
    }

    /// Create a new storage error.
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        TesseraError::Storage(msg.into())
    }

    /// Create a new invalid argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        TesseraError::InvalidArgument(msg.into())
    }

    /// Create a new invalid operation error.
    pub fn invalid_operation<S: Into<String>>(msg: S) -> Self {
        TesseraError::InvalidOperation(msg.into())
    }

    /// Create a new not found error.
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        TesseraError::NotFound(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        TesseraError::Other(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let error = TesseraError::index("Test index error");
        assert_eq!(error.to_string(), "Index error: Test index error");

        let error = TesseraError::schema("Test schema error");
        assert_eq!(error.to_string(), "Schema error: Test schema error");

        let error = TesseraError::not_found("doc 7");
        assert_eq!(error.to_string(), "Not found: doc 7");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let error = TesseraError::from(io_error);

        match error {
            TesseraError::Io(_) => {}
            _ => panic!("Expected IO error"),
        }
    }

    #[test]
    fn test_json_error_conversion() {
        let json_error = serde_json::from_str::<u64>("not a number").unwrap_err();
        let error: TesseraError = json_error.into();
        assert!(matches!(error, TesseraError::Json(_)));
    }
}
