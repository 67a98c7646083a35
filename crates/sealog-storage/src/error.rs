//! Storage error types.

use thiserror::Error;

/// Errors that can occur in the event store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying database reported a failure. Any transaction in
    /// progress was rolled back.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No committed event carries the requested serial.
    #[error("no event with serial {serial}")]
    NotFound {
        /// The serial that was looked up.
        serial: u64,
    },
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
