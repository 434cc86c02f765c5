//! Backend-agnostic store errors.

use std::error::Error;
use thiserror::Error;

/// Result alias for shared-store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Error raised by store backends regardless of the underlying transport.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not service the request at all.
    #[error("store unavailable: {message}")]
    Unavailable {
        /// Human readable description of the failed operation.
        message: String,
        /// Underlying backend failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// An insert targeted a row id that already exists.
    #[error("row `{id}` already exists in `{table}`")]
    Conflict {
        /// Table the insert targeted.
        table: &'static str,
        /// Identifier of the conflicting row.
        id: String,
    },
}

impl StoreError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StoreError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// Whether this error is an insert conflict on an existing row.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}
