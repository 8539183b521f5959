//! Driver Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A driver error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for driver operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
/// Cloneable so that callers can embed the kind in their own error tree.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The requested table does not exist in the database.
    #[display("table not found: {_0}")]
    TableNotFound(#[error(not(source))] String),
    /// A single-row query matched nothing.
    #[display("no matching row in table: {_0}")]
    RowNotFound(#[error(not(source))] String),
    /// The store rejected the query or mutation.
    #[display("query rejected: {_0}")]
    Rejected(#[error(not(source))] String),
    /// Record could not be encoded for, or decoded from, the store.
    #[display("invalid record: {_0}")]
    InvalidRecord(#[error(not(source))] String),
    /// Network-related error talking to the store.
    #[display("connection error: {_0}")]
    Connection(#[error(not(source))] String),
    /// The caller cancelled the operation before it completed.
    #[display("operation cancelled")]
    Cancelled,
    /// The caller's deadline passed before the operation completed.
    #[display("deadline exceeded")]
    DeadlineExceeded,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::DeadlineExceeded)
    }
}
