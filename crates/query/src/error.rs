//! Query Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use docket_config::error::{Error as ConfigError, ErrorKind as ConfigErrorKind};
use docket_driver::error::{Error as DriverError, ErrorKind as DriverErrorKind};

/// A query error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for query operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The builder was misused (method called before a table was chosen,
    /// mismatched insert fields, malformed `set` payload, ...).
    #[display("usage error: {_0}")]
    Usage(#[error(not(source))] String),
    /// No database is registered under this name.
    #[display("database not found: {_0}")]
    DatabaseNotFound(#[error(not(source))] String),
    /// The record type has not been linked to a table.
    #[display("model not registered: {_0}")]
    ModelNotRegistered(#[error(not(source))] &'static str),
    /// The driver call failed; the driver's own error kind is kept.
    #[display("driver error: {_0}")]
    Driver(DriverErrorKind),
    /// A record could not be turned into a document for this table.
    #[display("could not encode record for table: {_0}")]
    Encode(#[error(not(source))] String),
    /// A document from this table does not fit the record type.
    #[display("could not decode record from table: {_0}")]
    Decode(#[error(not(source))] String),
    /// The configuration handed to [`Docket::new`](crate::Docket::new) is
    /// unusable.
    #[display("configuration error: {_0}")]
    Config(ConfigErrorKind),
    /// Background tasks need a Tokio runtime and none is running.
    #[display("no Tokio runtime available")]
    NoRuntime,
}
impl ErrorKind {
    /// Convert a driver error into a query error, preserving the driver
    /// crate's `Exn` frame (error tree) as a child in its own error tree.
    #[track_caller]
    pub fn driver(err: DriverError) -> Error {
        let inner = (*err).clone();
        err.raise(ErrorKind::Driver(inner))
    }

    /// Convert a configuration error, keeping its frame as a child.
    #[track_caller]
    pub fn config(err: ConfigError) -> Error {
        let inner = (*err).clone();
        err.raise(ErrorKind::Config(inner))
    }

    pub(crate) fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Driver(kind) => kind.is_retryable(),
            _ => false,
        }
    }
}
