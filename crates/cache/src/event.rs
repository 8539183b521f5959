//! Invalidation events.
//!
//! The wire shape between publisher and subscriber is
//! `{"type": "...", "table": "...", "database": "..."}` with `table` and
//! `database` optional.

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// What happened to the data.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    #[display("create")]
    Create,
    #[display("update")]
    Update,
    #[display("delete")]
    Delete,
    #[display("drop")]
    Drop,
    /// Periodic or manual full flush, not tied to any mutation.
    #[display("clean")]
    Clean,
}

/// How much of the cache an event invalidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope<'a> {
    /// Entries reading from this table in this database.
    Table { database: &'a str, table: &'a str },
    /// Every result cache and the table-list cache.
    Everything,
}

/// A message describing a mutation, used to evict affected cache entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}
impl InvalidationEvent {
    /// Event announcing a mutation of `table` in `database`.
    pub fn mutation(kind: EventKind, database: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            kind,
            table: Some(table.into()),
            database: Some(database.into()),
        }
    }

    /// Full flush, independent of any mutation.
    pub fn clean() -> Self {
        Self { kind: EventKind::Clean, table: None, database: None }
    }

    /// Create, update and delete naming both a table and a database only
    /// touch that table; everything else (drop, clean, or an event missing
    /// either name) flushes the lot.
    pub fn scope(&self) -> Scope<'_> {
        match (self.kind, self.table.as_deref(), self.database.as_deref()) {
            (EventKind::Create | EventKind::Update | EventKind::Delete, Some(table), Some(database)) => {
                Scope::Table { database, table }
            },
            _ => Scope::Everything,
        }
    }
}
