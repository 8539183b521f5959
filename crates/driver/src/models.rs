//! Driver models.
//!
//! Rows travel between the query builder and the store as free-form JSON
//! objects. Filters are ordered maps so that two equal filters always render
//! (and compare) identically.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A single row: field name to value.
pub type Record = Map<String, Value>;

/// Equality filter: field name to the value it must equal.
pub type Filter = BTreeMap<String, Value>;

/// Column name to a human-readable type name, as reported by the store.
pub type Columns = BTreeMap<String, String>;

/// Everything the store needs to execute a read.
///
/// Built by the query builder after defaults are resolved and the filter
/// clause has been parsed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadRequest {
    pub database: String,
    pub table: String,
    /// Comma-separated projection; empty selects every column.
    pub columns: String,
    pub filter: Option<Filter>,
    /// Comma-separated fields, each optionally prefixed with `+` (ascending,
    /// the default) or `-` (descending).
    pub order_by: String,
    /// Maximum rows to return; `0` means unlimited.
    pub limit: u64,
    /// One-based page number, only meaningful together with `limit`.
    pub page: u64,
}
impl ReadRequest {
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
            ..Default::default()
        }
    }

    pub fn with_columns(mut self, columns: impl Into<String>) -> Self {
        self.columns = columns.into();
        self
    }

    pub fn with_filter(mut self, filter: impl Into<Option<Filter>>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn with_order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = order_by.into();
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_page(mut self, page: u64) -> Self {
        self.page = page;
        self
    }

    /// Number of rows to skip before the requested page starts. Saturates
    /// rather than overflowing on huge pages.
    pub fn offset(&self) -> u64 {
        if self.limit == 0 || self.page <= 1 { 0 } else { (self.page - 1).saturating_mul(self.limit) }
    }
}

/// Name of the JSON type of a value, used when reporting column types.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "double",
        Value::Number(_) => "int",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
