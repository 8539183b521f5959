//! Cache keys for read queries.

use docket_driver::Value;

/// Canonical summary of every parameter that affects a read query's result.
///
/// Two builder chains that would send the same read to the store produce
/// equal fingerprints, regardless of the order in which the builder methods
/// were called. Positional filter arguments are rendered as a JSON array:
/// order-preserving, and stable across runs because JSON objects serialize
/// with sorted keys.
///
/// Fingerprints are built from fully-resolved state, so the database is
/// always the concrete name, never "unset, use the default".
///
/// # Examples
///
/// ```
/// use docket_cache::Fingerprint;
/// use serde_json::json;
///
/// let a = Fingerprint::new("app", "users").with_clause("id").with_args(&[json!(1)]).with_limit(10);
/// let b = Fingerprint::new("app", "users").with_limit(10).with_args(&[json!(1)]).with_clause("id");
/// assert_eq!(a, b);
/// assert_ne!(a, b.clone().with_limit(11));
/// assert!(a.belongs_to("app", "users"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    database: String,
    table: String,
    columns: String,
    clause: String,
    order_by: String,
    limit: u64,
    page: u64,
    args: String,
}
impl Fingerprint {
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
            args: render_args(&[]),
            ..Default::default()
        }
    }

    pub fn with_columns(mut self, columns: impl Into<String>) -> Self {
        self.columns = columns.into();
        self
    }

    /// The raw filter clause, exactly as given to the builder.
    pub fn with_clause(mut self, clause: impl Into<String>) -> Self {
        self.clause = clause.into();
        self
    }

    pub fn with_args(mut self, args: &[Value]) -> Self {
        self.args = render_args(args);
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

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Whether this fingerprint reads from `table` in `database`.
    pub fn belongs_to(&self, database: &str, table: &str) -> bool {
        self.table == table && self.database == database
    }
}

fn render_args(args: &[Value]) -> String {
    // `Value`'s `Display` is compact JSON and cannot fail.
    Value::Array(args.iter().map(canonical).collect()).to_string()
}

/// Rebuild objects with sorted keys, so rendering does not depend on
/// whether `serde_json` was compiled with `preserve_order`.
fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(entries.into_iter().map(|(k, v)| (k.clone(), canonical(v))).collect())
        },
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}
