//! In-memory driver for testing.

use crate::Driver;
use crate::context::Context;
use crate::error::{ErrorKind, Result};
use crate::models::{Columns, Filter, ReadRequest, Record, type_name};
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

type TableKey = (String, String);

/// Driver operations, used to read the per-operation call counters of a
/// [`MockDriver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Query,
    QueryOne,
    CreateRow,
    UpdateRows,
    DeleteRows,
    DropTable,
    CreateTable,
    ListTables,
    ListColumns,
}
impl Operation {
    const COUNT: usize = 9;
}

/// In-memory driver for testing.
///
/// Tables live in a `HashMap` behind a [`RwLock`], keyed by database and
/// table name, so all trait methods operate on `&self`. Every call is
/// counted per [`Operation`], which is how cache tests prove that a read
/// did (or did not) reach the store.
///
/// # Examples
///
/// ```
/// use docket_driver::{Context, Driver, MockDriver, Operation, ReadRequest};
/// use serde_json::json;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let driver = MockDriver::with_rows("app", "users", [json!({"id": 1, "name": "x"})]);
/// let rows = driver.query(&Context::background(), &ReadRequest::new("app", "users")).await?;
/// assert_eq!(rows.len(), 1);
/// assert_eq!(driver.calls(Operation::Query), 1);
/// # Ok(())
/// # }
/// ```
pub struct MockDriver {
    name: String,
    tables: RwLock<HashMap<TableKey, Vec<Record>>>,
    calls: [AtomicUsize; Operation::COUNT],
    failure: Mutex<Option<ErrorKind>>,
    latency: Option<Duration>,
}

impl MockDriver {
    /// Create a mock driver with one table pre-populated.
    ///
    /// Panics if any row is not a JSON object. If test setup is wrong, then
    /// the test should not pass.
    pub fn with_rows(database: &str, table: &str, rows: impl IntoIterator<Item = Value>) -> Self {
        let rows = rows
            .into_iter()
            .map(|row| match row {
                Value::Object(record) => record,
                // The panic here is DELIBERATE. MockDriver is intended to be
                // used in tests; panics are expected. There is no error result.
                other => panic!("MockDriver::with_rows: row is not an object: {other}"),
            })
            .collect();
        Self {
            tables: RwLock::new(HashMap::from([(key(database, table), rows)])),
            ..Self::default()
        }
    }

    /// Change the name of the mock driver.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Delay every operation by `latency`, for cancellation and deadline
    /// tests.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make the next operation (of any kind) fail with `kind`.
    pub async fn fail_next(&self, kind: ErrorKind) {
        *self.failure.lock().await = Some(kind);
    }

    /// Number of times `operation` has been called.
    pub fn calls(&self, operation: Operation) -> usize {
        self.calls[operation as usize].load(AtomicOrdering::SeqCst)
    }

    /// Snapshot of every row currently stored in a table.
    pub async fn rows(&self, database: &str, table: &str) -> Vec<Record> {
        self.tables.read().await.get(&key(database, table)).cloned().unwrap_or_default()
    }

    async fn enter(&self, operation: Operation) -> Result<()> {
        self.calls[operation as usize].fetch_add(1, AtomicOrdering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(kind) = self.failure.lock().await.take() {
            tracing::info!(driver = %self.name, operation = ?operation, error = %kind, "Failing operation on request");
            exn::bail!(kind);
        }
        Ok(())
    }

    fn select(rows: &[Record], request: &ReadRequest) -> Vec<Record> {
        let mut matched: Vec<Record> =
            rows.iter().filter(|row| matches(row, request.filter.as_ref())).cloned().collect();
        let order = parse_order(&request.order_by);
        if !order.is_empty() {
            matched.sort_by(|a, b| {
                order
                    .iter()
                    .map(|(field, descending)| {
                        let ordering = compare(a.get(*field), b.get(*field));
                        if *descending { ordering.reverse() } else { ordering }
                    })
                    .find(|ordering| ordering.is_ne())
                    .unwrap_or(Ordering::Equal)
            });
        }
        matched.into_iter().map(|row| project(row, &request.columns)).collect()
    }
}
impl Default for MockDriver {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            tables: RwLock::new(HashMap::new()),
            calls: std::array::from_fn(|_| AtomicUsize::new(0)),
            failure: Mutex::new(None),
            latency: None,
        }
    }
}

fn key(database: &str, table: &str) -> TableKey {
    (database.to_string(), table.to_string())
}

fn matches(row: &Record, filter: Option<&Filter>) -> bool {
    filter.is_none_or(|filter| filter.iter().all(|(field, value)| row.get(field) == Some(value)))
}

fn project(row: Record, columns: &str) -> Record {
    let wanted: Vec<&str> = columns.split(',').map(str::trim).filter(|c| !c.is_empty() && *c != "*").collect();
    if wanted.is_empty() {
        return row;
    }
    row.into_iter().filter(|(field, _)| wanted.contains(&field.as_str())).collect()
}

fn parse_order(order_by: &str) -> Vec<(&str, bool)> {
    order_by
        .split(',')
        .map(str::trim)
        .filter(|field| !field.is_empty())
        .map(|field| match field.strip_prefix('-') {
            Some(field) => (field, true),
            None => (field.strip_prefix('+').unwrap_or(field), false),
        })
        .collect()
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => {
            a.as_f64().partial_cmp(&b.as_f64()).unwrap_or(Ordering::Equal)
        },
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        // Missing and null sort first.
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Less,
        (_, None | Some(Value::Null)) => Ordering::Greater,
        (Some(a), Some(b)) => a.to_string().cmp(&b.to_string()),
    }
}

#[async_trait]
impl Driver for MockDriver {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query(&self, _ctx: &Context, request: &ReadRequest) -> Result<Vec<Record>> {
        self.enter(Operation::Query).await?;
        let guard = self.tables.read().await;
        let rows = guard.get(&key(&request.database, &request.table)).map(Vec::as_slice).unwrap_or_default();
        let selected = Self::select(rows, request).into_iter().skip(request.offset() as usize);
        Ok(match request.limit {
            0 => selected.collect(),
            limit => selected.take(limit as usize).collect(),
        })
    }

    async fn query_one(&self, _ctx: &Context, request: &ReadRequest) -> Result<Record> {
        self.enter(Operation::QueryOne).await?;
        let guard = self.tables.read().await;
        let rows = guard.get(&key(&request.database, &request.table)).map(Vec::as_slice).unwrap_or_default();
        Self::select(rows, request)
            .into_iter()
            .next()
            .ok_or_else(|| exn::Exn::from(ErrorKind::RowNotFound(request.table.clone())))
    }

    async fn create_row(&self, _ctx: &Context, database: &str, table: &str, record: Record) -> Result<()> {
        self.enter(Operation::CreateRow).await?;
        self.tables.write().await.entry(key(database, table)).or_default().push(record);
        Ok(())
    }

    async fn update_rows(
        &self,
        _ctx: &Context,
        database: &str,
        table: &str,
        filter: Option<&Filter>,
        values: Record,
    ) -> Result<u64> {
        self.enter(Operation::UpdateRows).await?;
        let mut guard = self.tables.write().await;
        let Some(rows) = guard.get_mut(&key(database, table)) else {
            exn::bail!(ErrorKind::TableNotFound(table.to_string()));
        };
        let mut changed = 0;
        for row in rows.iter_mut().filter(|row| matches(row, filter)) {
            row.extend(values.clone());
            changed += 1;
        }
        Ok(changed)
    }

    async fn delete_rows(&self, _ctx: &Context, database: &str, table: &str, filter: Option<&Filter>) -> Result<u64> {
        self.enter(Operation::DeleteRows).await?;
        let mut guard = self.tables.write().await;
        let Some(rows) = guard.get_mut(&key(database, table)) else {
            exn::bail!(ErrorKind::TableNotFound(table.to_string()));
        };
        let before = rows.len();
        rows.retain(|row| !matches(row, filter));
        Ok((before - rows.len()) as u64)
    }

    async fn drop_table(&self, _ctx: &Context, database: &str, table: &str) -> Result<()> {
        self.enter(Operation::DropTable).await?;
        self.tables.write().await.remove(&key(database, table));
        Ok(())
    }

    async fn create_table(&self, _ctx: &Context, database: &str, table: &str) -> Result<()> {
        self.enter(Operation::CreateTable).await?;
        self.tables.write().await.entry(key(database, table)).or_default();
        Ok(())
    }

    async fn list_tables(&self, database: &str) -> Result<Vec<String>> {
        self.enter(Operation::ListTables).await?;
        let mut tables: Vec<String> =
            self.tables.read().await.keys().filter(|(db, _)| db == database).map(|(_, table)| table.clone()).collect();
        tables.sort();
        Ok(tables)
    }

    async fn list_columns(&self, database: &str, table: &str) -> Result<Columns> {
        self.enter(Operation::ListColumns).await?;
        let guard = self.tables.read().await;
        let rows = guard.get(&key(database, table)).ok_or_else(|| exn::Exn::from(ErrorKind::TableNotFound(table.to_string())))?;
        let mut columns = BTreeMap::new();
        for row in rows {
            for (field, value) in row {
                columns.entry(field.clone()).or_insert_with(|| type_name(value).to_string());
            }
        }
        Ok(columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn users() -> MockDriver {
        MockDriver::with_rows(
            "app",
            "users",
            [
                json!({"id": 1, "name": "ada", "age": 36}),
                json!({"id": 2, "name": "bob", "age": 25}),
                json!({"id": 3, "name": "cyd", "age": 41}),
            ],
        )
    }

    fn filter(field: &str, value: Value) -> Filter {
        Filter::from([(field.to_string(), value)])
    }

    #[tokio::test]
    async fn test_query_with_filter() {
        let driver = users();
        let request = ReadRequest::new("app", "users").with_filter(filter("name", json!("bob")));
        let rows = driver.query(&Context::background(), &request).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], json!(2));
    }

    #[tokio::test]
    async fn test_query_order_limit_page() {
        let driver = users();
        let request = ReadRequest::new("app", "users").with_order_by("-age").with_limit(2).with_page(2);
        let rows = driver.query(&Context::background(), &request).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], json!("bob"));
    }

    #[tokio::test]
    async fn test_query_projection() {
        let driver = users();
        let request = ReadRequest::new("app", "users").with_columns("name").with_order_by("+id");
        let rows = driver.query(&Context::background(), &request).await.unwrap();
        assert_eq!(rows[0], json!({"name": "ada"}).as_object().cloned().unwrap());
    }

    #[tokio::test]
    async fn test_query_unknown_table_is_empty() {
        let driver = users();
        let rows = driver.query(&Context::background(), &ReadRequest::new("app", "nope")).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_query_one_not_found() {
        let driver = users();
        let request = ReadRequest::new("app", "users").with_filter(filter("id", json!(99)));
        let err = driver.query_one(&Context::background(), &request).await.unwrap_err();
        assert_eq!(*err, ErrorKind::RowNotFound("users".to_string()));
    }

    #[tokio::test]
    async fn test_update_and_delete_counts() {
        let driver = users();
        let ctx = Context::background();
        let values = json!({"age": 50}).as_object().cloned().unwrap();
        let changed = driver.update_rows(&ctx, "app", "users", Some(&filter("id", json!(1))), values).await.unwrap();
        assert_eq!(changed, 1);
        assert_eq!(driver.rows("app", "users").await[0]["age"], json!(50));
        let removed = driver.delete_rows(&ctx, "app", "users", None).await.unwrap();
        assert_eq!(removed, 3);
        assert!(driver.rows("app", "users").await.is_empty());
    }

    #[tokio::test]
    async fn test_drop_and_list_tables() {
        let driver = users();
        let ctx = Context::background();
        driver.create_table(&ctx, "app", "posts").await.unwrap();
        assert_eq!(driver.list_tables("app").await.unwrap(), vec!["posts", "users"]);
        driver.drop_table(&ctx, "app", "users").await.unwrap();
        assert_eq!(driver.list_tables("app").await.unwrap(), vec!["posts"]);
        assert!(driver.list_tables("other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_columns() {
        let driver = users();
        let columns = driver.list_columns("app", "users").await.unwrap();
        assert_eq!(columns.get("name").map(String::as_str), Some("string"));
        assert_eq!(columns.get("age").map(String::as_str), Some("int"));
    }

    #[tokio::test]
    async fn test_call_counters_and_failure_injection() {
        let driver = users();
        let ctx = Context::background();
        driver.fail_next(ErrorKind::Connection("reset".to_string())).await;
        let err = driver.query(&ctx, &ReadRequest::new("app", "users")).await.unwrap_err();
        assert!(err.is_retryable());
        driver.query(&ctx, &ReadRequest::new("app", "users")).await.unwrap();
        assert_eq!(driver.calls(Operation::Query), 2);
        assert_eq!(driver.calls(Operation::QueryOne), 0);
    }

    #[test]
    #[should_panic(expected = "row is not an object")]
    fn test_with_rows_panics_on_non_object() {
        MockDriver::with_rows("app", "users", [json!(1)]);
    }
}
