//! Fluent query builders.
//!
//! [`Builder`] accumulates read parameters through chained calls and is
//! consumed by exactly one terminal operation. Reads go through the result
//! cache; writes go to the driver and announce an invalidation event.
//!
//! The two flavors differ only in their [`RowCodec`]: [`TableBuilder`]
//! yields free-form [`Record`]s, [`ModelBuilder`] yields a serde type.

mod codec;
mod model;
mod table;

pub use self::codec::{Model, RowCodec, Typed, Untyped};
use crate::docket::Docket;
use crate::error::{Error, ErrorKind, Result};
use crate::filter::{parse_assignments, parse_filter, strip_order_prefix};
use docket_cache::{EventKind, Fingerprint, InvalidationEvent};
use docket_driver::{Context, DriverHandle, Filter, ReadRequest, Record, Value};
use std::marker::PhantomData;
use tracing::instrument;

/// Builder over free-form documents.
pub type TableBuilder = Builder<Untyped>;
/// Builder over documents (de)serialized as `T`.
pub type ModelBuilder<T> = Builder<Typed<T>>;

/// Accumulated query state.
///
/// Non-terminal methods need a table. Calling one on a builder without a
/// table poisons it: a warning is logged, every later call is ignored and
/// the terminal operation returns the usage error.
#[must_use = "builders do nothing until a terminal operation is awaited"]
pub struct Builder<C: RowCodec> {
    docket: Docket,
    table: String,
    database: Option<String>,
    columns: String,
    clause: String,
    args: Vec<Value>,
    order_by: String,
    limit: u64,
    page: u64,
    debug: bool,
    context: Context,
    poisoned: Option<ErrorKind>,
    codec: PhantomData<C>,
}

impl<C: RowCodec> Builder<C> {
    pub(crate) fn new(docket: Docket, table: String) -> Self {
        Self {
            debug: docket.config().debug,
            docket,
            table,
            database: None,
            columns: String::new(),
            clause: String::new(),
            args: Vec::new(),
            order_by: String::new(),
            limit: 0,
            page: 0,
            context: Context::background(),
            poisoned: None,
            codec: PhantomData,
        }
    }

    /// A builder that fails at its terminal operation with `kind`.
    pub(crate) fn failed(docket: Docket, kind: ErrorKind) -> Self {
        let mut builder = Self::new(docket, String::new());
        builder.poisoned = Some(kind);
        builder
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn guard(mut self, method: &str, apply: impl FnOnce(&mut Self)) -> Self {
        if self.poisoned.is_some() {
            return self;
        }
        if self.table.is_empty() {
            tracing::warn!(method, "Query builder used before a table was chosen");
            self.poisoned = Some(ErrorKind::usage(format!("choose a table before calling {method}()")));
            return self;
        }
        apply(&mut self);
        self
    }

    /// Columns to return. Empty or `*` means every column.
    pub fn select<I, S>(self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.guard("select", |builder| builder.columns = join(columns))
    }

    /// Equality filter: a comma-separated field list matched positionally
    /// against `args`.
    ///
    /// A later call replaces the clause but appends its arguments to those
    /// already given. When the field and argument counts disagree the
    /// filter is ignored entirely.
    pub fn filter(self, clause: impl Into<String>, args: impl IntoIterator<Item = Value>) -> Self {
        self.guard("filter", |builder| {
            builder.clause = clause.into();
            builder.args.extend(args);
        })
    }

    /// Maximum number of rows; zero means unlimited.
    pub fn limit(self, limit: u64) -> Self {
        self.guard("limit", |builder| builder.limit = limit)
    }

    /// One-based page of `limit` rows.
    pub fn page(self, page: u64) -> Self {
        self.guard("page", |builder| builder.page = page)
    }

    /// Sort fields, each optionally prefixed with `+` (ascending, the
    /// default) or `-` (descending).
    pub fn order_by<I, S>(self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.guard("order_by", |builder| builder.order_by = join(fields))
    }

    /// Target a registered database instead of the default.
    pub fn database(self, name: impl Into<String>) -> Self {
        self.guard("database", |builder| builder.database = Some(name.into()))
    }

    /// Log the resolved query at `info` level before it is sent.
    pub fn debug(self) -> Self {
        self.guard("debug", |builder| builder.debug = true)
    }

    /// Cancellation token and deadline for the driver call.
    pub fn context(self, context: Context) -> Self {
        self.guard("context", |builder| builder.context = context)
    }

    /// Surface a poisoned state or a missing table, then resolve the
    /// database.
    fn prepare(&mut self) -> Result<(String, DriverHandle)> {
        if let Some(kind) = self.poisoned.take() {
            exn::bail!(kind);
        }
        if self.table.is_empty() {
            return Err(misuse("choose a table before running a query".to_string()));
        }
        self.docket.registry().resolve(self.database.as_deref())
    }

    fn fingerprint(&self, database: &str) -> Fingerprint {
        Fingerprint::new(database, &self.table)
            .with_columns(&self.columns)
            .with_clause(&self.clause)
            .with_args(&self.args)
            .with_order_by(&self.order_by)
            .with_limit(self.limit)
            .with_page(self.page)
    }

    fn request(&self, database: &str, filter: Option<Filter>, order_by: &str) -> ReadRequest {
        let request = ReadRequest::new(database, &self.table)
            .with_columns(&self.columns)
            .with_filter(filter)
            .with_order_by(order_by)
            .with_limit(self.limit)
            .with_page(self.page);
        if self.debug {
            tracing::info!(
                database,
                table = %self.table,
                columns = %self.columns,
                filter = ?request.filter,
                order_by,
                limit = self.limit,
                page = self.page,
                "Sending query"
            );
        }
        request
    }

    /// Every matching row.
    #[instrument(level = "debug", skip(self), fields(table = %self.table))]
    pub async fn all(mut self) -> Result<Vec<C::Row>> {
        let (database, driver) = self.prepare()?;
        let filter = parse_filter(&self.clause, &self.args);
        let fingerprint = self.fingerprint(&database);
        let caches = self.docket.caches();
        if let Some(rows) = C::cached_all(caches, &fingerprint) {
            tracing::trace!(database = %database, "Query cache hit");
            return Ok(rows);
        }
        let request = self.request(&database, filter, &self.order_by);
        let records = self.context.run(driver.query(&self.context, &request)).await.map_err(ErrorKind::driver)?;
        let rows = records.into_iter().map(|record| C::decode(&self.table, record)).collect::<Result<Vec<_>>>()?;
        C::cache_all(caches, fingerprint, &rows);
        Ok(rows)
    }

    /// The first matching row. Fails with the driver's not-found error when
    /// nothing matches.
    #[instrument(level = "debug", skip(self), fields(table = %self.table))]
    pub async fn one(mut self) -> Result<C::Row> {
        let (database, driver) = self.prepare()?;
        let filter = parse_filter(&self.clause, &self.args);
        let fingerprint = self.fingerprint(&database);
        let caches = self.docket.caches();
        if let Some(row) = C::cached_one(caches, &fingerprint) {
            tracing::trace!(database = %database, "Query cache hit");
            return Ok(row);
        }
        let request = self.request(&database, filter, strip_order_prefix(&self.order_by));
        let record = self.context.run(driver.query_one(&self.context, &request)).await.map_err(ErrorKind::driver)?;
        let row = C::decode(&self.table, record)?;
        C::cache_one(caches, fingerprint, &row);
        Ok(row)
    }

    /// Apply `field=value` assignments to every row matching the filter.
    /// Returns the number of rows changed.
    #[instrument(level = "debug", skip(self), fields(table = %self.table))]
    pub async fn set(mut self, assignments: &str) -> Result<u64> {
        let (database, driver) = self.prepare()?;
        let values = parse_assignments(assignments).map_err(misuse)?;
        let filter = parse_filter(&self.clause, &self.args);
        self.announce(EventKind::Update, &database);
        let update = driver.update_rows(&self.context, &database, &self.table, filter.as_ref(), values);
        self.context.run(update).await.map_err(ErrorKind::driver)
    }

    /// Remove every row matching the filter. Returns the number removed.
    #[instrument(level = "debug", skip(self), fields(table = %self.table))]
    pub async fn delete(mut self) -> Result<u64> {
        let (database, driver) = self.prepare()?;
        let filter = parse_filter(&self.clause, &self.args);
        self.announce(EventKind::Delete, &database);
        let delete = driver.delete_rows(&self.context, &database, &self.table, filter.as_ref());
        self.context.run(delete).await.map_err(ErrorKind::driver)
    }

    /// Drop the whole table. Every cache is flushed, not just this table's
    /// entries.
    #[instrument(level = "debug", skip(self), fields(table = %self.table))]
    pub async fn drop_table(mut self) -> Result<()> {
        let (database, driver) = self.prepare()?;
        self.announce(EventKind::Drop, &database);
        self.context.run(driver.drop_table(&self.context, &database, &self.table)).await.map_err(ErrorKind::driver)?;
        self.docket.registry().forget_table(&database, &self.table);
        Ok(())
    }

    async fn create(&self, database: &str, driver: DriverHandle, record: Record) -> Result<u64> {
        self.announce(EventKind::Create, database);
        let create = driver.create_row(&self.context, database, &self.table, record);
        self.context.run(create).await.map_err(ErrorKind::driver)?;
        Ok(1)
    }

    /// Publish before touching the driver; delivery is never awaited and a
    /// failure to deliver is not the caller's problem.
    fn announce(&self, kind: EventKind, database: &str) {
        if self.docket.caches().is_enabled() {
            self.docket.bus().publish(InvalidationEvent::mutation(kind, database, &self.table));
        }
    }
}

fn join<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items.into_iter().map(|item| item.as_ref().to_string()).collect::<Vec<_>>().join(",")
}

fn misuse(message: String) -> Error {
    tracing::warn!(%message, "Query builder misuse");
    exn::Exn::from(ErrorKind::Usage(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args;
    use docket_config::Config;
    use docket_driver::error::ErrorKind as DriverErrorKind;
    use docket_driver::{MockDriver, Operation};
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct User {
        id: u64,
        name: String,
    }

    fn users() -> Arc<MockDriver> {
        Arc::new(MockDriver::with_rows("db1", "users", [json!({"id": 1, "name": "x"}), json!({"id": 3, "name": "z"})]))
    }

    fn setup_with(config: Config) -> (Docket, Arc<MockDriver>) {
        let driver = users();
        let docket = Docket::new(config).unwrap();
        assert!(docket.register("db1", driver.clone()).unwrap());
        (docket, driver)
    }

    fn setup() -> (Docket, Arc<MockDriver>) {
        setup_with(Config::default())
    }

    #[tokio::test]
    async fn test_insert_invalidates_cached_read() {
        let (docket, driver) = setup();
        let user = docket.table("users").filter("id", args![1]).one().await.unwrap();
        assert_eq!(user.get("name"), Some(&json!("x")));
        assert_eq!(driver.calls(Operation::QueryOne), 1);

        docket.table("users").filter("id", args![1]).one().await.unwrap();
        assert_eq!(driver.calls(Operation::QueryOne), 1);

        assert_eq!(docket.table("users").insert("id,name", args![2, "y"]).await.unwrap(), 1);
        docket.settle().await;
        docket.table("users").filter("id", args![1]).one().await.unwrap();
        assert_eq!(driver.calls(Operation::QueryOne), 2);
        assert_eq!(driver.rows("db1", "users").await.len(), 3);
    }

    #[tokio::test]
    async fn test_any_read_parameter_change_misses() {
        let (docket, driver) = setup();
        let read = || docket.table("users").select(["id"]).order_by(["-id"]).limit(10);
        read().all().await.unwrap();
        read().all().await.unwrap();
        assert_eq!(driver.calls(Operation::Query), 1);
        read().limit(1).all().await.unwrap();
        read().page(2).all().await.unwrap();
        read().select(["name"]).all().await.unwrap();
        read().order_by(["id"]).all().await.unwrap();
        read().filter("id", args![3]).all().await.unwrap();
        read().filter("id", args![1]).all().await.unwrap();
        assert_eq!(driver.calls(Operation::Query), 7);
    }

    #[tokio::test]
    async fn test_read_results() {
        let (docket, _driver) = setup();
        let rows = docket.table("users").order_by(["-id"]).all().await.unwrap();
        let ids: Vec<_> = rows.iter().map(|row| row["id"].clone()).collect();
        assert_eq!(ids, vec![json!(3), json!(1)]);

        let rows = docket.table("users").select(["name"]).filter("id", args![3]).all().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(Value::Object(rows[0].clone()), json!({"name": "z"}));
    }

    #[tokio::test]
    async fn test_mismatched_filter_is_dropped() {
        let (docket, _driver) = setup();
        let rows = docket.table("users").filter("id,name", args![1]).all().await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_one_strips_order_keyword() {
        let (docket, _driver) = setup();
        let row = docket.table("users").order_by(["ORDER BY -id"]).one().await.unwrap();
        assert_eq!(row["id"], json!(3));
    }

    #[tokio::test]
    async fn test_mutation_only_evicts_its_table() {
        let (docket, driver) = setup();
        docket.table("users").all().await.unwrap();
        docket.table("posts").all().await.unwrap();
        assert_eq!(driver.calls(Operation::Query), 2);

        assert_eq!(docket.table("users").filter("id", args![1]).set("name=q").await.unwrap(), 1);
        docket.settle().await;

        docket.table("posts").all().await.unwrap();
        assert_eq!(driver.calls(Operation::Query), 2);
        let rows = docket.table("users").all().await.unwrap();
        assert_eq!(driver.calls(Operation::Query), 3);
        assert_eq!(rows[0]["name"], json!("q"));
        assert_eq!(rows[1]["name"], json!("z"));
    }

    #[tokio::test]
    async fn test_mutation_is_scoped_to_its_database() {
        let (docket, first) = setup();
        let second = Arc::new(MockDriver::with_rows("db2", "users", [json!({"id": 1}), json!({"id": 3})]));
        docket.register("db2", second.clone()).unwrap();
        docket.table("users").all().await.unwrap();
        docket.table("users").database("db2").all().await.unwrap();

        assert_eq!(docket.table("users").database("db2").filter("id", args![3]).delete().await.unwrap(), 1);
        docket.settle().await;

        docket.table("users").all().await.unwrap();
        docket.table("users").database("db2").all().await.unwrap();
        assert_eq!(first.calls(Operation::Query), 1);
        assert_eq!(second.calls(Operation::Query), 2);
        assert_eq!(second.rows("db2", "users").await.len(), 1);
        assert_eq!(first.rows("db1", "users").await.len(), 2);
    }

    #[tokio::test]
    async fn test_pages_past_the_end_are_empty() {
        let (docket, _driver) = setup();
        let rows = docket.table("users").limit(1).page(2).all().await.unwrap();
        assert_eq!(rows.len(), 1);
        let rows = docket.table("users").limit(u64::MAX / 2).page(4).all().await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_drop_flushes_everything() {
        let (docket, driver) = setup();
        docket.table("users").all().await.unwrap();
        docket.table("users").filter("id", args![1]).one().await.unwrap();
        docket.list_tables(None).await.unwrap();
        assert!(!docket.caches().is_empty());

        docket.table("posts").drop_table().await.unwrap();
        docket.settle().await;
        assert!(docket.caches().is_empty());

        docket.list_tables(None).await.unwrap();
        assert_eq!(driver.calls(Operation::ListTables), 2);
        assert_eq!(driver.calls(Operation::DropTable), 1);
    }

    #[tokio::test]
    async fn test_flush_cache() {
        let (docket, driver) = setup();
        docket.table("users").all().await.unwrap();
        assert!(docket.flush_cache());
        docket.settle().await;
        assert!(docket.caches().is_empty());
        docket.table("users").all().await.unwrap();
        assert_eq!(driver.calls(Operation::Query), 2);
    }

    #[tokio::test]
    async fn test_disabled_cache_always_reads_through() {
        let mut config = Config::default();
        config.cache.enabled = false;
        let (docket, driver) = setup_with(config);
        assert!(!docket.cache_enabled());
        docket.table("users").all().await.unwrap();
        docket.table("users").all().await.unwrap();
        assert_eq!(driver.calls(Operation::Query), 2);
        assert!(docket.caches().is_empty());

        docket.enable_cache();
        docket.table("users").all().await.unwrap();
        docket.table("users").all().await.unwrap();
        assert_eq!(driver.calls(Operation::Query), 3);

        docket.disable_cache();
        assert!(docket.caches().is_empty());
    }

    #[tokio::test]
    async fn test_driver_errors_are_not_cached() {
        let (docket, driver) = setup();
        driver.fail_next(DriverErrorKind::Connection("reset".to_string())).await;
        let err = docket.table("users").filter("id", args![1]).one().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Driver(DriverErrorKind::Connection(_))));
        assert!(err.is_retryable());
        assert!(docket.caches().is_empty());

        docket.table("users").filter("id", args![1]).one().await.unwrap();
        docket.table("users").filter("id", args![1]).one().await.unwrap();
        assert_eq!(driver.calls(Operation::QueryOne), 2);
    }

    #[tokio::test]
    async fn test_missing_row() {
        let (docket, _driver) = setup();
        let err = docket.table("users").filter("id", args![99]).one().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Driver(DriverErrorKind::RowNotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_and_cancellation() {
        let driver = Arc::new(MockDriver::default().with_latency(Duration::from_secs(10)));
        let docket = Docket::new(Config::default()).unwrap();
        docket.register("db1", driver).unwrap();

        let context = Context::background().with_timeout(Duration::from_secs(1));
        let err = docket.table("users").context(context).all().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Driver(DriverErrorKind::DeadlineExceeded)));

        let token = CancellationToken::new();
        token.cancel();
        let context = Context::background().with_cancellation(token);
        let err = docket.table("users").context(context).all().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Driver(DriverErrorKind::Cancelled)));
        assert!(docket.caches().is_empty());
    }

    #[tokio::test]
    async fn test_builder_without_table_is_poisoned() {
        let (docket, driver) = setup();
        let err = docket.table("").filter("id", args![1]).limit(5).all().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Usage(message) if message.contains("filter")));
        let err = docket.table("").delete().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Usage(_)));
        assert_eq!(driver.calls(Operation::Query), 0);
        assert_eq!(driver.calls(Operation::DeleteRows), 0);
    }

    #[tokio::test]
    async fn test_bad_mutation_payloads() {
        let (docket, driver) = setup();
        docket.table("users").all().await.unwrap();

        let err = docket.table("users").insert("id,name", args![2]).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Usage(_)));
        let err = docket.table("users").set("name").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Usage(_)));

        docket.settle().await;
        assert_eq!(driver.calls(Operation::CreateRow), 0);
        assert_eq!(driver.calls(Operation::UpdateRows), 0);
        assert_eq!(docket.caches().rows_all.len(), 1, "rejected mutations publish nothing");
    }

    #[tokio::test]
    async fn test_unknown_database() {
        let (docket, driver) = setup();
        let err = docket.table("users").database("db9").all().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::DatabaseNotFound(name) if name == "db9"));
        let err = docket.model_as::<User>("users").database("db9").one().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::DatabaseNotFound(_)));
        assert_eq!(driver.calls(Operation::Query) + driver.calls(Operation::QueryOne), 0);
    }

    #[tokio::test]
    async fn test_default_database_aliases() {
        let (docket, driver) = setup();
        docket.table("users").all().await.unwrap();
        docket.table("users").database("default").all().await.unwrap();
        docket.table("users").database("db1").all().await.unwrap();
        assert_eq!(driver.calls(Operation::Query), 1);
    }

    #[tokio::test]
    async fn test_typed_reads_and_writes() {
        let (docket, driver) = setup();
        docket.link::<User>("users");
        let user = docket.model::<User>().filter("id", args![1]).one().await.unwrap();
        assert_eq!(user, User { id: 1, name: "x".to_string() });
        docket.model::<User>().filter("id", args![1]).one().await.unwrap();
        assert_eq!(driver.calls(Operation::QueryOne), 1);

        // Untyped reads have their own entries.
        docket.table("users").filter("id", args![1]).one().await.unwrap();
        assert_eq!(driver.calls(Operation::QueryOne), 2);

        let all = docket.model::<User>().order_by(["id"]).all().await.unwrap();
        assert_eq!(all.len(), 2);
        docket.model::<User>().insert(&User { id: 2, name: "y".to_string() }).await.unwrap();
        docket.settle().await;
        let all = docket.model::<User>().order_by(["id"]).all().await.unwrap();
        assert_eq!(all.iter().map(|user| user.id).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(driver.calls(Operation::Query), 2);
    }

    #[tokio::test]
    async fn test_typed_mutations_invalidate_untyped_reads() {
        let (docket, driver) = setup();
        docket.link::<User>("users");
        docket.table("users").all().await.unwrap();
        assert_eq!(docket.model::<User>().filter("id", args![3]).set("name=w").await.unwrap(), 1);
        docket.settle().await;
        docket.table("users").all().await.unwrap();
        assert_eq!(driver.calls(Operation::Query), 2);
    }

    #[tokio::test]
    async fn test_unlinked_model() {
        let (docket, driver) = setup();
        let err = docket.model::<User>().limit(1).all().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::ModelNotRegistered(_)));
        assert_eq!(driver.calls(Operation::Query), 0);

        assert_eq!(docket.model_as::<User>("users").all().await.unwrap().len(), 2);
        assert_eq!(docket.model_as::<User>("people").table(), "users");
        assert_eq!(docket.model::<User>().table(), "users");
    }

    #[tokio::test]
    async fn test_undecodable_rows() {
        #[derive(Debug, Clone, Serialize, Deserialize)]
        struct Strict {
            email: String,
        }
        let (docket, _driver) = setup();
        let err = docket.model_as::<Strict>("users").all().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Decode(table) if table == "users"));
        assert!(docket.caches().is_empty());
    }
}
