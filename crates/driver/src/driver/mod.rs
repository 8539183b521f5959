//! Driver trait and implementations.
//!
//! This module defines the `Driver` trait, the single seam between the query
//! builder and whatever document store actually holds the data. The builder
//! never talks to a store directly; it resolves a database name to a
//! [`DriverHandle`](crate::DriverHandle) and calls through this trait.

#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "mock")]
pub use self::mock::{MockDriver, Operation};
use crate::context::Context;
use crate::error::Result;
use crate::models::{Columns, Filter, ReadRequest, Record};
use async_trait::async_trait;

/// Unified interface for document-store drivers.
///
/// All operations are asynchronous and take a [`Context`]; callers
/// additionally wrap each call in [`Context::run`], so an implementation
/// that ignores the context still cannot block a cancelled caller.
///
/// Every method names the database explicitly, allowing one driver instance
/// to serve several databases on the same connection.
///
/// # Examples
///
/// ```
/// use docket_driver::{Context, Driver, ReadRequest, Record, error::Result};
///
/// async fn newest_user(driver: &dyn Driver) -> Result<Record> {
///     let request = ReadRequest::new("app", "users").with_order_by("-created_at");
///     driver.query_one(&Context::background(), &request).await
/// }
/// ```
#[async_trait]
pub trait Driver: Send + Sync {
    /// Name of the driver, used for logging only.
    fn name(&self) -> &str;

    /// Fetch every row matching the request, honouring projection, ordering,
    /// limit and page.
    async fn query(&self, ctx: &Context, request: &ReadRequest) -> Result<Vec<Record>>;

    /// Fetch the first row matching the request.
    ///
    /// Returns [`RowNotFound`](crate::error::ErrorKind::RowNotFound) when
    /// nothing matches. Limit and page are ignored.
    async fn query_one(&self, ctx: &Context, request: &ReadRequest) -> Result<Record>;

    /// Insert a new row, creating the table if the store does so implicitly.
    async fn create_row(&self, ctx: &Context, database: &str, table: &str, record: Record) -> Result<()>;

    /// Merge `values` into every row matching `filter` (all rows when
    /// `None`). Returns the number of rows changed.
    async fn update_rows(
        &self,
        ctx: &Context,
        database: &str,
        table: &str,
        filter: Option<&Filter>,
        values: Record,
    ) -> Result<u64>;

    /// Delete every row matching `filter` (all rows when `None`). Returns
    /// the number of rows removed.
    async fn delete_rows(&self, ctx: &Context, database: &str, table: &str, filter: Option<&Filter>) -> Result<u64>;

    /// Drop the table and all of its rows.
    async fn drop_table(&self, ctx: &Context, database: &str, table: &str) -> Result<()>;

    /// Create an empty table.
    ///
    /// Default implementation does nothing, which suits stores that create
    /// collections on first insert.
    async fn create_table(&self, ctx: &Context, database: &str, table: &str) -> Result<()> {
        let _ = (ctx, database, table);
        Ok(())
    }

    /// Names of every table in the database.
    async fn list_tables(&self, database: &str) -> Result<Vec<String>>;

    /// Column names and their types for a table.
    async fn list_columns(&self, database: &str, table: &str) -> Result<Columns>;

    /// Release any connections held for the database.
    async fn close(&self, database: &str) -> Result<()> {
        let _ = database;
        Ok(())
    }
}
