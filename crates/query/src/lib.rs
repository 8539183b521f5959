//! Fluent, cached query builders over a document-store driver.
//!
//! A [`Docket`] owns the registered databases, the record-type registry and
//! the result caches. Builders created from it memoize reads under a
//! fingerprint of every read parameter; mutations go straight to the driver
//! and publish an invalidation event that evicts exactly the affected
//! entries.
//!
//! # Flavors
//! - [`Docket::table`] returns a [`TableBuilder`] yielding free-form
//!   [`Record`]s.
//! - [`Docket::model`] returns a [`ModelBuilder`] yielding any serde type
//!   linked to a table with [`Docket::link`] or [`Docket::auto_migrate`].
//!
//! Both share one engine, so caching and invalidation behave identically.

mod builder;
mod docket;
pub mod error;
mod filter;
mod registry;

pub use crate::builder::{Builder, Model, ModelBuilder, RowCodec, TableBuilder, Typed, Untyped};
pub use crate::docket::Docket;
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::filter::parse_filter;
pub use crate::registry::{DatabaseInfo, TableEntity};
pub use docket_driver::{Columns, Context, Driver, DriverHandle, Filter, Record, Value};

/// Positional arguments for [`Builder::filter`] and
/// [`TableBuilder::insert`], from anything convertible into a [`Value`].
///
/// ```
/// use docket_query::{Value, args};
///
/// let args = args![1, "y", true];
/// assert_eq!(args, vec![Value::from(1), Value::from("y"), Value::from(true)]);
/// ```
#[macro_export]
macro_rules! args {
    () => {
        ::std::vec::Vec::<$crate::Value>::new()
    };
    ($($arg:expr),+ $(,)?) => {
        ::std::vec![$($crate::Value::from($arg)),+]
    };
}
