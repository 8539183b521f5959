//! Document-store driver interface.
//!
//! The query builder treats the store as an external collaborator. This
//! crate is the contract between the two: the [`Driver`] trait, the
//! [`Record`]/[`Filter`] shapes that cross it, the cancellation [`Context`]
//! every call carries, and the driver error taxonomy.
//!
//! Enable the `mock` feature for an in-memory, call-counting
//! [`MockDriver`] suitable for tests.

pub mod context;
pub mod driver;
pub mod error;
mod models;

pub use crate::context::Context;
pub use crate::driver::Driver;
#[cfg(feature = "mock")]
pub use crate::driver::{MockDriver, Operation};
pub use crate::models::{Columns, Filter, ReadRequest, Record, type_name};
pub use serde_json::Value;
use std::sync::Arc;

pub type DriverHandle = Arc<dyn Driver + Send + Sync>;
