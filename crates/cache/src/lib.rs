//! Query result cache with event-driven invalidation.
//!
//! This crate holds the results of read queries against a document store,
//! keyed by a [`Fingerprint`] of every parameter that affects the result.
//! The cache is never the source of truth: any entry may be thrown away at
//! any time and the next read simply goes back to the store.
//!
//! # Architecture
//! - **Caches**: a [`CacheSet`] of concurrent maps (untyped rows, typed
//!   models, per-database table lists) behind one on/off [`Switch`].
//! - **Invalidation**: mutations publish an [`InvalidationEvent`] on the
//!   [`InvalidationBus`]; a single subscriber task applies them in order.
//!   Create, update and delete evict one table's entries; drop and clean
//!   flush everything.
//! - **Sweeping**: a [`Sweeper`] publishes a clean event on a fixed
//!   interval, bounding staleness even when an event is lost.

mod bus;
mod caches;
mod event;
mod fingerprint;
mod store;
mod sweeper;

pub use crate::bus::InvalidationBus;
pub use crate::caches::{AnyValue, CacheSet, ModelKey};
pub use crate::event::{EventKind, InvalidationEvent, Scope};
pub use crate::fingerprint::Fingerprint;
pub use crate::store::{ResultCache, Switch};
pub use crate::sweeper::{DEFAULT_SWEEP_INTERVAL, Sweeper};
