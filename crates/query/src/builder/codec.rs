//! Row codecs: how each builder flavor turns documents into rows and which
//! caches it reads and writes.

use crate::error::{ErrorKind, Result};
use docket_cache::{AnyValue, CacheSet, Fingerprint};
use docket_driver::{Record, Value};
use exn::ResultExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::any::TypeId;
use std::marker::PhantomData;
use std::sync::Arc;

/// A record type the typed builder can read and write.
///
/// Blanket-implemented for anything serde can map to and from a JSON
/// object.
pub trait Model: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}
impl<T> Model for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// Row representation of one builder flavor.
pub trait RowCodec: Send + Sync + 'static {
    type Row: Clone + Send + Sync + 'static;

    fn decode(table: &str, record: Record) -> Result<Self::Row>;

    fn cached_all(caches: &CacheSet, fingerprint: &Fingerprint) -> Option<Vec<Self::Row>>;
    fn cache_all(caches: &CacheSet, fingerprint: Fingerprint, rows: &[Self::Row]);

    fn cached_one(caches: &CacheSet, fingerprint: &Fingerprint) -> Option<Self::Row>;
    fn cache_one(caches: &CacheSet, fingerprint: Fingerprint, row: &Self::Row);
}

/// Free-form documents, passed through as they come from the driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct Untyped;
impl RowCodec for Untyped {
    type Row = Record;

    fn decode(_table: &str, record: Record) -> Result<Record> {
        Ok(record)
    }

    fn cached_all(caches: &CacheSet, fingerprint: &Fingerprint) -> Option<Vec<Record>> {
        caches.rows_all.lookup(fingerprint).map(|rows| rows.as_ref().clone())
    }

    fn cache_all(caches: &CacheSet, fingerprint: Fingerprint, rows: &[Record]) {
        caches.rows_all.store(fingerprint, Arc::new(rows.to_vec()));
    }

    fn cached_one(caches: &CacheSet, fingerprint: &Fingerprint) -> Option<Record> {
        caches.rows_one.lookup(fingerprint).map(|row| row.as_ref().clone())
    }

    fn cache_one(caches: &CacheSet, fingerprint: Fingerprint, row: &Record) {
        caches.rows_one.store(fingerprint, Arc::new(row.clone()));
    }
}

/// Documents (de)serialized as `T`.
///
/// Cache entries are keyed by `T` as well as the fingerprint, so two record
/// types reading the same table never see each other's values.
pub struct Typed<T>(PhantomData<fn() -> T>);
impl<T: Model> Typed<T> {
    pub(crate) fn encode(table: &str, row: &T) -> Result<Record> {
        match serde_json::to_value(row).or_raise(|| ErrorKind::Encode(table.to_string()))? {
            Value::Object(record) => Ok(record),
            _ => exn::bail!(ErrorKind::Encode(table.to_string())),
        }
    }

    fn key(fingerprint: Fingerprint) -> (TypeId, Fingerprint) {
        (TypeId::of::<T>(), fingerprint)
    }
}
impl<T: Model> RowCodec for Typed<T> {
    type Row = T;

    fn decode(table: &str, record: Record) -> Result<T> {
        serde_json::from_value(Value::Object(record)).or_raise(|| ErrorKind::Decode(table.to_string()))
    }

    fn cached_all(caches: &CacheSet, fingerprint: &Fingerprint) -> Option<Vec<T>> {
        let value = caches.models_all.lookup(&Self::key(fingerprint.clone()))?;
        value.downcast::<Vec<T>>().ok().map(|rows| rows.as_ref().clone())
    }

    fn cache_all(caches: &CacheSet, fingerprint: Fingerprint, rows: &[T]) {
        let value: AnyValue = Arc::new(rows.to_vec());
        caches.models_all.store(Self::key(fingerprint), value);
    }

    fn cached_one(caches: &CacheSet, fingerprint: &Fingerprint) -> Option<T> {
        let value = caches.models_one.lookup(&Self::key(fingerprint.clone()))?;
        value.downcast::<T>().ok().map(|row| row.as_ref().clone())
    }

    fn cache_one(caches: &CacheSet, fingerprint: Fingerprint, row: &T) {
        let value: AnyValue = Arc::new(row.clone());
        caches.models_one.store(Self::key(fingerprint), value);
    }
}
