//! The full set of result caches shared by every builder.

use crate::event::{InvalidationEvent, Scope};
use crate::fingerprint::Fingerprint;
use crate::store::{ResultCache, Switch};
use docket_driver::Record;
use std::any::{Any, TypeId};
use std::sync::Arc;

/// Key of the typed caches: the record type plus the query fingerprint.
///
/// Two record types mapped onto the same table decode differently, so they
/// must not share entries.
pub type ModelKey = (TypeId, Fingerprint);

/// Type-erased cached value of the typed caches (`Vec<T>` or `T`).
pub type AnyValue = Arc<dyn Any + Send + Sync>;

/// Every cache behind one switch.
///
/// - `rows_all` / `rows_one`: untyped builder results.
/// - `models_all` / `models_one`: typed builder results.
/// - `tables`: table names per database.
pub struct CacheSet {
    switch: Switch,
    pub rows_all: ResultCache<Fingerprint, Arc<Vec<Record>>>,
    pub rows_one: ResultCache<Fingerprint, Arc<Record>>,
    pub models_all: ResultCache<ModelKey, AnyValue>,
    pub models_one: ResultCache<ModelKey, AnyValue>,
    pub tables: ResultCache<String, Arc<Vec<String>>>,
}
impl CacheSet {
    pub fn new(enabled: bool) -> Self {
        let switch = Switch::new(enabled);
        Self {
            rows_all: ResultCache::new(switch.clone()),
            rows_one: ResultCache::new(switch.clone()),
            models_all: ResultCache::new(switch.clone()),
            models_one: ResultCache::new(switch.clone()),
            tables: ResultCache::new(switch.clone()),
            switch,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.switch.is_enabled()
    }

    /// Turn caching on or off.
    ///
    /// Turning it off also empties every cache: mutations made while
    /// disabled publish no events, so anything kept would be stale by the
    /// time caching is turned back on.
    pub fn set_enabled(&self, enabled: bool) {
        let was = self.switch.set(enabled);
        if was && !enabled {
            self.flush_all();
        }
        tracing::debug!(enabled, "Query cache toggled");
    }

    /// Remove every result read from `table` in `database`. The table-list
    /// cache is left alone. Returns the number of entries removed.
    pub fn evict_table(&self, database: &str, table: &str) -> usize {
        self.rows_all.remove_where(|fp| fp.belongs_to(database, table))
            + self.rows_one.remove_where(|fp| fp.belongs_to(database, table))
            + self.models_all.remove_where(|(_, fp)| fp.belongs_to(database, table))
            + self.models_one.remove_where(|(_, fp)| fp.belongs_to(database, table))
    }

    /// Empty every cache, including the table-list cache. Returns the number
    /// of entries removed.
    pub fn flush_all(&self) -> usize {
        self.rows_all.flush()
            + self.rows_one.flush()
            + self.models_all.flush()
            + self.models_one.flush()
            + self.tables.flush()
    }

    /// Apply one invalidation event.
    pub fn apply(&self, event: &InvalidationEvent) -> usize {
        let removed = match event.scope() {
            Scope::Table { database, table } => self.evict_table(database, table),
            Scope::Everything => self.flush_all(),
        };
        tracing::debug!(
            kind = %event.kind,
            table = event.table.as_deref(),
            database = event.database.as_deref(),
            removed,
            "Applied cache invalidation"
        );
        removed
    }

    pub fn len(&self) -> usize {
        self.rows_all.len() + self.rows_one.len() + self.models_all.len() + self.models_one.len() + self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
impl Default for CacheSet {
    fn default() -> Self {
        Self::new(true)
    }
}
