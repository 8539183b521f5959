//! In-memory registries: databases with their driver handles, and record
//! types with their tables.

use crate::error::{ErrorKind, Result};
use docket_driver::{Columns, DriverHandle};
use exn::OptionExt;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Names that always mean "the default database".
const DEFAULT_ALIASES: [&str; 2] = ["", "default"];

/// A table known to the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEntity {
    pub name: String,
    /// Column name to type name.
    pub columns: Columns,
}

/// Snapshot of one registered database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseInfo {
    pub name: String,
    /// Name reported by the database's driver.
    pub driver: String,
    pub tables: Vec<TableEntity>,
}

struct DatabaseEntry {
    name: String,
    driver: DriverHandle,
    tables: Vec<TableEntity>,
}

/// Registered databases in registration order.
///
/// Written at registration and migration time, read on every terminal
/// builder call.
pub(crate) struct DatabaseRegistry {
    configured_default: Option<String>,
    entries: RwLock<Vec<DatabaseEntry>>,
}
impl DatabaseRegistry {
    pub fn new(configured_default: Option<String>) -> Self {
        Self { configured_default, entries: RwLock::new(Vec::new()) }
    }

    /// Returns `false` if a database with this name is already registered;
    /// the existing entry is kept.
    pub fn register(&self, name: &str, driver: DriverHandle) -> Result<bool> {
        if DEFAULT_ALIASES.contains(&name.trim()) {
            exn::bail!(ErrorKind::usage(format!("\"{name}\" is reserved for the default database")));
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.iter().any(|entry| entry.name == name) {
            return Ok(false);
        }
        entries.push(DatabaseEntry { name: name.to_string(), driver, tables: Vec::new() });
        Ok(true)
    }

    /// The configured default if there is one, otherwise the first
    /// registered database.
    pub fn default_name(&self) -> Option<String> {
        if let Some(name) = &self.configured_default {
            return Some(name.clone());
        }
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.first().map(|entry| entry.name.clone())
    }

    /// Resolve a database name (or its absence) to the registered name and
    /// its driver. `None`, `""` and `"default"` all mean the default.
    pub fn resolve(&self, name: Option<&str>) -> Result<(String, DriverHandle)> {
        let name = match name {
            Some(name) if !DEFAULT_ALIASES.contains(&name) => name.to_string(),
            _ => self.default_name().ok_or_raise(|| ErrorKind::DatabaseNotFound("default".to_string()))?,
        };
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        match entries.iter().find(|entry| entry.name == name) {
            Some(entry) => Ok((name, entry.driver.clone())),
            None => exn::bail!(ErrorKind::DatabaseNotFound(name)),
        }
    }

    pub fn names(&self) -> Vec<String> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.iter().map(|entry| entry.name.clone()).collect()
    }

    pub fn info(&self, name: Option<&str>) -> Result<DatabaseInfo> {
        let (name, driver) = self.resolve(name)?;
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let tables = entries.iter().find(|entry| entry.name == name).map(|entry| entry.tables.clone()).unwrap_or_default();
        Ok(DatabaseInfo { driver: driver.name().to_string(), name, tables })
    }

    /// Insert or replace a table of a registered database.
    pub fn record_table(&self, database: &str, table: TableEntity) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let Some(entry) = entries.iter_mut().find(|entry| entry.name == database) else {
            return;
        };
        match entry.tables.iter_mut().find(|known| known.name == table.name) {
            Some(known) => *known = table,
            None => entry.tables.push(table),
        }
    }

    pub fn forget_table(&self, database: &str, table: &str) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = entries.iter_mut().find(|entry| entry.name == database) {
            entry.tables.retain(|known| known.name != table);
        }
    }

    pub fn drivers(&self) -> Vec<(String, DriverHandle)> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.iter().map(|entry| (entry.name.clone(), entry.driver.clone())).collect()
    }
}

/// Record type to table name.
#[derive(Default)]
pub(crate) struct ModelRegistry {
    tables: RwLock<HashMap<TypeId, String>>,
}
impl ModelRegistry {
    pub fn table_of<T: 'static>(&self) -> Option<String> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        tables.get(&TypeId::of::<T>()).cloned()
    }

    /// Map `T` to `table`, replacing any earlier mapping.
    pub fn link<T: 'static>(&self, table: &str) {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        tables.insert(TypeId::of::<T>(), table.to_string());
    }

    /// Map `T` to `table` unless it is already mapped. Returns the table `T`
    /// is mapped to afterwards.
    pub fn link_if_absent<T: 'static>(&self, table: &str) -> String {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        tables.entry(TypeId::of::<T>()).or_insert_with(|| table.to_string()).clone()
    }
}
