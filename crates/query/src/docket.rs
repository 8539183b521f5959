//! The `Docket` handle: registries, caches and background tasks.

use crate::builder::{Builder, Model, ModelBuilder, TableBuilder};
use crate::error::{ErrorKind, Result};
use crate::registry::{DatabaseInfo, DatabaseRegistry, ModelRegistry, TableEntity};
use docket_cache::{CacheSet, InvalidationBus, InvalidationEvent, Sweeper};
use docket_config::Config;
use docket_driver::{Columns, Context, DriverHandle};
use exn::{OptionExt, ResultExt};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::Handle;
use tracing::instrument;

struct Inner {
    config: Config,
    databases: DatabaseRegistry,
    models: ModelRegistry,
    caches: Arc<CacheSet>,
    bus: InvalidationBus,
    sweeper: Mutex<Option<Sweeper>>,
}

/// Entry point: owns the database and model registries, the result caches,
/// the invalidation bus and the periodic sweeper.
///
/// Cheap to clone; clones share everything. Builders hold a clone, so the
/// background tasks live until the last handle and builder are gone (or
/// [`shutdown`](Self::shutdown) is called).
///
/// # Examples
///
/// ```no_run
/// use docket_config::Config;
/// use docket_query::{Docket, DriverHandle, args};
///
/// # async fn example(driver: DriverHandle) -> docket_query::Result<()> {
/// let docket = Docket::new(Config::default())?;
/// docket.register("db1", driver)?;
///
/// let user = docket.table("users").filter("id", args![1]).one().await?;
/// docket.table("users").insert("id, name", args![2, "y"]).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Docket {
    inner: Arc<Inner>,
}

impl Docket {
    /// Start the invalidation subscriber and the sweeper on the current
    /// Tokio runtime.
    ///
    /// `config` is validated first, so a hand-built one is held to the same
    /// rules as a loaded one.
    pub fn new(config: Config) -> Result<Self> {
        config.validate().map_err(ErrorKind::config)?;
        let runtime = Handle::try_current().or_raise(|| ErrorKind::NoRuntime)?;
        let caches = Arc::new(CacheSet::new(config.cache.enabled));
        // The subscriber runs until every bus handle is dropped.
        let (bus, _subscriber) = InvalidationBus::spawn(&runtime, Arc::clone(&caches));
        let sweeper = Sweeper::spawn(&runtime, bus.clone(), config.cache.sweep_interval)
            .ok_or_raise(|| ErrorKind::usage("cache sweep interval must be greater than zero"))?;
        tracing::debug!(
            cache = config.cache.enabled,
            sweep_interval = ?config.cache.sweep_interval,
            "Docket started"
        );
        Ok(Self {
            inner: Arc::new(Inner {
                databases: DatabaseRegistry::new(config.default_database.clone()),
                models: ModelRegistry::default(),
                caches,
                bus,
                sweeper: Mutex::new(Some(sweeper)),
                config,
            }),
        })
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub(crate) fn registry(&self) -> &DatabaseRegistry {
        &self.inner.databases
    }

    pub(crate) fn bus(&self) -> &InvalidationBus {
        &self.inner.bus
    }

    pub fn caches(&self) -> &CacheSet {
        &self.inner.caches
    }

    /// Register a database and the driver serving it.
    ///
    /// Returns `false`, keeping the existing entry, if the name is taken.
    /// The names `""` and `"default"` are reserved.
    pub fn register(&self, name: &str, driver: DriverHandle) -> Result<bool> {
        let added = self.inner.databases.register(name, driver)?;
        if added {
            tracing::info!(database = name, "Registered database");
        } else {
            tracing::debug!(database = name, "Database already registered; keeping existing driver");
        }
        Ok(added)
    }

    /// Registered database names, in registration order.
    pub fn databases(&self) -> Vec<String> {
        self.inner.databases.names()
    }

    pub fn default_database(&self) -> Option<String> {
        self.inner.databases.default_name()
    }

    /// Tables known to the registry for `database` (the default when
    /// `None`).
    pub fn database_info(&self, database: Option<&str>) -> Result<DatabaseInfo> {
        self.inner.databases.info(database)
    }

    /// Builder over free-form documents of `table`.
    pub fn table(&self, table: impl Into<String>) -> TableBuilder {
        Builder::new(self.clone(), table.into())
    }

    /// Builder over `T`, using the table `T` was linked to.
    pub fn model<T: Model>(&self) -> ModelBuilder<T> {
        match self.inner.models.table_of::<T>() {
            Some(table) => Builder::new(self.clone(), table),
            None => {
                tracing::warn!(model = std::any::type_name::<T>(), "Model is not linked to a table");
                Builder::failed(self.clone(), ErrorKind::ModelNotRegistered(std::any::type_name::<T>()))
            },
        }
    }

    /// Builder over `T`. Links `T` to `table` if it is not linked yet;
    /// an existing link wins.
    pub fn model_as<T: Model>(&self, table: &str) -> ModelBuilder<T> {
        let table = self.inner.models.link_if_absent::<T>(table);
        Builder::new(self.clone(), table)
    }

    /// Link `T` to `table`, replacing any earlier link.
    pub fn link<T: Model>(&self, table: &str) {
        self.inner.models.link::<T>(table);
    }

    /// Link `T` to `table` and make sure the table exists.
    ///
    /// An existing link for `T` is kept, but `table` itself is always the
    /// one migrated. Creates it through the driver when the database does
    /// not list it, then records it (with its columns) in the registry.
    #[instrument(level = "debug", skip(self), fields(model = std::any::type_name::<T>()))]
    pub async fn auto_migrate<T: Model>(&self, table: &str, database: Option<&str>) -> Result<()> {
        if table.trim().is_empty() {
            exn::bail!(ErrorKind::usage("cannot migrate to a table without a name"));
        }
        let linked = self.inner.models.link_if_absent::<T>(table);
        if linked != table {
            tracing::debug!(linked = %linked, "Model already linked; keeping existing table");
        }
        let table = table.to_string();
        let (database, driver) = self.inner.databases.resolve(database)?;
        let tables = self.list_tables(Some(&database)).await?;
        if !tables.contains(&table) {
            driver.create_table(&Context::background(), &database, &table).await.map_err(ErrorKind::driver)?;
            self.inner.caches.tables.remove(&database);
            tracing::info!(database = %database, table = %table, "Created table");
        }
        let columns = driver.list_columns(&database, &table).await.map_err(ErrorKind::driver)?;
        self.inner.databases.record_table(&database, TableEntity { name: table, columns });
        Ok(())
    }

    /// Tables of `database` (the default when `None`). Non-empty results
    /// are cached until the next drop or clean.
    pub async fn list_tables(&self, database: Option<&str>) -> Result<Vec<String>> {
        let (database, driver) = self.inner.databases.resolve(database)?;
        if let Some(tables) = self.inner.caches.tables.lookup(&database) {
            return Ok(tables.as_ref().clone());
        }
        let tables = driver.list_tables(&database).await.map_err(ErrorKind::driver)?;
        if !tables.is_empty() {
            self.inner.caches.tables.store(database, Arc::new(tables.clone()));
        }
        Ok(tables)
    }

    /// Column names and types of `table`, straight from the driver.
    pub async fn list_columns(&self, table: &str, database: Option<&str>) -> Result<Columns> {
        let (database, driver) = self.inner.databases.resolve(database)?;
        driver.list_columns(&database, table).await.map_err(ErrorKind::driver)
    }

    /// Ask the subscriber to empty every cache.
    pub fn flush_cache(&self) -> bool {
        self.inner.bus.publish(InvalidationEvent::clean())
    }

    pub fn enable_cache(&self) {
        self.inner.caches.set_enabled(true);
    }

    /// Stop caching and empty every cache. Mutations made while disabled
    /// publish no events.
    pub fn disable_cache(&self) {
        self.inner.caches.set_enabled(false);
    }

    pub fn cache_enabled(&self) -> bool {
        self.inner.caches.is_enabled()
    }

    /// Wait until every invalidation published so far has been applied.
    pub async fn settle(&self) {
        self.inner.bus.settle().await;
    }

    /// Stop the sweeper and close every registered database.
    ///
    /// Every driver is asked to close even if an earlier one fails; the
    /// first failure is returned.
    pub async fn shutdown(&self) -> Result<()> {
        let sweeper = self.inner.sweeper.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(sweeper) = sweeper {
            sweeper.stop();
        }
        let mut first = None;
        for (database, driver) in self.inner.databases.drivers() {
            if let Err(err) = driver.close(&database).await {
                tracing::warn!(database = %database, error = %*err, "Failed to close database");
                first.get_or_insert(err);
            }
        }
        match first {
            Some(err) => Err(ErrorKind::driver(err)),
            None => Ok(()),
        }
    }
}
