use super::{ModelBuilder, Typed};
use crate::builder::codec::Model;
use crate::error::Result;
use tracing::instrument;

impl<T: Model> ModelBuilder<T> {
    /// Insert `row` as one document.
    #[instrument(level = "debug", skip_all, fields(table = %self.table))]
    pub async fn insert(mut self, row: &T) -> Result<u64> {
        let (database, driver) = self.prepare()?;
        let record = Typed::<T>::encode(&self.table, row)?;
        self.create(&database, driver, record).await
    }
}
