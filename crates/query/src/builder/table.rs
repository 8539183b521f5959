use super::{TableBuilder, misuse};
use crate::error::Result;
use crate::filter::zip_fields;
use docket_driver::Value;
use tracing::instrument;

impl TableBuilder {
    /// Insert one row built by zipping a comma-separated field list with
    /// `values`. The counts must match.
    ///
    /// ```no_run
    /// # async fn example(docket: docket_query::Docket) -> docket_query::Result<()> {
    /// use docket_query::args;
    ///
    /// docket.table("users").insert("id, name", args![2, "y"]).await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(level = "debug", skip(self, values), fields(table = %self.table))]
    pub async fn insert(mut self, fields: &str, values: impl IntoIterator<Item = Value>) -> Result<u64> {
        let (database, driver) = self.prepare()?;
        let record = zip_fields(fields, values.into_iter().collect()).map_err(misuse)?;
        self.create(&database, driver, record).await
    }
}
