// ABOUTME: Answers "does this table exist in the target schema?"
// ABOUTME: Failure to determine existence is treated as "missing" and logged

use tokio_postgres::Client;

/// Existence gate consulted before a delta is applied to the target.
pub struct TableOracle<'a> {
    client: &'a Client,
    schema: String,
}

impl<'a> TableOracle<'a> {
    pub fn new(client: &'a Client, schema: impl Into<String>) -> Self {
        Self {
            client,
            schema: schema.into(),
        }
    }

    /// Whether the table currently exists in the target schema.
    ///
    /// A query failure answers `false` so the delta is skipped rather than
    /// applied against an unknown target state; the error is logged.
    pub async fn exists(&self, table: &str) -> bool {
        let result = self
            .client
            .query_one(
                "SELECT EXISTS (
                    SELECT 1 FROM information_schema.tables
                    WHERE table_schema = $1 AND table_name = $2
                )",
                &[&self.schema, &table],
            )
            .await;

        match result {
            Ok(row) => row.get(0),
            Err(err) => {
                tracing::warn!(
                    "could not determine whether table \"{}\" exists, treating it as missing: {}",
                    table,
                    err
                );
                false
            }
        }
    }
}
