// ABOUTME: The append-only deltas table: schema, ordered reads, operator edits
// ABOUTME: Total replay order is (timestamp, id); id alone is storage identity

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio_postgres::{Client, Row};

use super::{Delta, DeltaAction};
use crate::error::Error;
use crate::schema::validate_identifier;

/// Name of the log table; the installer never instruments it.
pub const DELTA_LOG_TABLE: &str = "deltas";

const CREATE_LOG_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS deltas (
    id          BIGSERIAL PRIMARY KEY,
    action      VARCHAR(10) NOT NULL,
    table_name  VARCHAR(100) NOT NULL,
    old_data    JSONB,
    new_data    JSONB,
    "timestamp" TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
)
"#;

const READ_ORDERED_SQL: &str = "SELECT id, action, table_name, old_data, new_data, \"timestamp\" \
     FROM deltas ORDER BY \"timestamp\", id";

const LIST_RECENT_SQL: &str = "SELECT id, action, table_name, old_data, new_data, \"timestamp\" \
     FROM deltas ORDER BY \"timestamp\" DESC, id DESC LIMIT $1";

/// Reader/writer over the append-only delta log of one source database.
pub struct DeltaLog<'a> {
    client: &'a Client,
}

impl<'a> DeltaLog<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// Create the log table if it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), Error> {
        self.client
            .batch_execute(CREATE_LOG_SQL)
            .await
            .map_err(Error::LogWrite)?;
        tracing::debug!("delta log table ready");
        Ok(())
    }

    /// Read the whole log in replay order.
    pub async fn read_ordered(&self) -> Result<Vec<Delta>, Error> {
        let rows = self
            .client
            .query(READ_ORDERED_SQL, &[])
            .await
            .map_err(Error::LogRead)?;
        rows.iter().map(delta_from_row).collect()
    }

    /// Most recent deltas first, for operator inspection.
    pub async fn list_recent(&self, limit: i64) -> Result<Vec<Delta>, Error> {
        let rows = self
            .client
            .query(LIST_RECENT_SQL, &[&limit])
            .await
            .map_err(Error::LogRead)?;
        rows.iter().map(delta_from_row).collect()
    }

    /// Append one delta directly. The capture trigger is the usual writer;
    /// this path exists for tooling and tests.
    pub async fn append(
        &self,
        action: DeltaAction,
        table_name: &str,
        old_data: Option<&Value>,
        new_data: Option<&Value>,
    ) -> Result<i64, Error> {
        validate_identifier(table_name)?;
        let row = self
            .client
            .query_one(
                "INSERT INTO deltas (action, table_name, old_data, new_data) \
                 VALUES ($1, $2, $3, $4) RETURNING id",
                &[&action.as_str(), &table_name, &old_data, &new_data],
            )
            .await
            .map_err(Error::LogWrite)?;
        Ok(row.get(0))
    }

    /// Remove one delta before replay. Returns whether a record was deleted.
    ///
    /// This is the operator edit mechanism: dropping a DELETE delta makes the
    /// deleted row survive reconstruction.
    pub async fn delete(&self, id: i64) -> Result<bool, Error> {
        let affected = self
            .client
            .execute("DELETE FROM deltas WHERE id = $1", &[&id])
            .await
            .map_err(Error::LogWrite)?;
        Ok(affected > 0)
    }

    /// Number of deltas currently in the log.
    pub async fn count(&self) -> Result<i64, Error> {
        let row = self
            .client
            .query_one("SELECT COUNT(*) FROM deltas", &[])
            .await
            .map_err(Error::LogRead)?;
        Ok(row.get(0))
    }
}

fn delta_from_row(row: &Row) -> Result<Delta, Error> {
    let id: i64 = row.get("id");
    let table_name: String = row.get("table_name");
    let action_raw: String = row.get("action");
    let action = DeltaAction::parse(&action_raw).map_err(|source| {
        Error::MalformedDeltaPayload {
            id,
            table: table_name.clone(),
            source,
        }
    })?;
    let timestamp: DateTime<Utc> = row.get("timestamp");
    Ok(Delta {
        id,
        action,
        table_name,
        old_data: row.get("old_data"),
        new_data: row.get("new_data"),
        timestamp,
    })
}
