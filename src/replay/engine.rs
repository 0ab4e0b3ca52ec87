// ABOUTME: Applies the delta log to a target database in (timestamp, id) order
// ABOUTME: Deltas for missing target tables are skipped; every other failure aborts the run

use std::collections::HashMap;

use serde_json::Value;
use tokio_postgres::types::ToSql;
use tokio_postgres::Client;

use super::oracle::TableOracle;
use crate::delta::{bind_row, bind_value, decode, Delta, DeltaAction, DeltaLog};
use crate::error::{Error, PayloadError};
use crate::schema::{validate_identifier, RowSchema};

/// Replay tuning knobs.
#[derive(Debug, Clone)]
pub struct ReplayOptions {
    /// Target schema consulted by the existence oracle.
    pub target_schema: String,
    /// Create missing target tables with the fallback shape instead of
    /// skipping their deltas.
    pub create_missing_tables: bool,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            target_schema: "public".to_string(),
            create_missing_tables: false,
        }
    }
}

/// Counts from one replay run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub applied: u64,
    pub inserts: u64,
    pub updates: u64,
    pub deletes: u64,
    pub skipped: u64,
}

/// Reconstructs target table state by applying every delta in order.
///
/// Replay is not idempotent: running it twice against the same target will
/// hit duplicate-key failures on inserts. Callers replay into a pristine
/// target, and a failed run leaves already-applied deltas in place.
pub struct ReplayEngine<'a> {
    source: &'a Client,
    target: &'a Client,
    schema: &'a RowSchema,
    options: ReplayOptions,
}

impl<'a> ReplayEngine<'a> {
    pub fn new(
        source: &'a Client,
        target: &'a Client,
        schema: &'a RowSchema,
        options: ReplayOptions,
    ) -> Self {
        Self {
            source,
            target,
            schema,
            options,
        }
    }

    /// Run a full sequential replay of the source's delta log.
    pub async fn run(&self) -> Result<ReplayStats, Error> {
        let deltas = DeltaLog::new(self.source).read_ordered().await?;
        tracing::info!("replaying {} deltas", deltas.len());

        let oracle = TableOracle::new(self.target, self.options.target_schema.clone());
        // Existence answers are cached per run; create_missing_tables is the
        // only way a table appears mid-run, and it updates the cache.
        let mut existence: HashMap<String, bool> = HashMap::new();
        let mut stats = ReplayStats::default();

        for delta in &deltas {
            if validate_identifier(&delta.table_name).is_err() {
                return Err(malformed(
                    delta,
                    PayloadError::UnsafeTableName(delta.table_name.clone()),
                ));
            }

            let exists = match existence.get(&delta.table_name) {
                Some(known) => *known,
                None => {
                    let answer = oracle.exists(&delta.table_name).await;
                    existence.insert(delta.table_name.clone(), answer);
                    answer
                }
            };

            if !exists {
                if self.options.create_missing_tables {
                    self.create_fallback_table(delta).await?;
                    existence.insert(delta.table_name.clone(), true);
                } else {
                    tracing::warn!(
                        "skipping delta {} for missing target table \"{}\"",
                        delta.id,
                        delta.table_name
                    );
                    stats.skipped += 1;
                    continue;
                }
            }

            self.apply(delta).await?;
            stats.applied += 1;
            match delta.action {
                DeltaAction::Insert => stats.inserts += 1,
                DeltaAction::Update => stats.updates += 1,
                DeltaAction::Delete => stats.deletes += 1,
            }
        }

        tracing::info!(
            "replay finished: {} applied ({} inserts, {} updates, {} deletes), {} skipped",
            stats.applied,
            stats.inserts,
            stats.updates,
            stats.deletes,
            stats.skipped
        );
        Ok(stats)
    }

    async fn create_fallback_table(&self, delta: &Delta) -> Result<(), Error> {
        tracing::info!(
            "creating missing target table \"{}\" with the fallback shape",
            delta.table_name
        );
        self.target
            .execute(&self.schema.create_table_sql(&delta.table_name), &[])
            .await
            .map_err(|source| Error::Apply {
                id: delta.id,
                action: delta.action,
                table: delta.table_name.clone(),
                source,
            })?;
        Ok(())
    }

    async fn apply(&self, delta: &Delta) -> Result<(), Error> {
        delta.check_shape().map_err(|e| malformed(delta, e))?;

        tracing::debug!(
            "applying delta {}: {} on \"{}\"",
            delta.id,
            delta.action,
            delta.table_name
        );

        match delta.action {
            DeltaAction::Insert => {
                let new = decode(require_new(delta)?, self.schema)
                    .map_err(|e| malformed(delta, e))?;
                let params = bind_row(&new, self.schema).map_err(|e| malformed(delta, e))?;
                self.execute(delta, &self.schema.insert_sql(&delta.table_name), params)
                    .await?;
            }
            DeltaAction::Update => {
                let old = decode(require_old(delta)?, self.schema)
                    .map_err(|e| malformed(delta, e))?;
                let new = decode(require_new(delta)?, self.schema)
                    .map_err(|e| malformed(delta, e))?;

                let key = self.schema.key();
                let old_key = old
                    .get(&key.name)
                    .ok_or_else(|| malformed(delta, PayloadError::MissingColumn(key.name.clone())))?;

                let mut params = bind_row(&new, self.schema).map_err(|e| malformed(delta, e))?;
                params.push(bind_value(old_key, key).map_err(|e| malformed(delta, e))?);

                let affected = self
                    .execute(delta, &self.schema.update_sql(&delta.table_name), params)
                    .await?;
                if affected == 0 {
                    tracing::warn!(
                        "delta {} updated no rows in \"{}\"",
                        delta.id,
                        delta.table_name
                    );
                }
            }
            DeltaAction::Delete => {
                let old = decode(require_old(delta)?, self.schema)
                    .map_err(|e| malformed(delta, e))?;

                let key = self.schema.key();
                let old_key = old
                    .get(&key.name)
                    .ok_or_else(|| malformed(delta, PayloadError::MissingColumn(key.name.clone())))?;
                let params = vec![bind_value(old_key, key).map_err(|e| malformed(delta, e))?];

                let affected = self
                    .execute(delta, &self.schema.delete_sql(&delta.table_name), params)
                    .await?;
                if affected == 0 {
                    tracing::warn!(
                        "delta {} deleted no rows in \"{}\"",
                        delta.id,
                        delta.table_name
                    );
                }
            }
        }
        Ok(())
    }

    async fn execute(
        &self,
        delta: &Delta,
        query: &str,
        params: Vec<Box<dyn ToSql + Sync + Send>>,
    ) -> Result<u64, Error> {
        let refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        self.target
            .execute(query, &refs)
            .await
            .map_err(|source| Error::Apply {
                id: delta.id,
                action: delta.action,
                table: delta.table_name.clone(),
                source,
            })
    }
}

fn malformed(delta: &Delta, source: PayloadError) -> Error {
    Error::MalformedDeltaPayload {
        id: delta.id,
        table: delta.table_name.clone(),
        source,
    }
}

fn require_new(delta: &Delta) -> Result<&Value, Error> {
    delta
        .new_data
        .as_ref()
        .ok_or_else(|| malformed(delta, PayloadError::MissingNewData(delta.action)))
}

fn require_old(delta: &Delta) -> Result<&Value, Error> {
    delta
        .old_data
        .as_ref()
        .ok_or_else(|| malformed(delta, PayloadError::MissingOldData(delta.action)))
}
