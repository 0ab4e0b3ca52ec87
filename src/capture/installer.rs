// ABOUTME: Installs and removes the per-table change-capture triggers
// ABOUTME: The trigger writes one delta per row mutation, inside the mutating transaction

use tokio_postgres::Client;

use crate::delta::{DeltaLog, DELTA_LOG_TABLE};
use crate::error::Error;
use crate::postgres;
use crate::schema::validate_identifier;

/// Name of the generated trigger function for a table.
///
/// Deterministic, so operator tooling can enumerate and drop the generated
/// objects without consulting any state.
pub fn change_function_name(table: &str) -> String {
    format!("log_{}_changes", table)
}

/// Name of the generated row-level trigger for a table.
pub fn change_trigger_name(table: &str) -> String {
    format!("{}_changes_trigger", table)
}

fn build_trigger_function_sql(table: &str) -> String {
    format!(
        r#"
CREATE OR REPLACE FUNCTION "{function}"() RETURNS TRIGGER AS $$
BEGIN
    IF (TG_OP = 'INSERT') THEN
        INSERT INTO {log} (action, table_name, new_data)
        VALUES ('INSERT', TG_TABLE_NAME, row_to_json(NEW));
        RETURN NEW;
    END IF;

    IF (TG_OP = 'UPDATE') THEN
        INSERT INTO {log} (action, table_name, old_data, new_data)
        VALUES ('UPDATE', TG_TABLE_NAME, row_to_json(OLD), row_to_json(NEW));
        RETURN NEW;
    END IF;

    IF (TG_OP = 'DELETE') THEN
        INSERT INTO {log} (action, table_name, old_data)
        VALUES ('DELETE', TG_TABLE_NAME, row_to_json(OLD));
        RETURN OLD;
    END IF;

    RETURN NULL;
END;
$$ LANGUAGE plpgsql
"#,
        function = change_function_name(table),
        log = DELTA_LOG_TABLE,
    )
}

fn build_trigger_sql(table: &str) -> String {
    format!(
        r#"
DROP TRIGGER IF EXISTS "{trigger}" ON "{table}";
CREATE TRIGGER "{trigger}"
AFTER INSERT OR UPDATE OR DELETE ON "{table}"
FOR EACH ROW EXECUTE FUNCTION "{function}"()
"#,
        trigger = change_trigger_name(table),
        table = table,
        function = change_function_name(table),
    )
}

fn build_uninstall_sql(table: &str) -> String {
    format!(
        r#"
DROP TRIGGER IF EXISTS "{trigger}" ON "{table}";
DROP FUNCTION IF EXISTS "{function}"()
"#,
        trigger = change_trigger_name(table),
        table = table,
        function = change_function_name(table),
    )
}

/// Installs the change-capture hooks on a source database.
pub struct CaptureInstaller<'a> {
    client: &'a Client,
}

impl<'a> CaptureInstaller<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// Ensure the delta log exists, then instrument every table in the
    /// schema except the log itself. Returns the instrumented table names.
    ///
    /// A failure on one table aborts the run; tables already instrumented
    /// stay instrumented.
    pub async fn install_all(&self, schema: &str) -> Result<Vec<String>, Error> {
        DeltaLog::new(self.client).ensure_schema().await?;

        let tables = postgres::list_tables(self.client, schema).await?;
        let mut installed = Vec::new();
        for table in tables.iter().filter(|t| t.as_str() != DELTA_LOG_TABLE) {
            self.install(table).await?;
            installed.push(table.clone());
        }
        Ok(installed)
    }

    /// Instrument one table. Safe to re-run: the function is replaced and
    /// the trigger dropped before recreation.
    pub async fn install(&self, table: &str) -> Result<(), Error> {
        validate_identifier(table)?;

        self.client
            .batch_execute(&build_trigger_function_sql(table))
            .await
            .map_err(|source| Error::Installation {
                table: table.to_string(),
                source,
            })?;

        self.client
            .batch_execute(&build_trigger_sql(table))
            .await
            .map_err(|source| Error::Installation {
                table: table.to_string(),
                source,
            })?;

        tracing::info!("change capture installed on \"{}\"", table);
        Ok(())
    }

    /// Remove the generated trigger and function from every table in the
    /// schema. Returns the table names that were cleaned up.
    pub async fn uninstall_all(&self, schema: &str) -> Result<Vec<String>, Error> {
        let tables = postgres::list_tables(self.client, schema).await?;
        let mut removed = Vec::new();
        for table in tables.iter().filter(|t| t.as_str() != DELTA_LOG_TABLE) {
            self.uninstall(table).await?;
            removed.push(table.clone());
        }
        Ok(removed)
    }

    /// Remove the generated objects from one table, if present.
    pub async fn uninstall(&self, table: &str) -> Result<(), Error> {
        validate_identifier(table)?;

        self.client
            .batch_execute(&build_uninstall_sql(table))
            .await
            .map_err(|source| Error::Uninstall {
                table: table.to_string(),
                source,
            })?;

        tracing::info!("change capture removed from \"{}\"", table);
        Ok(())
    }
}
