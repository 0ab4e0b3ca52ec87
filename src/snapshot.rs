// ABOUTME: One-time JSON file export/import of raw table snapshots
// ABOUTME: Files are a JSON array of row objects, the same format as delta payloads

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::fs;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, Row};

use crate::delta::{bind_row, decode, encode, RowSnapshot, SnapshotValue};
use crate::schema::{ColumnType, RowSchema};

/// Render rows as the snapshot file contents.
pub fn render_snapshot_file(snapshots: &[RowSnapshot]) -> Result<String> {
    let payload: Vec<Value> = snapshots.iter().map(encode).collect();
    serde_json::to_string_pretty(&payload).context("Failed to serialize snapshot rows")
}

/// Parse snapshot file contents with the strict delta codec.
pub fn parse_snapshot_file(contents: &str, schema: &RowSchema) -> Result<Vec<RowSnapshot>> {
    let payload: Vec<Value> =
        serde_json::from_str(contents).context("Snapshot file is not a JSON array")?;
    payload
        .iter()
        .enumerate()
        .map(|(idx, row)| {
            decode(row, schema).with_context(|| format!("Snapshot row {} is malformed", idx))
        })
        .collect()
}

/// Export every row of a table to a JSON snapshot file.
///
/// Rows are ordered by the identifier column so repeated exports of the same
/// state produce identical files.
pub async fn export_table(
    client: &Client,
    table: &str,
    schema: &RowSchema,
    path: &Path,
) -> Result<u64> {
    crate::schema::validate_identifier(table)?;

    let rows = client
        .query(&schema.select_sql(table), &[])
        .await
        .with_context(|| format!("Failed to read rows from table \"{}\"", table))?;

    let mut snapshots = Vec::with_capacity(rows.len());
    for row in &rows {
        snapshots.push(snapshot_from_row(row, schema)?);
    }

    let contents = render_snapshot_file(&snapshots)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }
    }
    fs::write(path, contents)
        .await
        .with_context(|| format!("Failed to write snapshot to {:?}", path))?;

    tracing::info!(
        "exported {} rows from \"{}\" to {:?}",
        snapshots.len(),
        table,
        path
    );
    Ok(snapshots.len() as u64)
}

/// Import a JSON snapshot file into a target table.
///
/// Creates the fallback table if it is missing, then inserts each row. Rows
/// already present fail with a duplicate-key error, matching replay's
/// pristine-target contract.
pub async fn import_table(
    client: &Client,
    table: &str,
    schema: &RowSchema,
    path: &Path,
) -> Result<u64> {
    crate::schema::validate_identifier(table)?;

    let contents = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read snapshot from {:?}", path))?;
    let snapshots = parse_snapshot_file(&contents, schema)?;

    client
        .execute(&schema.create_table_sql(table), &[])
        .await
        .with_context(|| format!("Failed to create target table \"{}\"", table))?;

    let insert = schema.insert_sql(table);
    for (idx, snapshot) in snapshots.iter().enumerate() {
        let params =
            bind_row(snapshot, schema).with_context(|| format!("Snapshot row {} is malformed", idx))?;
        let refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();
        client
            .execute(&insert, &refs)
            .await
            .with_context(|| format!("Failed to insert snapshot row {} into \"{}\"", idx, table))?;
    }

    tracing::info!(
        "imported {} rows into \"{}\" from {:?}",
        snapshots.len(),
        table,
        path
    );
    Ok(snapshots.len() as u64)
}

fn snapshot_from_row(row: &Row, schema: &RowSchema) -> Result<RowSnapshot> {
    let mut snapshot = RowSnapshot::new();
    for (idx, column) in schema.columns().iter().enumerate() {
        let value = match column.ty {
            ColumnType::Integer => row
                .try_get::<_, Option<i32>>(idx)
                .map(|v| v.map(|i| SnapshotValue::Integer(i64::from(i)))),
            ColumnType::Text => row
                .try_get::<_, Option<String>>(idx)
                .map(|v| v.map(SnapshotValue::Text)),
            ColumnType::Boolean => row
                .try_get::<_, Option<bool>>(idx)
                .map(|v| v.map(SnapshotValue::Boolean)),
        }
        .with_context(|| {
            format!(
                "Column \"{}\" does not match its declared {} type",
                column.name, column.ty
            )
        })?;
        snapshot.set(column.name.clone(), value.unwrap_or(SnapshotValue::Null));
    }
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> RowSchema {
        RowSchema::parse("id:integer,name:text,age:integer").unwrap()
    }

    fn row(id: i64, name: &str, age: i64) -> RowSnapshot {
        let mut snapshot = RowSnapshot::new();
        snapshot.set("id", SnapshotValue::Integer(id));
        snapshot.set("name", SnapshotValue::Text(name.to_string()));
        snapshot.set("age", SnapshotValue::Integer(age));
        snapshot
    }

    #[test]
    fn file_contents_round_trip() {
        let rows = vec![row(1, "A", 5), row(2, "B", 9)];
        let contents = render_snapshot_file(&rows).unwrap();
        let parsed = parse_snapshot_file(&contents, &schema()).unwrap();
        assert_eq!(parsed, rows);
    }

    #[test]
    fn rendered_file_is_a_json_array_of_flat_objects() {
        let contents = render_snapshot_file(&[row(1, "A", 5)]).unwrap();
        let value: Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(value, serde_json::json!([{"id": 1, "name": "A", "age": 5}]));
    }

    #[test]
    fn parse_rejects_non_array_files() {
        assert!(parse_snapshot_file("{\"id\": 1}", &schema()).is_err());
        assert!(parse_snapshot_file("not json", &schema()).is_err());
    }

    #[test]
    fn parse_rejects_rows_with_wrong_shape() {
        let err = parse_snapshot_file(r#"[{"id": 1, "name": "A"}]"#, &schema()).unwrap_err();
        assert!(format!("{:#}", err).contains("row 0"));
    }
}
