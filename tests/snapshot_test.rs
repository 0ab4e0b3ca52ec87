// ABOUTME: Tests for the JSON snapshot export/import side path
// ABOUTME: File-format tests run everywhere; the database round trip is env-gated

use std::env;

use delta_replay::delta::{RowSnapshot, SnapshotValue};
use delta_replay::schema::RowSchema;
use delta_replay::snapshot;
use tempfile::TempDir;

fn row_schema() -> RowSchema {
    RowSchema::parse("id:integer,name:text,age:integer").expect("valid row schema")
}

fn sample_row(id: i64, name: &str, age: i64) -> RowSnapshot {
    let mut row = RowSnapshot::new();
    row.set("id", SnapshotValue::Integer(id));
    row.set("name", SnapshotValue::Text(name.to_string()));
    row.set("age", SnapshotValue::Integer(age));
    row
}

#[tokio::test]
async fn snapshot_file_round_trips_through_disk() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("users.json");

    let rows = vec![sample_row(1, "A", 5), sample_row(2, "B", 9)];
    let contents = snapshot::render_snapshot_file(&rows).expect("Failed to render snapshot");
    tokio::fs::write(&path, &contents)
        .await
        .expect("Failed to write snapshot file");

    let read_back = tokio::fs::read_to_string(&path)
        .await
        .expect("Failed to read snapshot file");
    let parsed =
        snapshot::parse_snapshot_file(&read_back, &row_schema()).expect("Failed to parse snapshot");

    assert_eq!(parsed, rows);
}

#[tokio::test]
async fn snapshot_parse_rejects_rows_that_do_not_match_the_schema() {
    let contents = r#"[{"id": 1, "name": "A", "age": 5, "extra": true}]"#;
    assert!(snapshot::parse_snapshot_file(contents, &row_schema()).is_err());
}

/// Test: export from the source database, import into the target, and
/// compare contents
#[tokio::test]
#[ignore]
async fn test_export_import_round_trip() {
    let source_url = env::var("TEST_SOURCE_URL").expect("TEST_SOURCE_URL must be set");
    let target_url = env::var("TEST_TARGET_URL").expect("TEST_TARGET_URL must be set");

    let source = delta_replay::postgres::connect(&source_url)
        .await
        .expect("Failed to connect to source");
    let target = delta_replay::postgres::connect(&target_url)
        .await
        .expect("Failed to connect to target");

    let table = "snapshot_roundtrip_test";
    let schema = row_schema();

    source
        .batch_execute(&format!(
            r#"
            DROP TABLE IF EXISTS "{table}" CASCADE;
            CREATE TABLE "{table}" (id INTEGER PRIMARY KEY, name TEXT, age INTEGER);
            INSERT INTO "{table}" (id, name, age) VALUES (1, 'A', 5), (2, NULL, NULL)
            "#
        ))
        .await
        .expect("Failed to seed source table");
    target
        .batch_execute(&format!(r#"DROP TABLE IF EXISTS "{table}" CASCADE"#))
        .await
        .expect("Failed to reset target table");

    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join(format!("{table}.json"));

    let exported = snapshot::export_table(&source, table, &schema, &path)
        .await
        .expect("Export failed");
    assert_eq!(exported, 2);

    let imported = snapshot::import_table(&target, table, &schema, &path)
        .await
        .expect("Import failed");
    assert_eq!(imported, 2);

    let rows = target
        .query(
            &format!(r#"SELECT id, name, age FROM "{table}" ORDER BY id"#),
            &[],
        )
        .await
        .expect("Failed to read target rows");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get::<_, i32>(0), 1);
    assert_eq!(rows[0].get::<_, Option<String>>(1), Some("A".to_string()));
    assert_eq!(rows[1].get::<_, Option<String>>(1), None);

    println!("✓ export/import round trip preserved {} rows", rows.len());

    let _ = source
        .batch_execute(&format!(r#"DROP TABLE IF EXISTS "{table}" CASCADE"#))
        .await;
    let _ = target
        .batch_execute(&format!(r#"DROP TABLE IF EXISTS "{table}" CASCADE"#))
        .await;
}
