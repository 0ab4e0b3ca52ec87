// ABOUTME: Lossless row-snapshot to JSON payload round trip, checked against the row schema
// ABOUTME: Decoding is strict: no coerced values, no missing or extra columns

use std::collections::BTreeMap;

use serde_json::{Map, Number, Value};
use tokio_postgres::types::ToSql;

use crate::error::PayloadError;
use crate::schema::{ColumnDef, ColumnType, RowSchema};

/// One column value inside a row snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Text(String),
}

impl SnapshotValue {
    fn kind(&self) -> &'static str {
        match self {
            SnapshotValue::Null => "null",
            SnapshotValue::Boolean(_) => "boolean",
            SnapshotValue::Integer(_) => "integer",
            SnapshotValue::Text(_) => "text",
        }
    }
}

/// Full column-name to value mapping for one row at one instant.
///
/// Keys are held sorted so two equal snapshots always encode to identical
/// payloads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowSnapshot {
    values: BTreeMap<String, SnapshotValue>,
}

impl RowSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, column: impl Into<String>, value: SnapshotValue) {
        self.values.insert(column.into(), value);
    }

    pub fn get(&self, column: &str) -> Option<&SnapshotValue> {
        self.values.get(column)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SnapshotValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Encode a snapshot as the flat JSON object stored in `old_data`/`new_data`.
pub fn encode(snapshot: &RowSnapshot) -> Value {
    let mut object = Map::new();
    for (column, value) in snapshot.iter() {
        let json = match value {
            SnapshotValue::Null => Value::Null,
            SnapshotValue::Boolean(b) => Value::Bool(*b),
            SnapshotValue::Integer(i) => Value::Number(Number::from(*i)),
            SnapshotValue::Text(s) => Value::String(s.clone()),
        };
        object.insert(column.to_string(), json);
    }
    Value::Object(object)
}

/// Decode a stored payload back into a snapshot, checked against the schema.
///
/// The payload must be a JSON object whose keys are exactly the schema's
/// columns, with every value matching its declared type. Anything else is a
/// [`PayloadError`] so corrupt log entries never apply half-decoded.
pub fn decode(payload: &Value, schema: &RowSchema) -> Result<RowSnapshot, PayloadError> {
    let object = payload.as_object().ok_or(PayloadError::NotAnObject)?;

    for key in object.keys() {
        if schema.column(key).is_none() {
            return Err(PayloadError::UnexpectedColumn(key.clone()));
        }
    }

    let mut snapshot = RowSnapshot::new();
    for column in schema.columns() {
        let value = object
            .get(&column.name)
            .ok_or_else(|| PayloadError::MissingColumn(column.name.clone()))?;
        snapshot.set(column.name.clone(), decode_value(value, column)?);
    }
    Ok(snapshot)
}

fn decode_value(value: &Value, column: &ColumnDef) -> Result<SnapshotValue, PayloadError> {
    match (value, column.ty) {
        (Value::Null, _) => Ok(SnapshotValue::Null),
        (Value::Bool(b), ColumnType::Boolean) => Ok(SnapshotValue::Boolean(*b)),
        (Value::Number(n), ColumnType::Integer) => {
            let i = n.as_i64().ok_or_else(|| PayloadError::TypeMismatch {
                column: column.name.clone(),
                expected: column.ty,
                found: "non-integer number",
            })?;
            Ok(SnapshotValue::Integer(i))
        }
        (Value::String(s), ColumnType::Text) => Ok(SnapshotValue::Text(s.clone())),
        (other, _) => Err(PayloadError::TypeMismatch {
            column: column.name.clone(),
            expected: column.ty,
            found: json_kind(other),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Bind one snapshot value as a SQL parameter of the column's type.
///
/// Integer columns bind as `i32`; out-of-range values are rejected rather
/// than truncated.
pub fn bind_value(
    value: &SnapshotValue,
    column: &ColumnDef,
) -> Result<Box<dyn ToSql + Sync + Send>, PayloadError> {
    match (value, column.ty) {
        (SnapshotValue::Null, ColumnType::Integer) => Ok(Box::new(None::<i32>)),
        (SnapshotValue::Null, ColumnType::Text) => Ok(Box::new(None::<String>)),
        (SnapshotValue::Null, ColumnType::Boolean) => Ok(Box::new(None::<bool>)),
        (SnapshotValue::Integer(i), ColumnType::Integer) => {
            let narrowed = i32::try_from(*i).map_err(|_| PayloadError::IntegerOutOfRange {
                column: column.name.clone(),
                value: *i,
            })?;
            Ok(Box::new(Some(narrowed)))
        }
        (SnapshotValue::Text(s), ColumnType::Text) => Ok(Box::new(Some(s.clone()))),
        (SnapshotValue::Boolean(b), ColumnType::Boolean) => Ok(Box::new(Some(*b))),
        (other, _) => Err(PayloadError::TypeMismatch {
            column: column.name.clone(),
            expected: column.ty,
            found: other.kind(),
        }),
    }
}

/// Bind a full snapshot in schema column order.
pub fn bind_row(
    snapshot: &RowSnapshot,
    schema: &RowSchema,
) -> Result<Vec<Box<dyn ToSql + Sync + Send>>, PayloadError> {
    schema
        .columns()
        .iter()
        .map(|column| {
            let value = snapshot
                .get(&column.name)
                .ok_or_else(|| PayloadError::MissingColumn(column.name.clone()))?;
            bind_value(value, column)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> RowSchema {
        RowSchema::parse("id:integer,name:text,active:boolean").unwrap()
    }

    fn sample_snapshot() -> RowSnapshot {
        let mut snapshot = RowSnapshot::new();
        snapshot.set("id", SnapshotValue::Integer(1));
        snapshot.set("name", SnapshotValue::Text("Ada".to_string()));
        snapshot.set("active", SnapshotValue::Boolean(true));
        snapshot
    }

    #[test]
    fn round_trips_all_value_kinds() {
        let mut snapshot = sample_snapshot();
        snapshot.set("name", SnapshotValue::Null);
        let decoded = decode(&encode(&snapshot), &schema()).unwrap();
        assert_eq!(decoded, snapshot);
    }

    #[test]
    fn encode_is_deterministic_regardless_of_insertion_order() {
        let forward = sample_snapshot();
        let mut reversed = RowSnapshot::new();
        reversed.set("active", SnapshotValue::Boolean(true));
        reversed.set("name", SnapshotValue::Text("Ada".to_string()));
        reversed.set("id", SnapshotValue::Integer(1));
        assert_eq!(
            serde_json::to_string(&encode(&forward)).unwrap(),
            serde_json::to_string(&encode(&reversed)).unwrap()
        );
    }

    #[test]
    fn decode_matches_trigger_payload() {
        let payload = json!({"id": 7, "name": "Grace", "active": false});
        let decoded = decode(&payload, &schema()).unwrap();
        assert_eq!(decoded.get("id"), Some(&SnapshotValue::Integer(7)));
        assert_eq!(
            decoded.get("name"),
            Some(&SnapshotValue::Text("Grace".to_string()))
        );
        assert_eq!(decoded.get("active"), Some(&SnapshotValue::Boolean(false)));
    }

    #[test]
    fn decode_rejects_non_objects() {
        assert_eq!(
            decode(&json!([1, 2, 3]), &schema()),
            Err(PayloadError::NotAnObject)
        );
        assert_eq!(decode(&json!(null), &schema()), Err(PayloadError::NotAnObject));
    }

    #[test]
    fn decode_rejects_missing_columns() {
        let payload = json!({"id": 1, "name": "Ada"});
        assert_eq!(
            decode(&payload, &schema()),
            Err(PayloadError::MissingColumn("active".to_string()))
        );
    }

    #[test]
    fn decode_rejects_extra_columns() {
        let payload = json!({"id": 1, "name": "Ada", "active": true, "age": 36});
        assert_eq!(
            decode(&payload, &schema()),
            Err(PayloadError::UnexpectedColumn("age".to_string()))
        );
    }

    #[test]
    fn decode_rejects_type_mismatches() {
        let payload = json!({"id": "1", "name": "Ada", "active": true});
        assert!(matches!(
            decode(&payload, &schema()),
            Err(PayloadError::TypeMismatch { column, .. }) if column == "id"
        ));
    }

    #[test]
    fn decode_rejects_fractional_numbers() {
        let payload = json!({"id": 1.5, "name": "Ada", "active": true});
        assert!(matches!(
            decode(&payload, &schema()),
            Err(PayloadError::TypeMismatch { found: "non-integer number", .. })
        ));
    }

    #[test]
    fn decode_rejects_nested_structures() {
        let payload = json!({"id": 1, "name": {"first": "Ada"}, "active": true});
        assert!(matches!(
            decode(&payload, &schema()),
            Err(PayloadError::TypeMismatch { found: "object", .. })
        ));
    }

    #[test]
    fn bind_rejects_integers_that_overflow_i32() {
        let column = ColumnDef::new("id", ColumnType::Integer);
        let err = bind_value(&SnapshotValue::Integer(i64::MAX), &column).unwrap_err();
        assert!(matches!(err, PayloadError::IntegerOutOfRange { value, .. } if value == i64::MAX));
    }

    #[test]
    fn bind_row_follows_schema_order() {
        let params = bind_row(&sample_snapshot(), &schema()).unwrap();
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn bind_row_requires_every_column() {
        let mut snapshot = RowSnapshot::new();
        snapshot.set("id", SnapshotValue::Integer(1));
        assert!(matches!(
            bind_row(&snapshot, &schema()),
            Err(PayloadError::MissingColumn(_))
        ));
    }
}
