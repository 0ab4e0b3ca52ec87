// ABOUTME: Injected row-schema descriptor shared by the codec and replay engine
// ABOUTME: Owns identifier validation and all SQL text generated from the schema

use std::collections::HashSet;
use std::fmt;

use crate::error::Error;

/// Row shape used when none is given on the command line.
pub const DEFAULT_ROW_SCHEMA: &str = "id:integer,name:text,age:integer";

/// Longest identifier PostgreSQL will accept (NAMEDATALEN - 1).
const MAX_IDENTIFIER_LEN: usize = 63;

/// Column value kinds the delta codec supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Text,
    Boolean,
}

impl ColumnType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "integer" | "int" => Some(ColumnType::Integer),
            "text" | "string" => Some(ColumnType::Text),
            "boolean" | "bool" => Some(ColumnType::Boolean),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Integer => "integer",
            ColumnType::Text => "text",
            ColumnType::Boolean => "boolean",
        }
    }

    /// The type name used in generated DDL.
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Text => "TEXT",
            ColumnType::Boolean => "BOOLEAN",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One named, typed column of the tracked row shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub ty: ColumnType,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Ordered, typed description of the row shape both sides agree on.
///
/// The first column is the row identifier; replay keys updates and deletes on
/// it, and generated fallback tables make it the primary key. Capture and
/// replay operate against this fixed shape rather than inferring schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowSchema {
    columns: Vec<ColumnDef>,
}

impl RowSchema {
    pub fn new(columns: Vec<ColumnDef>) -> Result<Self, Error> {
        if columns.is_empty() {
            return Err(Error::InvalidSchema(
                "a row schema needs at least one column".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for column in &columns {
            validate_identifier(&column.name)?;
            if !seen.insert(column.name.as_str()) {
                return Err(Error::InvalidSchema(format!(
                    "duplicate column {:?}",
                    column.name
                )));
            }
        }
        Ok(Self { columns })
    }

    /// Parse a `name:type` list, e.g. `id:integer,name:text,age:integer`.
    pub fn parse(spec: &str) -> Result<Self, Error> {
        let columns = spec
            .split(',')
            .map(|part| {
                let part = part.trim();
                let (name, ty) = part.split_once(':').ok_or_else(|| {
                    Error::InvalidSchema(format!("column {:?} must be name:type", part))
                })?;
                let ty = ColumnType::parse(ty.trim()).ok_or_else(|| {
                    Error::InvalidSchema(format!("unknown column type {:?}", ty.trim()))
                })?;
                Ok(ColumnDef::new(name.trim(), ty))
            })
            .collect::<Result<Vec<_>, Error>>()?;
        Self::new(columns)
    }

    /// The identifier column (always the first).
    pub fn key(&self) -> &ColumnDef {
        &self.columns[0]
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Minimal fallback table DDL: the schema's columns with the identifier
    /// as primary key.
    pub fn create_table_sql(&self, table: &str) -> String {
        let columns: Vec<String> = self
            .columns
            .iter()
            .enumerate()
            .map(|(idx, c)| {
                if idx == 0 {
                    format!("\"{}\" {} PRIMARY KEY", c.name, c.ty.sql_type())
                } else {
                    format!("\"{}\" {}", c.name, c.ty.sql_type())
                }
            })
            .collect();
        format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" ({})",
            table,
            columns.join(", ")
        )
    }

    /// `SELECT` over the schema's columns, ordered by the identifier so
    /// exported snapshots are deterministic.
    pub fn select_sql(&self, table: &str) -> String {
        format!(
            "SELECT {} FROM \"{}\" ORDER BY \"{}\"",
            self.quoted_columns().join(", "),
            table,
            self.key().name
        )
    }

    pub fn insert_sql(&self, table: &str) -> String {
        let placeholders: Vec<String> = (1..=self.columns.len()).map(|i| format!("${}", i)).collect();
        format!(
            "INSERT INTO \"{}\" ({}) VALUES ({})",
            table,
            self.quoted_columns().join(", "),
            placeholders.join(", ")
        )
    }

    /// `UPDATE` setting every column (the identifier included, so
    /// identifier-changing updates replay correctly), keyed on the prior
    /// identifier value bound as the final parameter.
    pub fn update_sql(&self, table: &str) -> String {
        let assignments: Vec<String> = self
            .columns
            .iter()
            .enumerate()
            .map(|(idx, c)| format!("\"{}\" = ${}", c.name, idx + 1))
            .collect();
        format!(
            "UPDATE \"{}\" SET {} WHERE \"{}\" = ${}",
            table,
            assignments.join(", "),
            self.key().name,
            self.columns.len() + 1
        )
    }

    pub fn delete_sql(&self, table: &str) -> String {
        format!(
            "DELETE FROM \"{}\" WHERE \"{}\" = $1",
            table,
            self.key().name
        )
    }

    fn quoted_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .map(|c| format!("\"{}\"", c.name))
            .collect()
    }
}

/// Reject anything that is not a plain lowercase SQL identifier.
///
/// Table and column names are interpolated into statement text as quoted
/// identifiers, so every name must pass this check first; values never take
/// this path and are always bound as parameters.
pub fn validate_identifier(name: &str) -> Result<(), Error> {
    let mut chars = name.chars();
    let valid_first = chars
        .next()
        .map(|c| c.is_ascii_lowercase() || c == '_')
        .unwrap_or(false);
    let valid_rest = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if !valid_first || !valid_rest || name.len() > MAX_IDENTIFIER_LEN {
        return Err(Error::InvalidIdentifier(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_default_schema() {
        let schema = RowSchema::parse(DEFAULT_ROW_SCHEMA).unwrap();
        assert_eq!(schema.len(), 3);
        assert_eq!(schema.key().name, "id");
        assert_eq!(schema.key().ty, ColumnType::Integer);
        assert_eq!(schema.column("name").unwrap().ty, ColumnType::Text);
        assert_eq!(schema.column("age").unwrap().ty, ColumnType::Integer);
    }

    #[test]
    fn parse_accepts_aliases_and_whitespace() {
        let schema = RowSchema::parse(" id:int , active : bool , label:string ").unwrap();
        assert_eq!(schema.column("active").unwrap().ty, ColumnType::Boolean);
        assert_eq!(schema.column("label").unwrap().ty, ColumnType::Text);
    }

    #[test]
    fn parse_rejects_missing_type() {
        let err = RowSchema::parse("id").unwrap_err();
        assert!(matches!(err, Error::InvalidSchema(_)));
    }

    #[test]
    fn parse_rejects_unknown_type() {
        let err = RowSchema::parse("id:float").unwrap_err();
        assert!(matches!(err, Error::InvalidSchema(_)));
    }

    #[test]
    fn rejects_duplicate_columns() {
        let err = RowSchema::parse("id:integer,id:text").unwrap_err();
        assert!(matches!(err, Error::InvalidSchema(_)));
    }

    #[test]
    fn rejects_empty_schema() {
        assert!(RowSchema::new(Vec::new()).is_err());
    }

    #[test]
    fn rejects_invalid_column_names() {
        let err = RowSchema::parse("Id:integer").unwrap_err();
        assert!(matches!(err, Error::InvalidIdentifier(_)));
    }

    #[test]
    fn validate_identifier_accepts_plain_names() {
        assert!(validate_identifier("users").is_ok());
        assert!(validate_identifier("_audit_log2").is_ok());
    }

    #[test]
    fn validate_identifier_rejects_unsafe_names() {
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("Users").is_err());
        assert!(validate_identifier("users; drop table deltas").is_err());
        assert!(validate_identifier("1users").is_err());
        assert!(validate_identifier(&"x".repeat(64)).is_err());
    }

    #[test]
    fn create_table_sql_marks_key_as_primary() {
        let schema = RowSchema::parse(DEFAULT_ROW_SCHEMA).unwrap();
        let sql = schema.create_table_sql("users");
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS \"users\""));
        assert!(sql.contains("\"id\" INTEGER PRIMARY KEY"));
        assert!(sql.contains("\"name\" TEXT"));
        assert!(sql.contains("\"age\" INTEGER"));
    }

    #[test]
    fn insert_sql_binds_every_column() {
        let schema = RowSchema::parse(DEFAULT_ROW_SCHEMA).unwrap();
        assert_eq!(
            schema.insert_sql("users"),
            "INSERT INTO \"users\" (\"id\", \"name\", \"age\") VALUES ($1, $2, $3)"
        );
    }

    #[test]
    fn update_sql_sets_all_columns_and_keys_on_old_identifier() {
        let schema = RowSchema::parse(DEFAULT_ROW_SCHEMA).unwrap();
        assert_eq!(
            schema.update_sql("users"),
            "UPDATE \"users\" SET \"id\" = $1, \"name\" = $2, \"age\" = $3 WHERE \"id\" = $4"
        );
    }

    #[test]
    fn delete_sql_keys_on_identifier() {
        let schema = RowSchema::parse(DEFAULT_ROW_SCHEMA).unwrap();
        assert_eq!(
            schema.delete_sql("users"),
            "DELETE FROM \"users\" WHERE \"id\" = $1"
        );
    }

    #[test]
    fn select_sql_orders_by_identifier() {
        let schema = RowSchema::parse(DEFAULT_ROW_SCHEMA).unwrap();
        assert_eq!(
            schema.select_sql("users"),
            "SELECT \"id\", \"name\", \"age\" FROM \"users\" ORDER BY \"id\""
        );
    }
}
