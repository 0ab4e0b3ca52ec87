// ABOUTME: Error taxonomy for capture, log, and replay operations
// ABOUTME: PayloadError covers everything wrong with a single delta's contents

use thiserror::Error;

use crate::delta::DeltaAction;
use crate::schema::ColumnType;

/// Errors surfaced by the capture and replay engine.
///
/// A missing target table is deliberately not represented here: the replay
/// engine skips those deltas and reports them in its stats instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to connect to the database")]
    Connection(#[source] tokio_postgres::Error),

    #[error("failed to configure TLS")]
    Tls(#[from] native_tls::Error),

    #[error("failed to enumerate tables in schema \"{schema}\"")]
    ListTables {
        schema: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("failed to install change capture on table \"{table}\"")]
    Installation {
        table: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("failed to remove change capture from table \"{table}\"")]
    Uninstall {
        table: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("failed to write to the delta log")]
    LogWrite(#[source] tokio_postgres::Error),

    #[error("failed to read the delta log")]
    LogRead(#[source] tokio_postgres::Error),

    #[error("delta {id} on table \"{table}\" has a malformed payload")]
    MalformedDeltaPayload {
        id: i64,
        table: String,
        #[source]
        source: PayloadError,
    },

    #[error("failed to apply delta {id} ({action} on \"{table}\")")]
    Apply {
        id: i64,
        action: DeltaAction,
        table: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error(
        "invalid identifier {0:?}: identifiers must start with a lowercase letter or underscore \
         and contain only lowercase letters, digits, and underscores"
    )]
    InvalidIdentifier(String),

    #[error("invalid row schema: {0}")]
    InvalidSchema(String),
}

/// Everything that can be wrong with a stored delta's contents.
///
/// These indicate log corruption (or an operator edit gone wrong), so the
/// replay engine treats them as fatal rather than skippable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("unknown action {0:?}")]
    UnknownAction(String),

    #[error("table name {0:?} is not a safe identifier")]
    UnsafeTableName(String),

    #[error("{0} delta is missing its new row snapshot")]
    MissingNewData(DeltaAction),

    #[error("{0} delta is missing its old row snapshot")]
    MissingOldData(DeltaAction),

    #[error("{0} delta carries an old row snapshot it should not have")]
    UnexpectedOldData(DeltaAction),

    #[error("{0} delta carries a new row snapshot it should not have")]
    UnexpectedNewData(DeltaAction),

    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("missing column {0:?}")]
    MissingColumn(String),

    #[error("unexpected column {0:?}")]
    UnexpectedColumn(String),

    #[error("column {column:?} expects {expected}, got {found}")]
    TypeMismatch {
        column: String,
        expected: ColumnType,
        found: &'static str,
    },

    #[error("column {column:?} value {value} does not fit a 32-bit integer column")]
    IntegerOutOfRange { column: String, value: i64 },
}
