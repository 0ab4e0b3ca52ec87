// ABOUTME: Delta record model shared by the capture and replay paths
// ABOUTME: One Delta is one captured row mutation with before/after snapshots

pub mod codec;
pub mod log;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::error::PayloadError;

pub use codec::{bind_row, bind_value, decode, encode, RowSnapshot, SnapshotValue};
pub use log::{DeltaLog, DELTA_LOG_TABLE};

/// The closed set of row mutations a delta can record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeltaAction {
    Insert,
    Update,
    Delete,
}

impl DeltaAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeltaAction::Insert => "INSERT",
            DeltaAction::Update => "UPDATE",
            DeltaAction::Delete => "DELETE",
        }
    }

    pub fn parse(value: &str) -> Result<Self, PayloadError> {
        match value {
            "INSERT" => Ok(DeltaAction::Insert),
            "UPDATE" => Ok(DeltaAction::Update),
            "DELETE" => Ok(DeltaAction::Delete),
            other => Err(PayloadError::UnknownAction(other.to_string())),
        }
    }
}

impl fmt::Display for DeltaAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One captured row mutation, as stored in the delta log.
///
/// Replay order is `(timestamp, id)`; `id` is storage identity and only
/// breaks ties between deltas captured at the same instant.
#[derive(Debug, Clone, Serialize)]
pub struct Delta {
    pub id: i64,
    pub action: DeltaAction,
    pub table_name: String,
    pub old_data: Option<Value>,
    pub new_data: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

impl Delta {
    /// Enforce the per-action snapshot presence invariant.
    ///
    /// INSERT carries only `new_data`, DELETE only `old_data`, UPDATE both.
    /// An UPDATE without `old_data` is rejected here rather than replayed
    /// with a partial key.
    pub fn check_shape(&self) -> Result<(), PayloadError> {
        match self.action {
            DeltaAction::Insert => {
                if self.new_data.is_none() {
                    return Err(PayloadError::MissingNewData(self.action));
                }
                if self.old_data.is_some() {
                    return Err(PayloadError::UnexpectedOldData(self.action));
                }
            }
            DeltaAction::Update => {
                if self.old_data.is_none() {
                    return Err(PayloadError::MissingOldData(self.action));
                }
                if self.new_data.is_none() {
                    return Err(PayloadError::MissingNewData(self.action));
                }
            }
            DeltaAction::Delete => {
                if self.old_data.is_none() {
                    return Err(PayloadError::MissingOldData(self.action));
                }
                if self.new_data.is_some() {
                    return Err(PayloadError::UnexpectedNewData(self.action));
                }
            }
        }
        Ok(())
    }
}
