// ABOUTME: Library crate for delta-replay
// ABOUTME: Trigger-based change capture and point-in-time replay for PostgreSQL

pub mod capture;
pub mod delta;
pub mod error;
pub mod postgres;
pub mod replay;
pub mod schema;
pub mod snapshot;

pub use error::{Error, PayloadError};
pub use schema::{ColumnDef, ColumnType, RowSchema};
