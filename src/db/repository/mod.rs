//! Repository layer: entity-scoped database operations.
//!
//! Free functions over `&Connection` so callers can pass either a plain
//! connection or an open transaction.

mod announcement;
mod appointment;
mod creation_ledger;
mod guest;
mod processing_pool;
mod profile;
mod scheduler_state;
mod urge_ledger;

use chrono::NaiveDateTime;

use super::DatabaseError;

/// Storage format for every timestamp column (local clinic time).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(field: &str, raw: &str) -> Result<NaiveDateTime, DatabaseError> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT).map_err(|e| {
        DatabaseError::ConstraintViolation(format!("Invalid {field} timestamp '{raw}': {e}"))
    })
}

fn parse_optional_timestamp(
    field: &str,
    raw: Option<String>,
) -> Result<Option<NaiveDateTime>, DatabaseError> {
    raw.map(|s| parse_timestamp(field, &s)).transpose()
}

// Re-export all public items from sub-modules
pub use announcement::*;
pub use appointment::*;
pub use creation_ledger::*;
pub use guest::*;
pub use processing_pool::*;
pub use profile::*;
pub use scheduler_state::*;
pub use urge_ledger::*;
