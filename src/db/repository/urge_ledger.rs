use chrono::NaiveDateTime;
use rusqlite::{params, Connection};

use super::format_timestamp;
use crate::db::DatabaseError;

/// Record one urge against the guest's weekly quota. Rows outlive the appointment.
pub fn record_urge(
    conn: &Connection,
    guest_id: i64,
    appointment_id: i64,
    urged_at: &NaiveDateTime,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO urge_ledger (guest_id, appointment_id, urged_at) VALUES (?1, ?2, ?3)",
        params![guest_id, appointment_id, format_timestamp(urged_at)],
    )?;
    Ok(())
}

/// Urges a guest has issued at or after `since`, including urges already
/// resolved and urges on appointments since purged.
pub fn count_urges_since(
    conn: &Connection,
    guest_id: i64,
    since: &NaiveDateTime,
) -> Result<u32, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM urge_ledger WHERE guest_id = ?1 AND urged_at >= ?2",
        params![guest_id, format_timestamp(since)],
        |row| row.get(0),
    )?;
    Ok(count)
}
