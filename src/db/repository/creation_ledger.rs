use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection};

use super::format_timestamp;
use crate::db::DatabaseError;

/// Record one appointment creation for the daily limit. Rows outlive the appointment.
pub fn record_creation(
    conn: &Connection,
    guest_id: i64,
    created_at: &NaiveDateTime,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO daily_appointment_creations (guest_id, creation_date, created_at)
         VALUES (?1, ?2, ?3)",
        params![
            guest_id,
            created_at.date().format("%Y-%m-%d").to_string(),
            format_timestamp(created_at),
        ],
    )?;
    Ok(())
}

pub fn count_creations_on(
    conn: &Connection,
    guest_id: i64,
    date: NaiveDate,
) -> Result<u32, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM daily_appointment_creations
         WHERE guest_id = ?1 AND creation_date = ?2",
        params![guest_id, date.format("%Y-%m-%d").to_string()],
        |row| row.get(0),
    )?;
    Ok(count)
}
