use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};

use super::format_timestamp;
use crate::db::DatabaseError;

/// Raw stored round-robin cursor, `None` when the singleton row is missing.
///
/// Range coercion is the caller's concern.
pub fn get_scheduler_cursor(conn: &Connection) -> Result<Option<i64>, DatabaseError> {
    let cursor = conn
        .query_row(
            "SELECT last_processed_priority FROM scheduler_state WHERE id = 1",
            [],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    Ok(cursor)
}

/// Persist the last served tier, recreating the singleton row if it was lost.
pub fn set_scheduler_cursor(
    conn: &Connection,
    level: u8,
    updated_at: &NaiveDateTime,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO scheduler_state (id, last_processed_priority, updated_at)
         VALUES (1, ?1, ?2)
         ON CONFLICT(id) DO UPDATE SET
           last_processed_priority = excluded.last_processed_priority,
           updated_at = excluded.updated_at",
        params![level, format_timestamp(updated_at)],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn seeded_cursor_is_one() {
        let conn = open_memory_database().unwrap();
        assert_eq!(get_scheduler_cursor(&conn).unwrap(), Some(1));
    }

    #[test]
    fn set_then_get() {
        let conn = open_memory_database().unwrap();
        set_scheduler_cursor(&conn, 2, &ts("2026-03-02 10:00:00")).unwrap();
        assert_eq!(get_scheduler_cursor(&conn).unwrap(), Some(2));
    }

    #[test]
    fn missing_row_reads_none_and_is_recreated_on_write() {
        let conn = open_memory_database().unwrap();
        conn.execute("DELETE FROM scheduler_state", []).unwrap();
        assert_eq!(get_scheduler_cursor(&conn).unwrap(), None);

        set_scheduler_cursor(&conn, 3, &ts("2026-03-02 10:00:00")).unwrap();
        assert_eq!(get_scheduler_cursor(&conn).unwrap(), Some(3));
    }
}
