use chrono::NaiveDateTime;
use rusqlite::{params, Connection};

use super::{format_timestamp, parse_timestamp};
use crate::db::DatabaseError;
use crate::models::*;

/// Append a pool entry unless an active one already exists. Returns whether a row was added.
pub fn add_to_pool(
    conn: &Connection,
    appointment_id: i64,
    added_at: &NaiveDateTime,
) -> Result<bool, DatabaseError> {
    let added = conn.execute(
        "INSERT INTO processing_pool (appointment_id, added_at, is_removed)
         SELECT ?1, ?2, 0
         WHERE NOT EXISTS (
             SELECT 1 FROM processing_pool WHERE appointment_id = ?1 AND is_removed = 0
         )",
        params![appointment_id, format_timestamp(added_at)],
    )?;
    Ok(added > 0)
}

/// Soft-remove every pool entry of an appointment.
pub fn remove_from_pool(conn: &Connection, appointment_id: i64) -> Result<usize, DatabaseError> {
    let removed = conn.execute(
        "UPDATE processing_pool SET is_removed = 1 WHERE appointment_id = ?1 AND is_removed = 0",
        params![appointment_id],
    )?;
    Ok(removed)
}

/// Active entries, newest first.
pub fn list_active_pool(conn: &Connection) -> Result<Vec<ProcessingPoolEntry>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, appointment_id, added_at, is_removed FROM processing_pool
         WHERE is_removed = 0
         ORDER BY added_at DESC, id DESC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, bool>(3)?,
        ))
    })?;

    let mut entries = Vec::new();
    for row in rows {
        let (id, appointment_id, added_at, is_removed) = row?;
        entries.push(ProcessingPoolEntry {
            id,
            appointment_id,
            added_at: parse_timestamp("added_at", &added_at)?,
            is_removed,
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::{insert_appointment, insert_guest};
    use crate::db::sqlite::open_memory_database;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn seed(conn: &Connection, n: usize) -> Vec<i64> {
        let at = ts("2026-03-02 09:00:00");
        let guest = insert_guest(conn, "pool@example.com", &at).unwrap();
        (0..n)
            .map(|_| {
                insert_appointment(
                    conn,
                    &NewAppointment {
                        guest_id: guest,
                        patient_name: "Chen".into(),
                        demand: "Checkup".into(),
                        wechat_id: "chen".into(),
                        priority: Priority::Low,
                    },
                    &at,
                )
                .unwrap()
            })
            .collect()
    }

    #[test]
    fn add_is_deduplicated_while_active() {
        let conn = open_memory_database().unwrap();
        let ids = seed(&conn, 1);
        assert!(add_to_pool(&conn, ids[0], &ts("2026-03-02 10:00:00")).unwrap());
        assert!(!add_to_pool(&conn, ids[0], &ts("2026-03-02 10:05:00")).unwrap());
        assert_eq!(list_active_pool(&conn).unwrap().len(), 1);
    }

    #[test]
    fn removed_entries_hidden_and_can_be_re_added() {
        let conn = open_memory_database().unwrap();
        let ids = seed(&conn, 1);
        add_to_pool(&conn, ids[0], &ts("2026-03-02 10:00:00")).unwrap();
        assert_eq!(remove_from_pool(&conn, ids[0]).unwrap(), 1);
        assert!(list_active_pool(&conn).unwrap().is_empty());
        assert_eq!(remove_from_pool(&conn, ids[0]).unwrap(), 0, "idempotent");

        assert!(add_to_pool(&conn, ids[0], &ts("2026-03-02 11:00:00")).unwrap());
    }

    #[test]
    fn list_is_newest_first() {
        let conn = open_memory_database().unwrap();
        let ids = seed(&conn, 2);
        add_to_pool(&conn, ids[0], &ts("2026-03-02 10:00:00")).unwrap();
        add_to_pool(&conn, ids[1], &ts("2026-03-02 11:00:00")).unwrap();

        let pool = list_active_pool(&conn).unwrap();
        assert_eq!(pool[0].appointment_id, ids[1]);
        assert_eq!(pool[1].appointment_id, ids[0]);
        assert!(!pool[0].is_removed);
    }
}
