use chrono::NaiveDateTime;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use super::{format_timestamp, parse_optional_timestamp, parse_timestamp};
use crate::db::DatabaseError;
use crate::models::*;

const APPOINTMENT_COLUMNS: &str = "id, guest_id, patient_name, demand, wechat_id, priority, state,
     annotation, note, today_modified_count, created_at, responded_at, urged_at,
     processed_at, deleted_at, last_modified_at";

struct AppointmentRow {
    id: i64,
    guest_id: i64,
    patient_name: String,
    demand: String,
    wechat_id: String,
    priority: i64,
    state: String,
    annotation: String,
    note: String,
    today_modified_count: u32,
    created_at: String,
    responded_at: Option<String>,
    urged_at: Option<String>,
    processed_at: Option<String>,
    deleted_at: Option<String>,
    last_modified_at: Option<String>,
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<AppointmentRow> {
    Ok(AppointmentRow {
        id: row.get(0)?,
        guest_id: row.get(1)?,
        patient_name: row.get(2)?,
        demand: row.get(3)?,
        wechat_id: row.get(4)?,
        priority: row.get(5)?,
        state: row.get(6)?,
        annotation: row.get(7)?,
        note: row.get(8)?,
        today_modified_count: row.get(9)?,
        created_at: row.get(10)?,
        responded_at: row.get(11)?,
        urged_at: row.get(12)?,
        processed_at: row.get(13)?,
        deleted_at: row.get(14)?,
        last_modified_at: row.get(15)?,
    })
}

fn appointment_from_row(row: AppointmentRow) -> Result<Appointment, DatabaseError> {
    let appointment = Appointment {
        id: row.id,
        guest_id: row.guest_id,
        patient_name: row.patient_name,
        demand: row.demand,
        wechat_id: row.wechat_id,
        priority: Priority::from_level(row.priority)?,
        state: row.state.parse()?,
        annotation: row.annotation,
        note: row.note,
        today_modified_count: row.today_modified_count,
        created_at: parse_timestamp("created_at", &row.created_at)?,
        responded_at: parse_optional_timestamp("responded_at", row.responded_at)?,
        urged_at: parse_optional_timestamp("urged_at", row.urged_at)?,
        processed_at: parse_optional_timestamp("processed_at", row.processed_at)?,
        deleted_at: parse_optional_timestamp("deleted_at", row.deleted_at)?,
        last_modified_at: parse_optional_timestamp("last_modified_at", row.last_modified_at)?,
    };
    appointment.validate()?;
    Ok(appointment)
}

fn query_appointments(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<Appointment>, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, read_row)?;

    let mut appointments = Vec::new();
    for row in rows {
        appointments.push(appointment_from_row(row?)?);
    }
    Ok(appointments)
}

pub fn insert_appointment(
    conn: &Connection,
    appointment: &NewAppointment,
    created_at: &NaiveDateTime,
) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO appointments (guest_id, patient_name, demand, wechat_id, priority, state, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            appointment.guest_id,
            appointment.patient_name,
            appointment.demand,
            appointment.wechat_id,
            appointment.priority.level(),
            AppointmentState::Created.as_str(),
            format_timestamp(created_at),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_appointment(conn: &Connection, id: i64) -> Result<Option<Appointment>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = ?1"),
            params![id],
            read_row,
        )
        .optional()?;
    row.map(appointment_from_row).transpose()
}

/// Write back every mutable column of an existing appointment.
pub fn update_appointment(conn: &Connection, appointment: &Appointment) -> Result<(), DatabaseError> {
    appointment.validate()?;
    let changed = conn.execute(
        "UPDATE appointments SET
         demand = ?2, wechat_id = ?3, priority = ?4, state = ?5, annotation = ?6, note = ?7,
         today_modified_count = ?8, responded_at = ?9, urged_at = ?10, processed_at = ?11,
         deleted_at = ?12, last_modified_at = ?13
         WHERE id = ?1",
        params![
            appointment.id,
            appointment.demand,
            appointment.wechat_id,
            appointment.priority.level(),
            appointment.state.as_str(),
            appointment.annotation,
            appointment.note,
            appointment.today_modified_count,
            appointment.responded_at.as_ref().map(format_timestamp),
            appointment.urged_at.as_ref().map(format_timestamp),
            appointment.processed_at.as_ref().map(format_timestamp),
            appointment.deleted_at.as_ref().map(format_timestamp),
            appointment.last_modified_at.as_ref().map(format_timestamp),
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Appointment".into(),
            id: appointment.id.to_string(),
        });
    }
    Ok(())
}

/// Every appointment currently eligible for the processing queue, ordered by id.
pub fn list_eligible_entries(conn: &Connection) -> Result<Vec<QueueEntry>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, priority FROM appointments
         WHERE state IN ('responded', 'urged')
         ORDER BY id",
    )?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?;

    let mut entries = Vec::new();
    for row in rows {
        let (id, level) = row?;
        entries.push(QueueEntry::new(id, Priority::from_level(level)?));
    }
    Ok(entries)
}

/// Live priorities of the given ids. Ids that no longer exist are skipped.
pub fn get_priorities(conn: &Connection, ids: &[i64]) -> Result<Vec<Priority>, DatabaseError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; ids.len()].join(", ");
    let mut stmt = conn.prepare(&format!(
        "SELECT priority FROM appointments WHERE id IN ({placeholders})"
    ))?;
    let rows = stmt.query_map(params_from_iter(ids.iter()), |row| row.get::<_, i64>(0))?;

    let mut priorities = Vec::new();
    for level in rows {
        priorities.push(Priority::from_level(level?)?);
    }
    Ok(priorities)
}

/// Oldest (lowest id) appointment in the given state.
pub fn first_in_state(
    conn: &Connection,
    state: AppointmentState,
) -> Result<Option<Appointment>, DatabaseError> {
    let mut found = query_appointments(
        conn,
        &format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE state = ?1 ORDER BY id LIMIT 1"),
        params![state.as_str()],
    )?;
    Ok(found.pop())
}

pub fn count_in_state(conn: &Connection, state: AppointmentState) -> Result<u32, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM appointments WHERE state = ?1",
        params![state.as_str()],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// A guest's appointments that are not soft-deleted, newest first.
pub fn list_guest_appointments(
    conn: &Connection,
    guest_id: i64,
) -> Result<Vec<Appointment>, DatabaseError> {
    query_appointments(
        conn,
        &format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments
             WHERE guest_id = ?1 AND state != 'deleted'
             ORDER BY id DESC"
        ),
        params![guest_id],
    )
}

/// Appointments of a guest that are neither processed nor deleted.
pub fn count_open_for_guest(conn: &Connection, guest_id: i64) -> Result<u32, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM appointments
         WHERE guest_id = ?1 AND state IN ('created', 'responded', 'urged')",
        params![guest_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Physically remove appointments soft-deleted before `cutoff`.
pub fn purge_deleted_before(conn: &Connection, cutoff: &NaiveDateTime) -> Result<usize, DatabaseError> {
    let removed = conn.execute(
        "DELETE FROM appointments WHERE state = 'deleted' AND deleted_at < ?1",
        params![format_timestamp(cutoff)],
    )?;
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::insert_guest;
    use crate::db::sqlite::open_memory_database;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn setup() -> (Connection, i64) {
        let conn = open_memory_database().unwrap();
        let guest = insert_guest(&conn, "guest@example.com", &ts("2026-03-01 08:00:00")).unwrap();
        (conn, guest)
    }

    fn new_appt(guest_id: i64, priority: Priority) -> NewAppointment {
        NewAppointment {
            guest_id,
            patient_name: "Zhou".into(),
            demand: "Back pain".into(),
            wechat_id: "zhou_88".into(),
            priority,
        }
    }

    fn respond(conn: &Connection, id: i64) {
        let mut appt = get_appointment(conn, id).unwrap().unwrap();
        appt.state = AppointmentState::Responded;
        appt.responded_at = Some(ts("2026-03-02 10:00:00"));
        update_appointment(conn, &appt).unwrap();
    }

    #[test]
    fn insert_and_get_round_trip() {
        let (conn, guest) = setup();
        let id = insert_appointment(&conn, &new_appt(guest, Priority::High), &ts("2026-03-02 09:00:00")).unwrap();

        let appt = get_appointment(&conn, id).unwrap().unwrap();
        assert_eq!(appt.guest_id, guest);
        assert_eq!(appt.priority, Priority::High);
        assert_eq!(appt.state, AppointmentState::Created);
        assert_eq!(appt.created_at, ts("2026-03-02 09:00:00"));
        assert!(appt.responded_at.is_none());
    }

    #[test]
    fn get_missing_returns_none() {
        let (conn, _) = setup();
        assert!(get_appointment(&conn, 404).unwrap().is_none());
    }

    #[test]
    fn ids_are_monotonic_and_never_reused() {
        let (conn, guest) = setup();
        let at = ts("2026-03-02 09:00:00");
        let a = insert_appointment(&conn, &new_appt(guest, Priority::Low), &at).unwrap();
        let b = insert_appointment(&conn, &new_appt(guest, Priority::Low), &at).unwrap();
        conn.execute("DELETE FROM appointments WHERE id = ?1", params![b]).unwrap();
        let c = insert_appointment(&conn, &new_appt(guest, Priority::Low), &at).unwrap();
        assert!(a < b && b < c, "AUTOINCREMENT must not hand out {b} twice");
    }

    #[test]
    fn update_missing_returns_not_found() {
        let (conn, guest) = setup();
        let id = insert_appointment(&conn, &new_appt(guest, Priority::Low), &ts("2026-03-02 09:00:00")).unwrap();
        let mut appt = get_appointment(&conn, id).unwrap().unwrap();
        appt.id = 999;
        assert!(matches!(
            update_appointment(&conn, &appt),
            Err(DatabaseError::NotFound { .. })
        ));
    }

    #[test]
    fn update_rejects_inconsistent_state() {
        let (conn, guest) = setup();
        let id = insert_appointment(&conn, &new_appt(guest, Priority::Low), &ts("2026-03-02 09:00:00")).unwrap();
        let mut appt = get_appointment(&conn, id).unwrap().unwrap();
        appt.state = AppointmentState::Urged;
        assert!(matches!(
            update_appointment(&conn, &appt),
            Err(DatabaseError::ConstraintViolation(_))
        ));
    }

    #[test]
    fn corrupted_row_fails_to_decode() {
        let (conn, guest) = setup();
        let id = insert_appointment(&conn, &new_appt(guest, Priority::Low), &ts("2026-03-02 09:00:00")).unwrap();
        conn.execute("UPDATE appointments SET state = 'processed' WHERE id = ?1", params![id])
            .unwrap();
        assert!(get_appointment(&conn, id).is_err());
    }

    #[test]
    fn eligible_entries_only_include_queued_states() {
        let (conn, guest) = setup();
        let at = ts("2026-03-02 09:00:00");
        let created = insert_appointment(&conn, &new_appt(guest, Priority::Low), &at).unwrap();
        let responded = insert_appointment(&conn, &new_appt(guest, Priority::Medium), &at).unwrap();
        let deleted = insert_appointment(&conn, &new_appt(guest, Priority::High), &at).unwrap();
        respond(&conn, responded);
        respond(&conn, deleted);
        let mut appt = get_appointment(&conn, deleted).unwrap().unwrap();
        appt.state = AppointmentState::Deleted;
        appt.deleted_at = Some(at);
        update_appointment(&conn, &appt).unwrap();

        let entries = list_eligible_entries(&conn).unwrap();
        assert_eq!(entries, vec![QueueEntry::new(responded, Priority::Medium)]);
        assert!(!entries.iter().any(|e| e.id == created));
    }

    #[test]
    fn priorities_skip_missing_ids() {
        let (conn, guest) = setup();
        let at = ts("2026-03-02 09:00:00");
        let a = insert_appointment(&conn, &new_appt(guest, Priority::Critical), &at).unwrap();
        let b = insert_appointment(&conn, &new_appt(guest, Priority::Low), &at).unwrap();

        let mut found = get_priorities(&conn, &[a, b, 12345]).unwrap();
        found.sort();
        assert_eq!(found, vec![Priority::Low, Priority::Critical]);
        assert!(get_priorities(&conn, &[]).unwrap().is_empty());
    }

    #[test]
    fn first_in_state_returns_lowest_id() {
        let (conn, guest) = setup();
        let at = ts("2026-03-02 09:00:00");
        let first = insert_appointment(&conn, &new_appt(guest, Priority::Low), &at).unwrap();
        insert_appointment(&conn, &new_appt(guest, Priority::Critical), &at).unwrap();

        let found = first_in_state(&conn, AppointmentState::Created).unwrap().unwrap();
        assert_eq!(found.id, first);
        assert!(first_in_state(&conn, AppointmentState::Urged).unwrap().is_none());
        assert_eq!(count_in_state(&conn, AppointmentState::Created).unwrap(), 2);
    }

    #[test]
    fn open_count_excludes_processed_and_deleted() {
        let (conn, guest) = setup();
        let at = ts("2026-03-02 09:00:00");
        insert_appointment(&conn, &new_appt(guest, Priority::Low), &at).unwrap();
        let gone = insert_appointment(&conn, &new_appt(guest, Priority::Low), &at).unwrap();
        let mut appt = get_appointment(&conn, gone).unwrap().unwrap();
        appt.state = AppointmentState::Deleted;
        appt.deleted_at = Some(at);
        update_appointment(&conn, &appt).unwrap();

        assert_eq!(count_open_for_guest(&conn, guest).unwrap(), 1);
        assert_eq!(list_guest_appointments(&conn, guest).unwrap().len(), 1);
    }

    #[test]
    fn purge_removes_only_old_soft_deletions() {
        let (conn, guest) = setup();
        let at = ts("2026-03-02 09:00:00");
        let old = insert_appointment(&conn, &new_appt(guest, Priority::Low), &at).unwrap();
        let fresh = insert_appointment(&conn, &new_appt(guest, Priority::Low), &at).unwrap();
        for (id, when) in [(old, "2026-03-02 18:00:00"), (fresh, "2026-03-03 07:00:00")] {
            let mut appt = get_appointment(&conn, id).unwrap().unwrap();
            appt.state = AppointmentState::Deleted;
            appt.deleted_at = Some(ts(when));
            update_appointment(&conn, &appt).unwrap();
        }

        let removed = purge_deleted_before(&conn, &ts("2026-03-03 00:00:00")).unwrap();
        assert_eq!(removed, 1);
        assert!(get_appointment(&conn, old).unwrap().is_none());
        assert!(get_appointment(&conn, fresh).unwrap().is_some());
    }
}
