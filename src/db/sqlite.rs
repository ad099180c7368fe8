use std::path::Path;

use rusqlite::Connection;

use super::DatabaseError;

/// Schema migrations, applied in order. Each script records its own version.
const MIGRATIONS: &[(i64, &str)] = &[
    (1, include_str!("../../resources/migrations/001_initial.sql")),
    (2, include_str!("../../resources/migrations/002_urge_ledger.sql")),
    (3, include_str!("../../resources/migrations/003_profiles_announcements.sql")),
];

/// Several request handlers may hold their own connection to the same file.
const BUSY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Open (creating if needed) the clinic database at `path` and migrate it.
pub fn open_database(path: &Path) -> Result<Connection, DatabaseError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| DatabaseError::Directory {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let conn = Connection::open(path)?;
    configure_pragmas(&conn)?;
    run_migrations(&conn)?;
    Ok(conn)
}

/// Open an in-memory database (for testing)
pub fn open_memory_database() -> Result<Connection, DatabaseError> {
    let conn = Connection::open_in_memory()?;
    configure_pragmas(&conn)?;
    run_migrations(&conn)?;
    Ok(conn)
}

fn configure_pragmas(conn: &Connection) -> Result<(), DatabaseError> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.pragma_update(None, "journal_mode", "DELETE")?;
    conn.pragma_update(None, "foreign_keys", true)?;
    Ok(())
}

/// Apply every migration newer than the stored schema version.
///
/// Each migration runs in its own transaction so a failing script leaves the
/// previous schema intact.
pub fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    let current_version = get_current_version(conn)?;

    for &(version, sql) in MIGRATIONS.iter().filter(|(v, _)| *v > current_version) {
        tracing::info!(version, "Applying schema migration");
        let failed = |e: rusqlite::Error| DatabaseError::MigrationFailed {
            version,
            reason: e.to_string(),
        };
        let tx = conn.unchecked_transaction().map_err(failed)?;
        tx.execute_batch(sql).map_err(failed)?;
        tx.commit().map_err(failed)?;
    }

    Ok(())
}

/// Current schema version, 0 for a blank database.
pub fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let has_table: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_version')",
        [],
        |row| row.get(0),
    )?;
    if !has_table {
        return Ok(0);
    }
    let version: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(version.unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_tables(conn: &Connection) -> i64 {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
            [],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn database_initializes_all_tables() {
        let conn = open_memory_database().unwrap();
        // guests, appointments, daily_appointment_creations, processing_pool, scheduler_state,
        // urge_ledger, profiles, profile_records, announcements + schema_version
        let count = count_tables(&conn);
        assert_eq!(count, 10, "Expected 10 tables, got {count}");
    }

    #[test]
    fn blank_database_is_version_zero() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(get_current_version(&conn).unwrap(), 0);
    }

    #[test]
    fn schema_version_is_latest_migration() {
        let conn = open_memory_database().unwrap();
        let latest = MIGRATIONS.last().map(|(v, _)| *v).unwrap();
        assert_eq!(get_current_version(&conn).unwrap(), latest);
    }

    #[test]
    fn rerunning_migrations_is_a_no_op() {
        let conn = open_memory_database().unwrap();
        run_migrations(&conn).unwrap();
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, MIGRATIONS.len() as i64);
    }

    #[test]
    fn version_one_database_upgrades_and_keeps_urges() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(MIGRATIONS[0].1).unwrap();
        conn.execute_batch(
            "INSERT INTO guests (email, created_at) VALUES ('a@example.com', '2026-03-01 08:00:00');
             INSERT INTO appointments (guest_id, patient_name, demand, wechat_id, state, created_at,
                 responded_at, urged_at)
             VALUES (1, 'Li', 'Cough', 'li_1', 'urged', '2026-03-02 09:00:00',
                 '2026-03-02 09:30:00', '2026-03-02 10:00:00');",
        )
        .unwrap();

        run_migrations(&conn).unwrap();
        assert_eq!(get_current_version(&conn).unwrap(), 3);
        let urges: i64 = conn
            .query_row("SELECT COUNT(*) FROM urge_ledger WHERE guest_id = 1", [], |row| row.get(0))
            .unwrap();
        assert_eq!(urges, 1);
        let seen: String = conn
            .query_row("SELECT last_announcement_view_time FROM guests WHERE id = 1", [], |row| row.get(0))
            .unwrap();
        assert_eq!(seen, "1970-01-01 00:00:00");
    }

    #[test]
    fn foreign_keys_enabled() {
        let conn = open_memory_database().unwrap();
        let fk: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn scheduler_state_starts_at_tier_one() {
        let conn = open_memory_database().unwrap();
        let cursor: i64 = conn
            .query_row(
                "SELECT last_processed_priority FROM scheduler_state WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(cursor, 1);
    }

    #[test]
    fn file_database_creates_directory_and_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("clinic.db");
        {
            let conn = open_database(&path).unwrap();
            conn.execute(
                "INSERT INTO guests (email, created_at) VALUES ('a@example.com', '2026-03-02 09:00:00')",
                [],
            )
            .unwrap();
        }
        let conn = open_database(&path).unwrap();
        let guests: i64 = conn
            .query_row("SELECT COUNT(*) FROM guests", [], |row| row.get(0))
            .unwrap();
        assert_eq!(guests, 1);
    }
}
