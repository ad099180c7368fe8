use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};

use super::{format_timestamp, parse_timestamp};
use crate::db::DatabaseError;
use crate::models::*;

pub fn insert_announcement(
    conn: &Connection,
    title: &str,
    content: &str,
    created_at: &NaiveDateTime,
) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO announcements (title, content, created_at) VALUES (?1, ?2, ?3)",
        params![title, content, format_timestamp(created_at)],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Every announcement, newest first.
pub fn list_announcements(conn: &Connection) -> Result<Vec<Announcement>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, title, content, created_at FROM announcements
         ORDER BY created_at DESC, id DESC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
        ))
    })?;

    let mut announcements = Vec::new();
    for row in rows {
        let (id, title, content, created_at) = row?;
        announcements.push(Announcement {
            id,
            title,
            content,
            created_at: parse_timestamp("created_at", &created_at)?,
        });
    }
    Ok(announcements)
}

pub fn count_announcements(conn: &Connection) -> Result<u32, DatabaseError> {
    let count = conn.query_row("SELECT COUNT(*) FROM announcements", [], |row| row.get(0))?;
    Ok(count)
}

pub fn delete_announcement(conn: &Connection, id: i64) -> Result<bool, DatabaseError> {
    let removed = conn.execute("DELETE FROM announcements WHERE id = ?1", params![id])?;
    Ok(removed > 0)
}

/// Remove the oldest announcement, returning its id.
pub fn delete_oldest_announcement(conn: &Connection) -> Result<Option<i64>, DatabaseError> {
    let oldest: Option<i64> = conn
        .query_row(
            "SELECT id FROM announcements ORDER BY created_at ASC, id ASC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(id) = oldest {
        delete_announcement(conn, id)?;
    }
    Ok(oldest)
}

pub fn count_announcements_after(conn: &Connection, after: &NaiveDateTime) -> Result<u32, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM announcements WHERE created_at > ?1",
        params![format_timestamp(after)],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// When the guest last opened the announcement list. `None` for an unknown guest.
pub fn get_announcement_view_time(
    conn: &Connection,
    guest_id: i64,
) -> Result<Option<NaiveDateTime>, DatabaseError> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT last_announcement_view_time FROM guests WHERE id = ?1",
            params![guest_id],
            |row| row.get(0),
        )
        .optional()?;
    raw.map(|s| parse_timestamp("last_announcement_view_time", &s))
        .transpose()
}

pub fn set_announcement_view_time(
    conn: &Connection,
    guest_id: i64,
    viewed_at: &NaiveDateTime,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE guests SET last_announcement_view_time = ?2 WHERE id = ?1",
        params![guest_id, format_timestamp(viewed_at)],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Guest".into(),
            id: guest_id.to_string(),
        });
    }
    Ok(())
}
