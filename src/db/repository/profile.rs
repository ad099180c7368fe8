use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{format_timestamp, parse_timestamp};
use crate::db::DatabaseError;
use crate::models::*;

const PROFILE_COLUMNS: &str =
    "id, name, guest_id, wechat_id, notes, overview, is_urged, created_at, updated_at";

struct ProfileRow {
    id: i64,
    name: String,
    guest_id: Option<i64>,
    wechat_id: String,
    notes: String,
    overview: String,
    is_urged: bool,
    created_at: String,
    updated_at: String,
}

fn read_profile_row(row: &Row<'_>) -> rusqlite::Result<ProfileRow> {
    Ok(ProfileRow {
        id: row.get(0)?,
        name: row.get(1)?,
        guest_id: row.get(2)?,
        wechat_id: row.get(3)?,
        notes: row.get(4)?,
        overview: row.get(5)?,
        is_urged: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn profile_from_row(row: ProfileRow) -> Result<Profile, DatabaseError> {
    Ok(Profile {
        id: row.id,
        name: row.name,
        guest_id: row.guest_id,
        wechat_id: row.wechat_id,
        notes: row.notes,
        overview: row.overview,
        is_urged: row.is_urged,
        created_at: parse_timestamp("created_at", &row.created_at)?,
        updated_at: parse_timestamp("updated_at", &row.updated_at)?,
    })
}

fn query_profiles(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<Profile>, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, read_profile_row)?;

    let mut profiles = Vec::new();
    for row in rows {
        profiles.push(profile_from_row(row?)?);
    }
    Ok(profiles)
}

fn not_found(entity_type: &str, id: i64) -> DatabaseError {
    DatabaseError::NotFound {
        entity_type: entity_type.into(),
        id: id.to_string(),
    }
}

pub fn insert_profile(
    conn: &Connection,
    fields: &ProfileFields,
    created_at: &NaiveDateTime,
) -> Result<i64, DatabaseError> {
    let at = format_timestamp(created_at);
    conn.execute(
        "INSERT INTO profiles (name, guest_id, wechat_id, notes, overview, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        params![
            fields.name,
            fields.guest_id,
            fields.wechat_id,
            fields.notes,
            fields.overview,
            at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_profile(conn: &Connection, id: i64) -> Result<Option<Profile>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = ?1"),
            params![id],
            read_profile_row,
        )
        .optional()?;
    row.map(profile_from_row).transpose()
}

pub fn update_profile_fields(
    conn: &Connection,
    id: i64,
    fields: &ProfileFields,
    updated_at: &NaiveDateTime,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE profiles SET name = ?2, guest_id = ?3, wechat_id = ?4, notes = ?5, overview = ?6,
         updated_at = ?7
         WHERE id = ?1",
        params![
            id,
            fields.name,
            fields.guest_id,
            fields.wechat_id,
            fields.notes,
            fields.overview,
            format_timestamp(updated_at),
        ],
    )?;
    if changed == 0 {
        return Err(not_found("Profile", id));
    }
    Ok(())
}

pub fn set_profile_urged(
    conn: &Connection,
    id: i64,
    urged: bool,
    updated_at: &NaiveDateTime,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE profiles SET is_urged = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, urged, format_timestamp(updated_at)],
    )?;
    if changed == 0 {
        return Err(not_found("Profile", id));
    }
    Ok(())
}

pub fn touch_profile(conn: &Connection, id: i64, updated_at: &NaiveDateTime) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE profiles SET updated_at = ?2 WHERE id = ?1",
        params![id, format_timestamp(updated_at)],
    )?;
    if changed == 0 {
        return Err(not_found("Profile", id));
    }
    Ok(())
}

/// Delete a profile and, by cascade, its records. Returns false if it did not exist.
pub fn delete_profile(conn: &Connection, id: i64) -> Result<bool, DatabaseError> {
    let removed = conn.execute("DELETE FROM profiles WHERE id = ?1", params![id])?;
    Ok(removed > 0)
}

/// Profiles linked to `guest_id`, most recently updated first.
pub fn list_profiles_for_guest(conn: &Connection, guest_id: i64) -> Result<Vec<Profile>, DatabaseError> {
    query_profiles(
        conn,
        &format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE guest_id = ?1
             ORDER BY updated_at DESC, id DESC"
        ),
        params![guest_id],
    )
}

/// Every profile, urged ones first, then most recently updated.
pub fn list_profiles_urged_first(conn: &Connection) -> Result<Vec<Profile>, DatabaseError> {
    query_profiles(
        conn,
        &format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles
             ORDER BY is_urged DESC, updated_at DESC, id DESC"
        ),
        [],
    )
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<(i64, i64, String, String, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn build_record(
    (id, profile_id, content, record_type, created_at): (i64, i64, String, String, String),
) -> Result<ProfileRecord, DatabaseError> {
    Ok(ProfileRecord {
        id,
        profile_id,
        content,
        record_type: record_type.parse()?,
        created_at: parse_timestamp("created_at", &created_at)?,
    })
}

pub fn insert_record(
    conn: &Connection,
    profile_id: i64,
    content: &str,
    record_type: RecordType,
    created_at: &NaiveDateTime,
) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO profile_records (profile_id, content, record_type, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![profile_id, content, record_type.as_str(), format_timestamp(created_at)],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_record(conn: &Connection, id: i64) -> Result<Option<ProfileRecord>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, profile_id, content, record_type, created_at FROM profile_records
             WHERE id = ?1",
            params![id],
            record_from_row,
        )
        .optional()?;
    row.map(build_record).transpose()
}

/// Records of a profile, newest first. `guest_visible_only` drops private doctor notes.
pub fn list_records(
    conn: &Connection,
    profile_id: i64,
    guest_visible_only: bool,
) -> Result<Vec<ProfileRecord>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, profile_id, content, record_type, created_at FROM profile_records
         WHERE profile_id = ?1 AND (?2 = 0 OR record_type != 'doctor_private')
         ORDER BY created_at DESC, id DESC",
    )?;
    let rows = stmt.query_map(params![profile_id, guest_visible_only], record_from_row)?;

    let mut records = Vec::new();
    for row in rows {
        records.push(build_record(row?)?);
    }
    Ok(records)
}

/// Type of the newest record of any visibility.
pub fn latest_record_type(conn: &Connection, profile_id: i64) -> Result<Option<RecordType>, DatabaseError> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT record_type FROM profile_records WHERE profile_id = ?1
             ORDER BY created_at DESC, id DESC LIMIT 1",
            params![profile_id],
            |row| row.get(0),
        )
        .optional()?;
    raw.map(|s| s.parse::<RecordType>()).transpose()
}

pub fn count_visible_records(conn: &Connection, profile_id: i64) -> Result<u32, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM profile_records
         WHERE profile_id = ?1 AND record_type != 'doctor_private'",
        params![profile_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn delete_record(conn: &Connection, id: i64) -> Result<bool, DatabaseError> {
    let removed = conn.execute("DELETE FROM profile_records WHERE id = ?1", params![id])?;
    Ok(removed > 0)
}

pub fn profile_stats(conn: &Connection) -> Result<ProfileStats, DatabaseError> {
    let stats = conn.query_row(
        "SELECT
            (SELECT COUNT(*) FROM profiles),
            (SELECT COUNT(*) FROM profiles WHERE guest_id IS NOT NULL),
            (SELECT COUNT(*) FROM profile_records),
            (SELECT COUNT(*) FROM profiles WHERE is_urged = 1)",
        [],
        |row| {
            Ok(ProfileStats {
                total_profiles: row.get(0)?,
                linked_profiles: row.get(1)?,
                total_records: row.get(2)?,
                urged_profiles: row.get(3)?,
            })
        },
    )?;
    Ok(stats)
}
