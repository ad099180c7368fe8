use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};

use super::{format_timestamp, parse_timestamp};
use crate::db::DatabaseError;
use crate::models::*;

pub fn insert_guest(
    conn: &Connection,
    email: &str,
    created_at: &NaiveDateTime,
) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO guests (email, created_at) VALUES (?1, ?2)",
        params![email, format_timestamp(created_at)],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            DatabaseError::ConstraintViolation(format!("Guest email already registered: {email}"))
        }
        other => DatabaseError::from(other),
    })?;
    Ok(conn.last_insert_rowid())
}

pub fn get_guest(conn: &Connection, id: i64) -> Result<Option<Guest>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, email, created_at FROM guests WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        )
        .optional()?;

    row.map(|(id, email, created_at)| {
        Ok(Guest {
            id,
            email,
            created_at: parse_timestamp("created_at", &created_at)?,
        })
    })
    .transpose()
}
