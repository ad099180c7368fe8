//! Persistence: SQLite connection setup, schema migrations and the
//! entity-scoped repository functions.

pub mod repository;
pub mod sqlite;

pub use repository::*;
pub use sqlite::*;

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Cannot create database directory {path}: {source}")]
    Directory {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    /// A stored tag or level that no enum variant maps to.
    #[error("Invalid enum value for {field}: {value}")]
    InvalidEnum { field: String, value: String },

    #[error("Migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },

    /// Row contents that contradict each other, e.g. a state without its timestamp.
    #[error("Constraint violated: {0}")]
    ConstraintViolation(String),
}
