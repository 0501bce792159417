//! Shared type definitions for the database layer.

use thiserror::Error;

/// Errors specific to database operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),

    #[error("Corrupt cell row {number}: {reason}")]
    CorruptRow { number: String, reason: String },
}

/// A row from the `cells` table, before enum parsing and invariant checks.
#[derive(Debug, Clone)]
pub struct DbCellRow {
    pub number: String,
    pub cell_type: String,
    pub capacity: i64,
    pub occupancy: i64,
    pub security_level: String,
    pub hold: Option<String>,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}
