//! SQLite-backed storage for cell records.
//!
//! The database lives at `~/.cellblock/cellblock.db` unless the facility
//! config points elsewhere. The connection sits behind a mutex so a single
//! `CellDb` can be shared by the manager and background loaders.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::Connection;

mod cells;
pub mod types;
pub use types::*;

pub struct CellDb {
    conn: Mutex<Connection>,
}

impl CellDb {
    /// Open (or create) the database at `~/.cellblock/cellblock.db` and apply the schema.
    pub fn open() -> Result<Self, DbError> {
        let path = Self::default_path()?;
        Self::open_at(path)
    }

    /// Open a database at an explicit path.
    pub fn open_at(path: PathBuf) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(DbError::CreateDir)?;
            }
        }

        let conn = Connection::open(&path)?;

        // Enable WAL mode for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        crate::migrations::run_migrations(&conn).map_err(DbError::Migration)?;
        log::info!("Opened cell database at {}", path.display());

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open a private in-memory database with the schema applied.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        crate::migrations::run_migrations(&conn).map_err(DbError::Migration)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Resolve the default database path: `~/.cellblock/cellblock.db`.
    pub fn default_path() -> Result<PathBuf, DbError> {
        let home = dirs::home_dir().ok_or(DbError::HomeDirNotFound)?;
        Ok(home.join(".cellblock").join("cellblock.db"))
    }

    /// Run a closure against the connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&Connection) -> Result<T, DbError>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Execute a closure within a SQLite transaction.
    /// Commits on Ok, rolls back on Err.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&Connection) -> Result<T, DbError>,
    {
        let conn = self.conn.lock();
        conn.execute_batch("BEGIN IMMEDIATE")?;
        let result = f(&conn).and_then(|val| {
            conn.execute_batch("COMMIT")?;
            Ok(val)
        });
        // A failed COMMIT leaves the transaction open; close it either way.
        if let Err(e) = &result {
            if !conn.is_autocommit() {
                if let Err(rollback) = conn.execute_batch("ROLLBACK") {
                    log::warn!("Rollback failed after error '{}': {}", e, rollback);
                }
            }
        }
        result
    }

    /// Hot copy of the live database using SQLite's online backup API.
    pub fn backup_to(&self, backup_path: &Path) -> Result<(), DbError> {
        let conn = self.conn.lock();
        let mut backup_conn = Connection::open(backup_path)?;
        let backup = rusqlite::backup::Backup::new(&conn, &mut backup_conn)?;

        // Copy all pages in one step (cell tables stay small)
        backup.step(-1)?;

        log::info!("Cell database backed up to {}", backup_path.display());
        Ok(())
    }
}
