//! SQLite persistence layer.
//!
//! A single database file in WAL mode backs every repository. All writes go
//! through one shared connection behind a mutex (the writer lock); WAL keeps
//! readers non-blocking while a write is in flight.

mod blacklist;
mod config_entries;
mod glossary;
mod history;
mod hooks;
mod jobs;
mod memory;
mod migrations;
mod presets;
mod profiles;
mod provider_cache;
mod scoring;
mod wanted;

pub use blacklist::*;
pub use config_entries::*;
pub use glossary::*;
pub use history::*;
pub use hooks::*;
pub use jobs::*;
pub use memory::*;
pub use presets::*;
pub use profiles::*;
pub use provider_cache::*;
pub use scoring::*;
pub use wanted::*;

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use thiserror::Error;

/// Errors from any repository call. Fatal for the containing job; callers
/// must not swallow these above the job boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound("no rows".to_string()),
            rusqlite::Error::SqliteFailure(err, msg)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::Constraint(msg.unwrap_or_else(|| err.to_string()))
            }
            other => StoreError::Database(other.to_string()),
        }
    }
}

/// Shared handle to the single database file.
///
/// Cheap to clone; every repository holds one. The mutex is the writer lock:
/// multi-statement mutations take it once and run inside a transaction.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database file, switch on WAL, run migrations.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory database for tests.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a closure with the connection under the writer lock.
    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let conn = self.conn.lock().unwrap();
        f(&conn)
    }

    /// Run a closure inside an explicit transaction.
    pub(crate) fn with_tx<T>(
        &self,
        f: impl FnOnce(&rusqlite::Transaction) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(StoreError::from)?;
        let result = f(&tx)?;
        tx.commit().map_err(StoreError::from)?;
        Ok(result)
    }

    /// Number of migrations applied, for diagnostics.
    pub fn schema_version(&self) -> Result<u32, StoreError> {
        self.with_conn(|conn| {
            let count: u32 = conn.query_row(
                "SELECT COUNT(*) FROM schema_migrations",
                [],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_runs_migrations() {
        let db = Database::in_memory().unwrap();
        assert!(db.schema_version().unwrap() > 0);
    }

    #[test]
    fn test_open_is_idempotent() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("sublarr.db");
        let db = Database::open(&path).unwrap();
        let version = db.schema_version().unwrap();
        drop(db);
        // Reopening must not re-apply migrations
        let db = Database::open(&path).unwrap();
        assert_eq!(db.schema_version().unwrap(), version);
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let db = Database::in_memory().unwrap();
        let result: Result<(), StoreError> = db.with_tx(|tx| {
            tx.execute(
                "INSERT INTO config_entries (key, value) VALUES ('k', 'v')",
                [],
            )?;
            Err(StoreError::Database("forced".to_string()))
        });
        assert!(result.is_err());

        let count = db
            .with_conn(|conn| {
                let c: u32 = conn.query_row(
                    "SELECT COUNT(*) FROM config_entries WHERE key = 'k'",
                    [],
                    |row| row.get(0),
                )?;
                Ok(c)
            })
            .unwrap();
        assert_eq!(count, 0);
    }
}
