//! Blacklisted provider artifacts, excluded from all future searches.

use chrono::Utc;
use rusqlite::params;
use serde::Serialize;

use super::{Database, StoreError};

#[derive(Debug, Clone, Serialize)]
pub struct BlacklistEntry {
    pub id: i64,
    pub provider: String,
    pub content_hash: String,
    pub reason: Option<String>,
    pub created_at: String,
}

#[derive(Clone)]
pub struct BlacklistStore {
    db: Database,
}

impl BlacklistStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn add(
        &self,
        provider: &str,
        content_hash: &str,
        reason: Option<&str>,
    ) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO blacklist (provider, content_hash, reason, created_at)
                 VALUES (?, ?, ?, ?)",
                params![provider, content_hash, reason, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
    }

    pub fn remove(&self, id: i64) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let affected = conn.execute("DELETE FROM blacklist WHERE id = ?", params![id])?;
            if affected == 0 {
                return Err(StoreError::NotFound(format!("blacklist entry {}", id)));
            }
            Ok(())
        })
    }

    pub fn contains(&self, content_hash: &str) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let found: bool = conn
                .query_row(
                    "SELECT 1 FROM blacklist WHERE content_hash = ?",
                    params![content_hash],
                    |_| Ok(true),
                )
                .unwrap_or(false);
            Ok(found)
        })
    }

    pub fn list(&self, limit: u32, offset: u32) -> Result<Vec<BlacklistEntry>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, provider, content_hash, reason, created_at FROM blacklist
                 ORDER BY created_at DESC LIMIT ? OFFSET ?",
            )?;
            let rows = stmt.query_map(params![limit, offset], |row| {
                Ok(BlacklistEntry {
                    id: row.get(0)?,
                    provider: row.get(1)?,
                    content_hash: row.get(2)?,
                    reason: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?;
            let mut entries = Vec::new();
            for row in rows {
                entries.push(row?);
            }
            Ok(entries)
        })
    }
}
