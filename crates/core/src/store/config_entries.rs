//! Key/value configuration overrides.
//!
//! Reads merge environment defaults with stored overrides; overrides win.
//! Legacy single-object integration values migrate to the JSON-array schema
//! on first read.

use std::collections::HashMap;

use rusqlite::params;

use super::{Database, StoreError};

#[derive(Clone)]
pub struct ConfigEntriesStore {
    db: Database,
}

impl ConfigEntriesStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT value FROM config_entries WHERE key = ?",
                params![key],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(StoreError::from(other)),
            })
        })
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO config_entries (key, value) VALUES (?, ?)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )?;
            Ok(())
        })
    }

    pub fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute("DELETE FROM config_entries WHERE key = ?", params![key])?;
            Ok(())
        })
    }

    pub fn all(&self) -> Result<HashMap<String, String>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT key, value FROM config_entries")?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            let mut map = HashMap::new();
            for row in rows {
                let (k, v): (String, String) = row?;
                map.insert(k, v);
            }
            Ok(map)
        })
    }

    /// Merge supplied defaults with stored overrides; overrides win.
    pub fn merged(
        &self,
        defaults: &HashMap<String, String>,
    ) -> Result<HashMap<String, String>, StoreError> {
        let mut merged = defaults.clone();
        for (k, v) in self.all()? {
            merged.insert(k, v);
        }
        Ok(merged)
    }

    /// Read an integration list (e.g. "sonarr_instances"), migrating a legacy
    /// single-object value to the array schema in place.
    pub fn get_integration_list(
        &self,
        key: &str,
    ) -> Result<Vec<serde_json::Value>, StoreError> {
        let raw = match self.get(key)? {
            Some(raw) => raw,
            None => return Ok(Vec::new()),
        };

        match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(serde_json::Value::Array(items)) => Ok(items),
            Ok(obj @ serde_json::Value::Object(_)) => {
                // Legacy single-instance schema: wrap and persist
                let migrated = serde_json::Value::Array(vec![obj]);
                self.set(key, &migrated.to_string())?;
                tracing::info!(key, "Migrated legacy integration setting to array schema");
                match migrated {
                    serde_json::Value::Array(items) => Ok(items),
                    _ => unreachable!(),
                }
            }
            _ => Ok(Vec::new()),
        }
    }
}
