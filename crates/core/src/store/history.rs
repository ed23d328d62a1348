//! Acquisition history log.

use chrono::Utc;
use rusqlite::params;
use serde::{Deserialize, Serialize};

use super::{Database, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Downloaded,
    Translated,
    Upgraded,
    Transcribed,
    Skipped,
    Failed,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Downloaded => "downloaded",
            Self::Translated => "translated",
            Self::Upgraded => "upgraded",
            Self::Transcribed => "transcribed",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "downloaded" => Self::Downloaded,
            "translated" => Self::Translated,
            "upgraded" => Self::Upgraded,
            "transcribed" => Self::Transcribed,
            "skipped" => Self::Skipped,
            _ => Self::Failed,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub file_path: String,
    pub language: String,
    pub action: HistoryAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct NewHistoryEntry<'a> {
    pub file_path: &'a str,
    pub language: &'a str,
    pub provider: Option<&'a str>,
    pub backend: Option<&'a str>,
    pub score: Option<i64>,
    pub details: Option<&'a str>,
}

#[derive(Clone)]
pub struct HistoryStore {
    db: Database,
}

impl HistoryStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn record(&self, action: HistoryAction, entry: &NewHistoryEntry) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO history (file_path, language, action, provider, backend, score, details, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    entry.file_path,
                    entry.language,
                    action.as_str(),
                    entry.provider,
                    entry.backend,
                    entry.score,
                    entry.details,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    pub fn list(&self, limit: u32, offset: u32) -> Result<Vec<HistoryEntry>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, file_path, language, action, provider, backend, score, details, created_at
                 FROM history ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            )?;
            let rows = stmt.query_map(params![limit, offset], |row| {
                let action: String = row.get(3)?;
                Ok(HistoryEntry {
                    id: row.get(0)?,
                    file_path: row.get(1)?,
                    language: row.get(2)?,
                    action: HistoryAction::parse(&action),
                    provider: row.get(4)?,
                    backend: row.get(5)?,
                    score: row.get(6)?,
                    details: row.get(7)?,
                    created_at: row.get(8)?,
                })
            })?;
            let mut entries = Vec::new();
            for row in rows {
                entries.push(row?);
            }
            Ok(entries)
        })
    }

    pub fn count(&self) -> Result<u64, StoreError> {
        self.db.with_conn(|conn| {
            let count: u64 = conn.query_row("SELECT COUNT(*) FROM history", [], |r| r.get(0))?;
            Ok(count)
        })
    }
}
