//! Wanted-item repository.
//!
//! A wanted item declares that `(file_path, target_language, subtitle_type)`
//! is missing on disk and should be acquired. The unique index on that tuple
//! is the identity invariant; the claim operation serializes processing so at
//! most one worker owns an item at a time.

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};

use super::{Database, StoreError};

/// Full subtitle vs. forced/signs-only track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtitleType {
    Full,
    Forced,
}

impl SubtitleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Forced => "forced",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "forced" => Self::Forced,
            _ => Self::Full,
        }
    }
}

/// Processing status automaton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WantedStatus {
    Pending,
    Searching,
    Downloading,
    Translating,
    Transcribing,
    Completed,
    Failed,
}

impl WantedStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Searching => "searching",
            Self::Downloading => "downloading",
            Self::Translating => "translating",
            Self::Transcribing => "transcribing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "searching" => Self::Searching,
            "downloading" => Self::Downloading,
            "translating" => Self::Translating,
            "transcribing" => Self::Transcribing,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Best subtitle already present for the target, recorded at scan time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExistingSub {
    None,
    EmbeddedAss,
    EmbeddedSrt,
    ExternalSrt,
    ExternalAss,
}

impl ExistingSub {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::EmbeddedAss => "embedded_ass",
            Self::EmbeddedSrt => "embedded_srt",
            Self::ExternalSrt => "external_srt",
            Self::ExternalAss => "external_ass",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "embedded_ass" => Self::EmbeddedAss,
            "embedded_srt" => Self::EmbeddedSrt,
            "external_srt" => Self::ExternalSrt,
            "external_ass" => Self::ExternalAss,
            _ => Self::None,
        }
    }
}

/// A wanted subtitle, with enough video metadata to search providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WantedItem {
    pub id: i64,
    pub file_path: String,
    pub target_language: String,
    pub subtitle_type: SubtitleType,
    pub source_language: String,
    pub status: WantedStatus,
    pub existing_sub: ExistingSub,
    pub attempts: u32,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub season: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub absolute_episode: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<u32>,
    pub is_episode: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<i64>,
    /// Library series id, for series-scoped glossary terms.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_added_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_search_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields the scanner supplies when upserting an item.
#[derive(Debug, Clone)]
pub struct NewWantedItem {
    pub file_path: String,
    pub target_language: String,
    pub subtitle_type: SubtitleType,
    pub source_language: String,
    pub existing_sub: ExistingSub,
    pub title: String,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    pub absolute_episode: Option<u32>,
    pub year: Option<u32>,
    pub is_episode: bool,
    pub profile_id: Option<i64>,
    pub series_id: Option<i64>,
    pub file_added_at: Option<DateTime<Utc>>,
}

/// Counts per status for the summary endpoint.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WantedSummary {
    pub total: u64,
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
}

/// Wanted-item repository.
#[derive(Clone)]
pub struct WantedStore {
    db: Database,
}

impl WantedStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert or refresh an item. Returns `(id, newly_created)`.
    ///
    /// An existing row keeps its status and attempt count; only the scan
    /// metadata (existing_sub, video fields, profile) is refreshed. Terminal
    /// `failed` rows are reset to `pending` so a rescan retries them.
    pub fn upsert(&self, item: &NewWantedItem) -> Result<(i64, bool), StoreError> {
        self.db.with_conn(|conn| {
            let now = Utc::now().to_rfc3339();

            let existing: Option<(i64, String)> = conn
                .query_row(
                    "SELECT id, status FROM wanted_items
                     WHERE file_path = ? AND target_language = ? AND subtitle_type = ?",
                    params![
                        &item.file_path,
                        &item.target_language,
                        item.subtitle_type.as_str()
                    ],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(StoreError::from(other)),
                })?;

            if let Some((id, status)) = existing {
                let reset_failed = status == "failed";
                conn.execute(
                    "UPDATE wanted_items SET
                        existing_sub = ?, title = ?, season = ?, episode = ?,
                        absolute_episode = ?, year = ?, is_episode = ?, profile_id = ?,
                        series_id = ?, file_added_at = ?, source_language = ?,
                        status = CASE WHEN status = 'failed' THEN 'pending' ELSE status END,
                        attempts = CASE WHEN status = 'failed' THEN 0 ELSE attempts END,
                        updated_at = ?
                     WHERE id = ?",
                    params![
                        item.existing_sub.as_str(),
                        &item.title,
                        item.season,
                        item.episode,
                        item.absolute_episode,
                        item.year,
                        item.is_episode as i32,
                        item.profile_id,
                        item.series_id,
                        item.file_added_at.map(|t| t.to_rfc3339()),
                        &item.source_language,
                        &now,
                        id,
                    ],
                )?;
                if reset_failed {
                    tracing::debug!(id, "Reset failed wanted item to pending");
                }
                Ok((id, false))
            } else {
                conn.execute(
                    "INSERT INTO wanted_items (
                        file_path, target_language, subtitle_type, source_language,
                        status, existing_sub, attempts, title, season, episode,
                        absolute_episode, year, is_episode, profile_id, series_id,
                        file_added_at, created_at, updated_at
                     ) VALUES (?, ?, ?, ?, 'pending', ?, 0, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        &item.file_path,
                        &item.target_language,
                        item.subtitle_type.as_str(),
                        &item.source_language,
                        item.existing_sub.as_str(),
                        &item.title,
                        item.season,
                        item.episode,
                        item.absolute_episode,
                        item.year,
                        item.is_episode as i32,
                        item.profile_id,
                        item.series_id,
                        item.file_added_at.map(|t| t.to_rfc3339()),
                        &now,
                        &now,
                    ],
                )?;
                Ok((conn.last_insert_rowid(), true))
            }
        })
    }

    pub fn get(&self, id: i64) -> Result<WantedItem, StoreError> {
        self.db.with_conn(|conn| {
            conn.query_row(
                &format!("{} WHERE id = ?", SELECT_ITEM),
                params![id],
                row_to_item,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    StoreError::NotFound(format!("wanted item {}", id))
                }
                other => StoreError::from(other),
            })
        })
    }

    /// List items, optionally filtered by status, newest first.
    pub fn list(
        &self,
        status: Option<WantedStatus>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<WantedItem>, StoreError> {
        self.db.with_conn(|conn| {
            let mut items = Vec::new();
            match status {
                Some(s) => {
                    let mut stmt = conn.prepare(&format!(
                        "{} WHERE status = ? ORDER BY updated_at DESC LIMIT ? OFFSET ?",
                        SELECT_ITEM
                    ))?;
                    let rows = stmt.query_map(params![s.as_str(), limit, offset], row_to_item)?;
                    for row in rows {
                        items.push(row?);
                    }
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "{} ORDER BY updated_at DESC LIMIT ? OFFSET ?",
                        SELECT_ITEM
                    ))?;
                    let rows = stmt.query_map(params![limit, offset], row_to_item)?;
                    for row in rows {
                        items.push(row?);
                    }
                }
            }
            Ok(items)
        })
    }

    /// All pending items for a particular file (used by targeted rescans).
    pub fn list_for_file(&self, file_path: &str) -> Result<Vec<WantedItem>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("{} WHERE file_path = ?", SELECT_ITEM))?;
            let rows = stmt.query_map(params![file_path], row_to_item)?;
            let mut items = Vec::new();
            for row in rows {
                items.push(row?);
            }
            Ok(items)
        })
    }

    /// Atomically claim a pending item for processing.
    ///
    /// Returns false when another worker got there first (or the item left
    /// the pending state). The affected-row check is the ownership gate.
    pub fn claim(&self, id: i64) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let affected = conn.execute(
                "UPDATE wanted_items
                 SET status = 'searching', attempts = attempts + 1,
                     last_search_at = ?, updated_at = ?
                 WHERE id = ? AND status = 'pending'",
                params![Utc::now().to_rfc3339(), Utc::now().to_rfc3339(), id],
            )?;
            Ok(affected == 1)
        })
    }

    /// Move an in-flight item to another non-terminal status.
    pub fn set_status(&self, id: i64, status: WantedStatus) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE wanted_items SET status = ?, updated_at = ? WHERE id = ?",
                params![status.as_str(), Utc::now().to_rfc3339(), id],
            )?;
            Ok(())
        })
    }

    /// Terminal success: record the produced file and its content hash.
    pub fn complete(
        &self,
        id: i64,
        result_path: &str,
        result_hash: &str,
    ) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE wanted_items
                 SET status = 'completed', result_path = ?, result_hash = ?,
                     error = NULL, updated_at = ?
                 WHERE id = ?",
                params![result_path, result_hash, Utc::now().to_rfc3339(), id],
            )?;
            Ok(())
        })
    }

    /// Terminal failure with a structured reason.
    pub fn fail(&self, id: i64, error: &str) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE wanted_items
                 SET status = 'failed', error = ?, updated_at = ?
                 WHERE id = ?",
                params![error, Utc::now().to_rfc3339(), id],
            )?;
            Ok(())
        })
    }

    /// Put an item that did not reach a terminal state back to pending.
    pub fn release(&self, id: i64) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE wanted_items SET status = 'pending', updated_at = ?
                 WHERE id = ? AND status NOT IN ('completed', 'failed')",
                params![Utc::now().to_rfc3339(), id],
            )?;
            Ok(())
        })
    }

    pub fn summary(&self) -> Result<WantedSummary, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT status, COUNT(*) FROM wanted_items GROUP BY status")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
            })?;

            let mut summary = WantedSummary::default();
            for row in rows {
                let (status, count) = row?;
                summary.total += count;
                match status.as_str() {
                    "pending" => summary.pending += count,
                    "completed" => summary.completed += count,
                    "failed" => summary.failed += count,
                    _ => summary.processing += count,
                }
            }
            Ok(summary)
        })
    }

    /// Remove items whose source file is not in the given set.
    ///
    /// Only the full scan calls this; incremental scans never clean up.
    pub fn cleanup_missing(&self, known_files: &[String]) -> Result<u64, StoreError> {
        self.db.with_tx(|tx| {
            tx.execute("CREATE TEMP TABLE IF NOT EXISTS known_files (path TEXT PRIMARY KEY)", [])?;
            tx.execute("DELETE FROM known_files", [])?;
            {
                let mut stmt =
                    tx.prepare("INSERT OR IGNORE INTO known_files (path) VALUES (?)")?;
                for file in known_files {
                    stmt.execute(params![file])?;
                }
            }
            let removed = tx.execute(
                "DELETE FROM wanted_items
                 WHERE file_path NOT IN (SELECT path FROM known_files)",
                [],
            )?;
            tx.execute("DELETE FROM known_files", [])?;
            Ok(removed as u64)
        })
    }

    /// Daily upgrade scan: completed items that ended up with an SRT target
    /// and are still inside the upgrade window go back to pending so Case B
    /// gets another look.
    pub fn requeue_upgradeable(&self, window_days: u32) -> Result<u64, StoreError> {
        let cutoff = (Utc::now() - chrono::Duration::days(window_days as i64)).to_rfc3339();
        self.db.with_conn(|conn| {
            let affected = conn.execute(
                "UPDATE wanted_items
                 SET status = 'pending', updated_at = ?
                 WHERE status = 'completed'
                   AND subtitle_type = 'full'
                   AND result_path LIKE '%.srt'
                   AND file_added_at IS NOT NULL
                   AND file_added_at >= ?",
                params![Utc::now().to_rfc3339(), cutoff],
            )?;
            Ok(affected as u64)
        })
    }

    pub fn delete(&self, id: i64) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let affected = conn.execute("DELETE FROM wanted_items WHERE id = ?", params![id])?;
            if affected == 0 {
                return Err(StoreError::NotFound(format!("wanted item {}", id)));
            }
            Ok(())
        })
    }
}

const SELECT_ITEM: &str = "SELECT id, file_path, target_language, subtitle_type, \
    source_language, status, existing_sub, attempts, title, season, episode, \
    absolute_episode, year, is_episode, profile_id, series_id, result_path, \
    result_hash, error, file_added_at, last_search_at, created_at, updated_at \
    FROM wanted_items";

fn parse_ts(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn row_to_item(row: &rusqlite::Row) -> rusqlite::Result<WantedItem> {
    let subtitle_type: String = row.get(3)?;
    let status: String = row.get(5)?;
    let existing_sub: String = row.get(6)?;
    let created_at: String = row.get(21)?;
    let updated_at: String = row.get(22)?;

    Ok(WantedItem {
        id: row.get(0)?,
        file_path: row.get(1)?,
        target_language: row.get(2)?,
        subtitle_type: SubtitleType::parse(&subtitle_type),
        source_language: row.get(4)?,
        status: WantedStatus::parse(&status),
        existing_sub: ExistingSub::parse(&existing_sub),
        attempts: row.get(7)?,
        title: row.get(8)?,
        season: row.get(9)?,
        episode: row.get(10)?,
        absolute_episode: row.get(11)?,
        year: row.get(12)?,
        is_episode: row.get::<_, i32>(13)? != 0,
        profile_id: row.get(14)?,
        series_id: row.get(15)?,
        result_path: row.get(16)?,
        result_hash: row.get(17)?,
        error: row.get(18)?,
        file_added_at: parse_ts(row.get(19)?),
        last_search_at: parse_ts(row.get(20)?),
        created_at: parse_ts(Some(created_at)).unwrap_or_else(Utc::now),
        updated_at: parse_ts(Some(updated_at)).unwrap_or_else(Utc::now),
    })
}
