//! Job repository.
//!
//! Jobs are identified by an opaque uuid, persisted together with their
//! request payload, and immutable once terminal.

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};

use super::{Database, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Translate,
    ProviderSearch,
    Batch,
    WantedScan,
    Transcribe,
    Sync,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Translate => "translate",
            Self::ProviderSearch => "provider_search",
            Self::Batch => "batch",
            Self::WantedScan => "wanted_scan",
            Self::Transcribe => "transcribe",
            Self::Sync => "sync",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "translate" => Some(Self::Translate),
            "provider_search" => Some(Self::ProviderSearch),
            "batch" => Some(Self::Batch),
            "wanted_scan" => Some(Self::WantedScan),
            "transcribe" => Some(Self::Transcribe),
            "sync" => Some(Self::Sync),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "running" => Self::Running,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::Queued,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub kind: JobKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct JobStore {
    db: Database,
}

impl JobStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Persist a new queued job and return it.
    pub fn create(
        &self,
        kind: JobKind,
        file_path: Option<&str>,
        request: Option<&serde_json::Value>,
    ) -> Result<Job, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO jobs (id, kind, file_path, status, request_json, created_at)
                 VALUES (?, ?, ?, 'queued', ?, ?)",
                params![
                    &id,
                    kind.as_str(),
                    file_path,
                    request.map(|r| r.to_string()),
                    now.to_rfc3339(),
                ],
            )?;
            Ok(())
        })?;
        Ok(Job {
            id,
            kind,
            file_path: file_path.map(String::from),
            status: JobStatus::Queued,
            request: request.cloned(),
            stats: None,
            error: None,
            created_at: now,
            completed_at: None,
        })
    }

    pub fn mark_running(&self, id: &str) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE jobs SET status = 'running' WHERE id = ? AND status = 'queued'",
                params![id],
            )?;
            Ok(())
        })
    }

    /// Record a terminal status, stats and optional error. Terminal jobs are
    /// never updated again.
    pub fn finish(
        &self,
        id: &str,
        status: JobStatus,
        stats: Option<&serde_json::Value>,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE jobs SET status = ?, stats_json = ?, error = ?, completed_at = ?
                 WHERE id = ? AND status IN ('queued', 'running')",
                params![
                    status.as_str(),
                    stats.map(|s| s.to_string()),
                    error,
                    Utc::now().to_rfc3339(),
                    id,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get(&self, id: &str) -> Result<Job, StoreError> {
        self.db.with_conn(|conn| {
            conn.query_row(
                &format!("{} WHERE id = ?", SELECT_JOB),
                params![id],
                row_to_job,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    StoreError::NotFound(format!("job {}", id))
                }
                other => StoreError::from(other),
            })
        })
    }

    pub fn list(
        &self,
        kind: Option<JobKind>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Job>, StoreError> {
        self.db.with_conn(|conn| {
            let mut jobs = Vec::new();
            match kind {
                Some(k) => {
                    let mut stmt = conn.prepare(&format!(
                        "{} WHERE kind = ? ORDER BY created_at DESC LIMIT ? OFFSET ?",
                        SELECT_JOB
                    ))?;
                    let rows = stmt.query_map(params![k.as_str(), limit, offset], row_to_job)?;
                    for row in rows {
                        jobs.push(row?);
                    }
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "{} ORDER BY created_at DESC LIMIT ? OFFSET ?",
                        SELECT_JOB
                    ))?;
                    let rows = stmt.query_map(params![limit, offset], row_to_job)?;
                    for row in rows {
                        jobs.push(row?);
                    }
                }
            }
            Ok(jobs)
        })
    }

    /// Is a non-terminal job of this kind already present? Scheduled jobs use
    /// this as their reentrancy guard.
    pub fn has_active(&self, kind: JobKind) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let count: u32 = conn.query_row(
                "SELECT COUNT(*) FROM jobs WHERE kind = ? AND status IN ('queued', 'running')",
                params![kind.as_str()],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }
}

const SELECT_JOB: &str = "SELECT id, kind, file_path, status, request_json, \
    stats_json, error, created_at, completed_at FROM jobs";

fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<Job> {
    let kind: String = row.get(1)?;
    let status: String = row.get(3)?;
    let request: Option<String> = row.get(4)?;
    let stats: Option<String> = row.get(5)?;
    let created_at: String = row.get(7)?;
    let completed_at: Option<String> = row.get(8)?;

    Ok(Job {
        id: row.get(0)?,
        kind: JobKind::parse(&kind).unwrap_or(JobKind::Sync),
        file_path: row.get(2)?,
        status: JobStatus::parse(&status),
        request: request.and_then(|r| serde_json::from_str(&r).ok()),
        stats: stats.and_then(|s| serde_json::from_str(&s).ok()),
        error: row.get(6)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        completed_at: completed_at
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> JobStore {
        JobStore::new(Database::in_memory().unwrap())
    }

    #[test]
    fn test_create_and_get() {
        let store = store();
        let request = serde_json::json!({"lines": 10});
        let job = store
            .create(JobKind::Translate, Some("/m/a.mkv"), Some(&request))
            .unwrap();

        let fetched = store.get(&job.id).unwrap();
        assert_eq!(fetched.kind, JobKind::Translate);
        assert_eq!(fetched.status, JobStatus::Queued);
        assert_eq!(fetched.file_path.as_deref(), Some("/m/a.mkv"));
        assert_eq!(fetched.request.unwrap()["lines"], 10);
    }

    #[test]
    fn test_finish_records_stats() {
        let store = store();
        let job = store.create(JobKind::Translate, None, None).unwrap();
        store.mark_running(&job.id).unwrap();

        let stats = serde_json::json!({"avg_quality": 87});
        store
            .finish(&job.id, JobStatus::Completed, Some(&stats), None)
            .unwrap();

        let fetched = store.get(&job.id).unwrap();
        assert_eq!(fetched.status, JobStatus::Completed);
        assert_eq!(fetched.stats.unwrap()["avg_quality"], 87);
        assert!(fetched.completed_at.is_some());
    }

    #[test]
    fn test_terminal_jobs_are_immutable() {
        let store = store();
        let job = store.create(JobKind::Translate, None, None).unwrap();
        store
            .finish(&job.id, JobStatus::Failed, None, Some("boom"))
            .unwrap();

        // A second finish must not overwrite the terminal state
        store
            .finish(&job.id, JobStatus::Completed, None, None)
            .unwrap();

        let fetched = store.get(&job.id).unwrap();
        assert_eq!(fetched.status, JobStatus::Failed);
        assert_eq!(fetched.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_has_active_guard() {
        let store = store();
        assert!(!store.has_active(JobKind::WantedScan).unwrap());

        let job = store.create(JobKind::WantedScan, None, None).unwrap();
        assert!(store.has_active(JobKind::WantedScan).unwrap());
        assert!(!store.has_active(JobKind::Translate).unwrap());

        store
            .finish(&job.id, JobStatus::Completed, None, None)
            .unwrap();
        assert!(!store.has_active(JobKind::WantedScan).unwrap());
    }

    #[test]
    fn test_list_filtered() {
        let store = store();
        store.create(JobKind::Translate, None, None).unwrap();
        store.create(JobKind::WantedScan, None, None).unwrap();

        let all = store.list(None, 100, 0).unwrap();
        assert_eq!(all.len(), 2);

        let scans = store.list(Some(JobKind::WantedScan), 100, 0).unwrap();
        assert_eq!(scans.len(), 1);
        assert_eq!(scans[0].kind, JobKind::WantedScan);
    }

    #[test]
    fn test_get_missing() {
        let store = store();
        assert!(matches!(
            store.get("nope"),
            Err(StoreError::NotFound(_))
        ));
    }
}
