//! Hook and webhook subscriber configuration, plus the hook execution log.

use chrono::Utc;
use rusqlite::params;
use serde::{Deserialize, Serialize};

use super::{Database, StoreError};

/// Captured stdout/stderr are truncated to this many bytes before storage.
pub const HOOK_OUTPUT_CAP: usize = 4096;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookConfig {
    pub id: i64,
    pub event_name: String,
    pub enabled: bool,
    pub script_path: String,
    pub timeout_secs: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewHookConfig {
    pub event_name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub script_path: String,
    #[serde(default = "default_hook_timeout")]
    pub timeout_secs: u32,
}

fn default_true() -> bool {
    true
}

fn default_hook_timeout() -> u32 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub id: i64,
    pub event_name: String,
    pub enabled: bool,
    pub url: String,
    #[serde(skip_serializing)]
    pub secret: Option<String>,
    pub retry_count: u32,
    pub consecutive_failures: u32,
    pub auto_disabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewWebhookConfig {
    pub event_name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub url: String,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
}

fn default_retry_count() -> u32 {
    3
}

#[derive(Debug, Clone, Serialize)]
pub struct HookLogEntry {
    pub id: i64,
    pub hook_id: i64,
    pub event_name: String,
    pub exit_code: Option<i32>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub duration_ms: u64,
    pub created_at: String,
}

#[derive(Clone)]
pub struct HookStore {
    db: Database,
}

impl HookStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    // --- shell hooks -----------------------------------------------------

    pub fn create_hook(&self, hook: &NewHookConfig) -> Result<i64, StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO hook_configs (event_name, enabled, script_path, timeout_secs)
                 VALUES (?, ?, ?, ?)",
                params![
                    &hook.event_name,
                    hook.enabled as i32,
                    &hook.script_path,
                    hook.timeout_secs,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn delete_hook(&self, id: i64) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let affected = conn.execute("DELETE FROM hook_configs WHERE id = ?", params![id])?;
            if affected == 0 {
                return Err(StoreError::NotFound(format!("hook {}", id)));
            }
            Ok(())
        })
    }

    pub fn set_hook_enabled(&self, id: i64, enabled: bool) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE hook_configs SET enabled = ? WHERE id = ?",
                params![enabled as i32, id],
            )?;
            Ok(())
        })
    }

    pub fn list_hooks(&self) -> Result<Vec<HookConfig>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, event_name, enabled, script_path, timeout_secs
                 FROM hook_configs ORDER BY id",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(HookConfig {
                    id: row.get(0)?,
                    event_name: row.get(1)?,
                    enabled: row.get::<_, i32>(2)? != 0,
                    script_path: row.get(3)?,
                    timeout_secs: row.get(4)?,
                })
            })?;
            let mut hooks = Vec::new();
            for row in rows {
                hooks.push(row?);
            }
            Ok(hooks)
        })
    }

    /// Enabled hooks subscribed to the given event.
    pub fn hooks_for_event(&self, event_name: &str) -> Result<Vec<HookConfig>, StoreError> {
        Ok(self
            .list_hooks()?
            .into_iter()
            .filter(|h| h.enabled && h.event_name == event_name)
            .collect())
    }

    // --- webhooks --------------------------------------------------------

    pub fn create_webhook(&self, webhook: &NewWebhookConfig) -> Result<i64, StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO webhook_configs (event_name, enabled, url, secret, retry_count)
                 VALUES (?, ?, ?, ?, ?)",
                params![
                    &webhook.event_name,
                    webhook.enabled as i32,
                    &webhook.url,
                    &webhook.secret,
                    webhook.retry_count,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn delete_webhook(&self, id: i64) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let affected =
                conn.execute("DELETE FROM webhook_configs WHERE id = ?", params![id])?;
            if affected == 0 {
                return Err(StoreError::NotFound(format!("webhook {}", id)));
            }
            Ok(())
        })
    }

    pub fn list_webhooks(&self) -> Result<Vec<WebhookConfig>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, event_name, enabled, url, secret, retry_count,
                        consecutive_failures, auto_disabled
                 FROM webhook_configs ORDER BY id",
            )?;
            let rows = stmt.query_map([], row_to_webhook)?;
            let mut webhooks = Vec::new();
            for row in rows {
                webhooks.push(row?);
            }
            Ok(webhooks)
        })
    }

    /// Enabled, not auto-disabled webhooks subscribed to the given event.
    pub fn webhooks_for_event(&self, event_name: &str) -> Result<Vec<WebhookConfig>, StoreError> {
        Ok(self
            .list_webhooks()?
            .into_iter()
            .filter(|w| w.enabled && !w.auto_disabled && w.event_name == event_name)
            .collect())
    }

    /// Record a delivery outcome. After 10 consecutive failures the webhook
    /// is auto-disabled; any success resets the counter.
    pub fn record_webhook_result(&self, id: i64, success: bool) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            if success {
                conn.execute(
                    "UPDATE webhook_configs SET consecutive_failures = 0 WHERE id = ?",
                    params![id],
                )?;
                Ok(false)
            } else {
                conn.execute(
                    "UPDATE webhook_configs
                     SET consecutive_failures = consecutive_failures + 1,
                         auto_disabled = CASE WHEN consecutive_failures + 1 >= 10 THEN 1 ELSE auto_disabled END
                     WHERE id = ?",
                    params![id],
                )?;
                let disabled: bool = conn.query_row(
                    "SELECT auto_disabled FROM webhook_configs WHERE id = ?",
                    params![id],
                    |row| row.get::<_, i32>(0).map(|v| v != 0),
                )?;
                Ok(disabled)
            }
        })
    }

    pub fn reenable_webhook(&self, id: i64) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE webhook_configs SET auto_disabled = 0, consecutive_failures = 0 WHERE id = ?",
                params![id],
            )?;
            Ok(())
        })
    }

    // --- hook execution log ----------------------------------------------

    pub fn log_execution(
        &self,
        hook_id: i64,
        event_name: &str,
        exit_code: Option<i32>,
        stdout: &str,
        stderr: &str,
        duration_ms: u64,
    ) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO hook_log (hook_id, event_name, exit_code, stdout, stderr, duration_ms, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                params![
                    hook_id,
                    event_name,
                    exit_code,
                    truncate_output(stdout),
                    truncate_output(stderr),
                    duration_ms,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    pub fn list_log(&self, limit: u32, offset: u32) -> Result<Vec<HookLogEntry>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, hook_id, event_name, exit_code, stdout, stderr, duration_ms, created_at
                 FROM hook_log ORDER BY id DESC LIMIT ? OFFSET ?",
            )?;
            let rows = stmt.query_map(params![limit, offset], |row| {
                Ok(HookLogEntry {
                    id: row.get(0)?,
                    hook_id: row.get(1)?,
                    event_name: row.get(2)?,
                    exit_code: row.get(3)?,
                    stdout: row.get(4)?,
                    stderr: row.get(5)?,
                    duration_ms: row.get(6)?,
                    created_at: row.get(7)?,
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

fn row_to_webhook(row: &rusqlite::Row) -> rusqlite::Result<WebhookConfig> {
    Ok(WebhookConfig {
        id: row.get(0)?,
        event_name: row.get(1)?,
        enabled: row.get::<_, i32>(2)? != 0,
        url: row.get(3)?,
        secret: row.get(4)?,
        retry_count: row.get(5)?,
        consecutive_failures: row.get(6)?,
        auto_disabled: row.get::<_, i32>(7)? != 0,
    })
}

fn truncate_output(s: &str) -> String {
    if s.len() <= HOOK_OUTPUT_CAP {
        return s.to_string();
    }
    let mut end = HOOK_OUTPUT_CAP;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> HookStore {
        HookStore::new(Database::in_memory().unwrap())
    }

    #[test]
    fn test_hooks_for_event_filters() {
        let hooks = store();
        let a = hooks
            .create_hook(&NewHookConfig {
                event_name: "subtitle_downloaded".to_string(),
                enabled: true,
                script_path: "/opt/notify.sh".to_string(),
                timeout_secs: 30,
            })
            .unwrap();
        hooks
            .create_hook(&NewHookConfig {
                event_name: "translation_complete".to_string(),
                enabled: true,
                script_path: "/opt/other.sh".to_string(),
                timeout_secs: 30,
            })
            .unwrap();

        let matching = hooks.hooks_for_event("subtitle_downloaded").unwrap();
        assert_eq!(matching.len(), 1);
        assert_eq!(matching[0].id, a);

        hooks.set_hook_enabled(a, false).unwrap();
        assert!(hooks.hooks_for_event("subtitle_downloaded").unwrap().is_empty());
    }

    #[test]
    fn test_webhook_auto_disable_after_ten_failures() {
        let hooks = store();
        let id = hooks
            .create_webhook(&NewWebhookConfig {
                event_name: "subtitle_downloaded".to_string(),
                enabled: true,
                url: "http://example.test/hook".to_string(),
                secret: Some("s3cret".to_string()),
                retry_count: 3,
            })
            .unwrap();

        for i in 0..9 {
            let disabled = hooks.record_webhook_result(id, false).unwrap();
            assert!(!disabled, "should not be disabled at failure {}", i + 1);
        }
        let disabled = hooks.record_webhook_result(id, false).unwrap();
        assert!(disabled);

        assert!(hooks.webhooks_for_event("subtitle_downloaded").unwrap().is_empty());

        hooks.reenable_webhook(id).unwrap();
        assert_eq!(hooks.webhooks_for_event("subtitle_downloaded").unwrap().len(), 1);
    }

    #[test]
    fn test_webhook_success_resets_counter() {
        let hooks = store();
        let id = hooks
            .create_webhook(&NewWebhookConfig {
                event_name: "e".to_string(),
                enabled: true,
                url: "http://example.test".to_string(),
                secret: None,
                retry_count: 3,
            })
            .unwrap();

        for _ in 0..5 {
            hooks.record_webhook_result(id, false).unwrap();
        }
        hooks.record_webhook_result(id, true).unwrap();

        let webhook = &hooks.list_webhooks().unwrap()[0];
        assert_eq!(webhook.consecutive_failures, 0);
        assert!(!webhook.auto_disabled);
    }

    #[test]
    fn test_hook_log_caps_output() {
        let hooks = store();
        let id = hooks
            .create_hook(&NewHookConfig {
                event_name: "e".to_string(),
                enabled: true,
                script_path: "/opt/x.sh".to_string(),
                timeout_secs: 5,
            })
            .unwrap();

        let huge = "x".repeat(HOOK_OUTPUT_CAP * 2);
        hooks
            .log_execution(id, "e", Some(0), &huge, "", 12)
            .unwrap();

        let log = hooks.list_log(10, 0).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].stdout.as_ref().unwrap().len(), HOOK_OUTPUT_CAP);
        assert_eq!(log[0].exit_code, Some(0));
    }

    #[test]
    fn test_webhook_secret_not_serialized() {
        let hooks = store();
        hooks
            .create_webhook(&NewWebhookConfig {
                event_name: "e".to_string(),
                enabled: true,
                url: "http://example.test".to_string(),
                secret: Some("hidden".to_string()),
                retry_count: 3,
            })
            .unwrap();
        let webhook = &hooks.list_webhooks().unwrap()[0];
        let json = serde_json::to_string(webhook).unwrap();
        assert!(!json.contains("hidden"));
    }
}
