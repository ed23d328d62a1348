//! Ordered, idempotent schema migrations.
//!
//! Each migration runs once, inside its own transaction, and is recorded in
//! `schema_migrations` by name. New migrations are appended; applied ones are
//! never edited.

use rusqlite::Connection;

use super::StoreError;

/// (name, batch of DDL statements)
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "0001_wanted_items",
        r#"
        CREATE TABLE wanted_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            file_path TEXT NOT NULL,
            target_language TEXT NOT NULL,
            subtitle_type TEXT NOT NULL DEFAULT 'full',
            source_language TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            existing_sub TEXT NOT NULL DEFAULT 'none',
            attempts INTEGER NOT NULL DEFAULT 0,
            title TEXT NOT NULL,
            season INTEGER,
            episode INTEGER,
            absolute_episode INTEGER,
            year INTEGER,
            is_episode INTEGER NOT NULL DEFAULT 1,
            profile_id INTEGER,
            series_id INTEGER,
            result_path TEXT,
            result_hash TEXT,
            error TEXT,
            file_added_at TEXT,
            last_search_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(file_path, target_language, subtitle_type)
        );

        CREATE INDEX idx_wanted_status ON wanted_items(status);
        CREATE INDEX idx_wanted_file ON wanted_items(file_path);
        "#,
    ),
    (
        "0002_jobs",
        r#"
        CREATE TABLE jobs (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            file_path TEXT,
            status TEXT NOT NULL DEFAULT 'queued',
            request_json TEXT,
            stats_json TEXT,
            error TEXT,
            created_at TEXT NOT NULL,
            completed_at TEXT
        );

        CREATE INDEX idx_jobs_kind ON jobs(kind);
        CREATE INDEX idx_jobs_status ON jobs(status);
        "#,
    ),
    (
        "0003_library",
        r#"
        CREATE TABLE series (
            id INTEGER NOT NULL,
            instance TEXT NOT NULL,
            title TEXT NOT NULL,
            path TEXT NOT NULL,
            tags TEXT NOT NULL DEFAULT '[]',
            profile_id INTEGER,
            last_info_sync TEXT,
            PRIMARY KEY (instance, id)
        );

        CREATE TABLE episodes (
            id INTEGER NOT NULL,
            instance TEXT NOT NULL,
            series_id INTEGER NOT NULL,
            season INTEGER NOT NULL,
            episode INTEGER NOT NULL,
            file_path TEXT NOT NULL,
            last_seen_at TEXT NOT NULL,
            PRIMARY KEY (instance, id)
        );

        CREATE INDEX idx_episodes_series ON episodes(instance, series_id);
        CREATE INDEX idx_episodes_path ON episodes(file_path);

        CREATE TABLE movies (
            id INTEGER NOT NULL,
            instance TEXT NOT NULL,
            title TEXT NOT NULL,
            file_path TEXT NOT NULL,
            tags TEXT NOT NULL DEFAULT '[]',
            profile_id INTEGER,
            year INTEGER,
            date_added TEXT,
            last_seen_at TEXT NOT NULL,
            PRIMARY KEY (instance, id)
        );

        CREATE INDEX idx_movies_path ON movies(file_path);
        "#,
    ),
    (
        "0004_language_profiles",
        r#"
        CREATE TABLE language_profiles (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            source_language TEXT NOT NULL,
            target_languages TEXT NOT NULL,
            forced_preference TEXT NOT NULL DEFAULT 'disabled',
            backend_chain TEXT,
            is_default INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE profile_assignments (
            kind TEXT NOT NULL,
            external_id INTEGER NOT NULL,
            instance TEXT NOT NULL,
            profile_id INTEGER NOT NULL REFERENCES language_profiles(id) ON DELETE CASCADE,
            PRIMARY KEY (kind, instance, external_id)
        );
        "#,
    ),
    (
        "0005_provider_cache",
        r#"
        CREATE TABLE provider_cache (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            expires_at TEXT NOT NULL
        );

        CREATE INDEX idx_provider_cache_expires ON provider_cache(expires_at);
        "#,
    ),
    (
        "0006_translation_memory",
        r#"
        CREATE TABLE translation_memory (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_language TEXT NOT NULL,
            target_language TEXT NOT NULL,
            normalized_source TEXT NOT NULL,
            translated_text TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE(source_language, target_language, normalized_source)
        );

        CREATE INDEX idx_tm_langs ON translation_memory(source_language, target_language);
        "#,
    ),
    (
        "0007_glossary_blacklist",
        r#"
        CREATE TABLE glossary (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_term TEXT NOT NULL,
            target_term TEXT NOT NULL,
            scope TEXT NOT NULL DEFAULT 'global',
            UNIQUE(source_term, scope)
        );

        CREATE TABLE blacklist (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            provider TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            reason TEXT,
            created_at TEXT NOT NULL,
            UNIQUE(provider, content_hash)
        );
        "#,
    ),
    (
        "0008_hooks_webhooks",
        r#"
        CREATE TABLE hook_configs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_name TEXT NOT NULL,
            enabled INTEGER NOT NULL DEFAULT 1,
            script_path TEXT NOT NULL,
            timeout_secs INTEGER NOT NULL DEFAULT 30
        );

        CREATE TABLE webhook_configs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_name TEXT NOT NULL,
            enabled INTEGER NOT NULL DEFAULT 1,
            url TEXT NOT NULL,
            secret TEXT,
            retry_count INTEGER NOT NULL DEFAULT 3,
            consecutive_failures INTEGER NOT NULL DEFAULT 0,
            auto_disabled INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE hook_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            hook_id INTEGER NOT NULL,
            event_name TEXT NOT NULL,
            exit_code INTEGER,
            stdout TEXT,
            stderr TEXT,
            duration_ms INTEGER NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX idx_hook_log_hook ON hook_log(hook_id);
        "#,
    ),
    (
        "0009_scoring",
        r#"
        CREATE TABLE scoring_weights (
            score_type TEXT NOT NULL,
            weight_key TEXT NOT NULL,
            weight_value INTEGER NOT NULL,
            PRIMARY KEY (score_type, weight_key)
        );

        CREATE TABLE provider_score_modifiers (
            provider_name TEXT PRIMARY KEY,
            modifier INTEGER NOT NULL
        );
        "#,
    ),
    (
        "0010_config_entries",
        r#"
        CREATE TABLE config_entries (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        "#,
    ),
    (
        "0011_history",
        r#"
        CREATE TABLE history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            file_path TEXT NOT NULL,
            language TEXT NOT NULL,
            action TEXT NOT NULL,
            provider TEXT,
            backend TEXT,
            score INTEGER,
            details TEXT,
            created_at TEXT NOT NULL
        );

        CREATE INDEX idx_history_file ON history(file_path);
        CREATE INDEX idx_history_created ON history(created_at);
        "#,
    ),
    (
        "0012_prompt_presets",
        r#"
        CREATE TABLE prompt_presets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            system_prompt TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        "#,
    ),
];

/// Apply all pending migrations in order.
pub fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL
        );",
    )
    .map_err(|e| StoreError::Migration(e.to_string()))?;

    for (name, sql) in MIGRATIONS {
        let applied: bool = conn
            .query_row(
                "SELECT 1 FROM schema_migrations WHERE name = ?",
                [name],
                |_| Ok(true),
            )
            .unwrap_or(false);
        if applied {
            continue;
        }

        conn.execute_batch(&format!("BEGIN;\n{}\nCOMMIT;", sql))
            .map_err(|e| StoreError::Migration(format!("{}: {}", name, e)))?;
        conn.execute(
            "INSERT INTO schema_migrations (name, applied_at) VALUES (?, ?)",
            rusqlite::params![name, chrono::Utc::now().to_rfc3339()],
        )
        .map_err(|e| StoreError::Migration(format!("{}: {}", name, e)))?;
        tracing::debug!(migration = name, "Applied migration");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_apply_once() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count as usize, MIGRATIONS.len());

        // Second run is a no-op
        run_migrations(&conn).unwrap();
        let count2: u32 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, count2);
    }

    #[test]
    fn test_migration_names_are_ordered_and_unique() {
        let mut names: Vec<&str> = MIGRATIONS.iter().map(|(n, _)| *n).collect();
        let original = names.clone();
        names.sort();
        names.dedup();
        assert_eq!(names, original);
    }
}
