//! Named system-prompt presets for LLM translation backends.

use chrono::Utc;
use rusqlite::params;
use serde::Serialize;

use super::{Database, StoreError};

#[derive(Debug, Clone, Serialize)]
pub struct PromptPreset {
    pub id: i64,
    pub name: String,
    pub system_prompt: String,
    pub created_at: String,
}

#[derive(Clone)]
pub struct PresetStore {
    db: Database,
}

impl PresetStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn create(&self, name: &str, system_prompt: &str) -> Result<i64, StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO prompt_presets (name, system_prompt, created_at) VALUES (?, ?, ?)",
                params![name, system_prompt, Utc::now().to_rfc3339()],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn update(&self, id: i64, name: &str, system_prompt: &str) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let affected = conn.execute(
                "UPDATE prompt_presets SET name = ?, system_prompt = ? WHERE id = ?",
                params![name, system_prompt, id],
            )?;
            if affected == 0 {
                return Err(StoreError::NotFound(format!("preset {}", id)));
            }
            Ok(())
        })
    }

    pub fn delete(&self, id: i64) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let affected = conn.execute("DELETE FROM prompt_presets WHERE id = ?", params![id])?;
            if affected == 0 {
                return Err(StoreError::NotFound(format!("preset {}", id)));
            }
            Ok(())
        })
    }

    pub fn get(&self, id: i64) -> Result<PromptPreset, StoreError> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT id, name, system_prompt, created_at FROM prompt_presets WHERE id = ?",
                params![id],
                row_to_preset,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    StoreError::NotFound(format!("preset {}", id))
                }
                other => StoreError::from(other),
            })
        })
    }

    pub fn list(&self) -> Result<Vec<PromptPreset>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, system_prompt, created_at FROM prompt_presets ORDER BY id",
            )?;
            let rows = stmt.query_map([], row_to_preset)?;
            let mut presets = Vec::new();
            for row in rows {
                presets.push(row?);
            }
            Ok(presets)
        })
    }
}

fn row_to_preset(row: &rusqlite::Row) -> rusqlite::Result<PromptPreset> {
    Ok(PromptPreset {
        id: row.get(0)?,
        name: row.get(1)?,
        system_prompt: row.get(2)?,
        created_at: row.get(3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_crud() {
        let store = PresetStore::new(Database::in_memory().unwrap());
        let id = store
            .create("casual", "Translate casually, keep honorifics.")
            .unwrap();

        let preset = store.get(id).unwrap();
        assert_eq!(preset.name, "casual");

        store.update(id, "casual-v2", "Keep honorifics.").unwrap();
        assert_eq!(store.get(id).unwrap().name, "casual-v2");

        assert_eq!(store.list().unwrap().len(), 1);

        store.delete(id).unwrap();
        assert!(matches!(store.get(id), Err(StoreError::NotFound(_))));
    }
}
