//! Glossary terms injected into translation prompts.

use rusqlite::params;
use serde::{Deserialize, Serialize};

use super::{Database, StoreError};

/// Scope a glossary term applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "series_id")]
pub enum GlossaryScope {
    Global,
    Series(i64),
}

impl GlossaryScope {
    pub fn as_str(&self) -> String {
        match self {
            Self::Global => "global".to_string(),
            Self::Series(id) => format!("series:{}", id),
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.strip_prefix("series:") {
            Some(id) => id
                .parse()
                .map(Self::Series)
                .unwrap_or(Self::Global),
            None => Self::Global,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GlossaryEntry {
    pub id: i64,
    pub source_term: String,
    pub target_term: String,
    pub scope: GlossaryScope,
}

#[derive(Clone)]
pub struct GlossaryStore {
    db: Database,
}

impl GlossaryStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn add(
        &self,
        source_term: &str,
        target_term: &str,
        scope: &GlossaryScope,
    ) -> Result<i64, StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO glossary (source_term, target_term, scope) VALUES (?, ?, ?)
                 ON CONFLICT(source_term, scope) DO UPDATE SET target_term = excluded.target_term",
                params![source_term, target_term, scope.as_str()],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn remove(&self, id: i64) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let affected = conn.execute("DELETE FROM glossary WHERE id = ?", params![id])?;
            if affected == 0 {
                return Err(StoreError::NotFound(format!("glossary entry {}", id)));
            }
            Ok(())
        })
    }

    pub fn list(&self) -> Result<Vec<GlossaryEntry>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT id, source_term, target_term, scope FROM glossary ORDER BY id")?;
            let rows = stmt.query_map([], row_to_entry)?;
            let mut entries = Vec::new();
            for row in rows {
                entries.push(row?);
            }
            Ok(entries)
        })
    }

    /// Terms applicable to a translation: global terms plus those scoped to
    /// the given series. Series terms shadow global ones for the same source.
    pub fn terms_for(&self, series_id: Option<i64>) -> Result<Vec<(String, String)>, StoreError> {
        let entries = self.list()?;
        let mut terms: Vec<(String, String)> = Vec::new();
        for entry in &entries {
            if entry.scope == GlossaryScope::Global {
                terms.push((entry.source_term.clone(), entry.target_term.clone()));
            }
        }
        if let Some(series_id) = series_id {
            for entry in &entries {
                if entry.scope == GlossaryScope::Series(series_id) {
                    terms.retain(|(src, _)| src != &entry.source_term);
                    terms.push((entry.source_term.clone(), entry.target_term.clone()));
                }
            }
        }
        Ok(terms)
    }
}

fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<GlossaryEntry> {
    let scope: String = row.get(3)?;
    Ok(GlossaryEntry {
        id: row.get(0)?,
        source_term: row.get(1)?,
        target_term: row.get(2)?,
        scope: GlossaryScope::parse(&scope),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> GlossaryStore {
        GlossaryStore::new(Database::in_memory().unwrap())
    }

    #[test]
    fn test_add_and_list() {
        let glossary = store();
        glossary
            .add("Titan", "Titan", &GlossaryScope::Global)
            .unwrap();
        glossary
            .add("Scout Regiment", "Aufklärungstrupp", &GlossaryScope::Series(3))
            .unwrap();

        let entries = glossary.list().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].scope, GlossaryScope::Series(3));
    }

    #[test]
    fn test_terms_for_series_shadow_global() {
        let glossary = store();
        glossary
            .add("Titan", "Riese", &GlossaryScope::Global)
            .unwrap();
        glossary
            .add("Titan", "Titan", &GlossaryScope::Series(3))
            .unwrap();

        let global_only = glossary.terms_for(None).unwrap();
        assert_eq!(global_only, vec![("Titan".to_string(), "Riese".to_string())]);

        let scoped = glossary.terms_for(Some(3)).unwrap();
        assert_eq!(scoped, vec![("Titan".to_string(), "Titan".to_string())]);

        let other_series = glossary.terms_for(Some(9)).unwrap();
        assert_eq!(other_series, vec![("Titan".to_string(), "Riese".to_string())]);
    }

    #[test]
    fn test_remove() {
        let glossary = store();
        let id = glossary
            .add("word", "Wort", &GlossaryScope::Global)
            .unwrap();
        glossary.remove(id).unwrap();
        assert!(glossary.list().unwrap().is_empty());
        assert!(matches!(glossary.remove(id), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_scope_roundtrip() {
        assert_eq!(GlossaryScope::parse("global"), GlossaryScope::Global);
        assert_eq!(GlossaryScope::parse("series:42"), GlossaryScope::Series(42));
        assert_eq!(GlossaryScope::Series(42).as_str(), "series:42");
    }
}
