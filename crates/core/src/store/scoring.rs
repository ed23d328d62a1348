//! Scoring weights and per-provider modifiers.
//!
//! Defaults are seeded at startup; any write through this store must be
//! followed by a scoring-cache invalidation (the provider manager listens for
//! that through `ScoringStore::generation`).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rusqlite::params;
use serde::{Deserialize, Serialize};

use super::{Database, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreType {
    Episode,
    Movie,
}

impl ScoreType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Episode => "episode",
            Self::Movie => "movie",
        }
    }
}

/// Default episode weights, seeded when the table is empty.
pub const DEFAULT_EPISODE_WEIGHTS: &[(&str, i64)] = &[
    ("title", 100),
    ("season", 50),
    ("episode", 50),
    ("year", 20),
    ("release_group", 15),
    ("source_language", 30),
];

/// Default movie weights.
pub const DEFAULT_MOVIE_WEIGHTS: &[(&str, i64)] = &[
    ("title", 120),
    ("year", 40),
    ("release_group", 15),
    ("source_language", 30),
];

#[derive(Clone)]
pub struct ScoringStore {
    db: Database,
    generation: Arc<AtomicU64>,
}

impl ScoringStore {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Seed defaults for any missing weight key.
    pub fn seed_defaults(&self) -> Result<(), StoreError> {
        self.db.with_tx(|tx| {
            for (score_type, weights) in [
                (ScoreType::Episode, DEFAULT_EPISODE_WEIGHTS),
                (ScoreType::Movie, DEFAULT_MOVIE_WEIGHTS),
            ] {
                for (key, value) in weights {
                    tx.execute(
                        "INSERT OR IGNORE INTO scoring_weights (score_type, weight_key, weight_value)
                         VALUES (?, ?, ?)",
                        params![score_type.as_str(), key, value],
                    )?;
                }
            }
            Ok(())
        })
    }

    pub fn weights(&self, score_type: ScoreType) -> Result<Vec<(String, i64)>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT weight_key, weight_value FROM scoring_weights
                 WHERE score_type = ? ORDER BY weight_key",
            )?;
            let rows = stmt.query_map(params![score_type.as_str()], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?;
            let mut weights = Vec::new();
            for row in rows {
                weights.push(row?);
            }
            Ok(weights)
        })
    }

    /// Writing a weight bumps the generation counter; readers holding a
    /// cached snapshot compare generations to decide whether to reload.
    pub fn set_weight(
        &self,
        score_type: ScoreType,
        key: &str,
        value: i64,
    ) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO scoring_weights (score_type, weight_key, weight_value)
                 VALUES (?, ?, ?)
                 ON CONFLICT(score_type, weight_key) DO UPDATE SET weight_value = excluded.weight_value",
                params![score_type.as_str(), key, value],
            )?;
            Ok(())
        })?;
        self.generation.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    pub fn modifiers(&self) -> Result<Vec<(String, i64)>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT provider_name, modifier FROM provider_score_modifiers")?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            let mut modifiers = Vec::new();
            for row in rows {
                modifiers.push(row?);
            }
            Ok(modifiers)
        })
    }

    pub fn set_modifier(&self, provider: &str, modifier: i64) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO provider_score_modifiers (provider_name, modifier) VALUES (?, ?)
                 ON CONFLICT(provider_name) DO UPDATE SET modifier = excluded.modifier",
                params![provider, modifier],
            )?;
            Ok(())
        })?;
        self.generation.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Monotonic counter bumped on every scoring-related write.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ScoringStore {
        let s = ScoringStore::new(Database::in_memory().unwrap());
        s.seed_defaults().unwrap();
        s
    }

    #[test]
    fn test_seed_defaults_once() {
        let s = store();
        let weights = s.weights(ScoreType::Episode).unwrap();
        assert_eq!(weights.len(), DEFAULT_EPISODE_WEIGHTS.len());

        // Re-seeding keeps user edits
        s.set_weight(ScoreType::Episode, "title", 200).unwrap();
        s.seed_defaults().unwrap();
        let weights = s.weights(ScoreType::Episode).unwrap();
        let title = weights.iter().find(|(k, _)| k == "title").unwrap();
        assert_eq!(title.1, 200);
    }

    #[test]
    fn test_generation_bumps_on_write() {
        let s = store();
        let before = s.generation();
        s.set_weight(ScoreType::Movie, "year", 45).unwrap();
        assert!(s.generation() > before);

        let gen = s.generation();
        s.set_modifier("opensubtitles", -10).unwrap();
        assert!(s.generation() > gen);
    }

    #[test]
    fn test_modifiers_roundtrip() {
        let s = store();
        s.set_modifier("jimaku", 25).unwrap();
        s.set_modifier("jimaku", 30).unwrap();
        let modifiers = s.modifiers().unwrap();
        assert_eq!(modifiers, vec![("jimaku".to_string(), 30)]);
    }
}
