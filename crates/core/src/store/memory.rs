//! Translation memory.
//!
//! Entries are keyed on normalized source text (lowercased, whitespace
//! collapsed, override tags stripped), never raw lines. Lookups accept a
//! near-exact match governed by a character-level similarity threshold.

use chrono::Utc;
use rusqlite::params;

use super::{Database, StoreError};

#[derive(Debug, Clone)]
pub struct MemoryHit {
    pub translated_text: String,
    pub similarity: f64,
}

#[derive(Clone)]
pub struct TranslationMemoryStore {
    db: Database,
}

impl TranslationMemoryStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn store(
        &self,
        source_lang: &str,
        target_lang: &str,
        normalized_source: &str,
        translated_text: &str,
    ) -> Result<(), StoreError> {
        if normalized_source.is_empty() {
            return Ok(());
        }
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO translation_memory
                 (source_language, target_language, normalized_source, translated_text, created_at)
                 VALUES (?, ?, ?, ?, ?)
                 ON CONFLICT(source_language, target_language, normalized_source)
                 DO UPDATE SET translated_text = excluded.translated_text",
                params![
                    source_lang,
                    target_lang,
                    normalized_source,
                    translated_text,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    /// Look up a normalized source line.
    ///
    /// Exact matches return immediately. Otherwise candidates whose length is
    /// within the band the threshold allows are compared by normalized
    /// Levenshtein ratio; the best match at or above the threshold wins.
    pub fn lookup(
        &self,
        source_lang: &str,
        target_lang: &str,
        normalized_source: &str,
        similarity_threshold: f64,
    ) -> Result<Option<MemoryHit>, StoreError> {
        if normalized_source.is_empty() {
            return Ok(None);
        }

        let exact: Option<String> = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT translated_text FROM translation_memory
                 WHERE source_language = ? AND target_language = ? AND normalized_source = ?",
                params![source_lang, target_lang, normalized_source],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(StoreError::from(other)),
            })
        })?;

        if let Some(text) = exact {
            return Ok(Some(MemoryHit {
                translated_text: text,
                similarity: 1.0,
            }));
        }

        if similarity_threshold >= 1.0 {
            return Ok(None);
        }

        // Length band: similarity >= t implies the lengths differ by at most
        // (1 - t) of the longer string.
        let len = normalized_source.chars().count() as i64;
        let slack = ((1.0 - similarity_threshold) * len as f64).ceil() as i64 + 1;

        let candidates: Vec<(String, String)> = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT normalized_source, translated_text FROM translation_memory
                 WHERE source_language = ? AND target_language = ?
                   AND LENGTH(normalized_source) BETWEEN ? AND ?",
            )?;
            let rows = stmt.query_map(
                params![source_lang, target_lang, (len - slack).max(0), len + slack],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })?;

        let mut best: Option<MemoryHit> = None;
        for (candidate, translated) in candidates {
            let similarity = similarity_ratio(normalized_source, &candidate);
            if similarity >= similarity_threshold
                && best.as_ref().map(|b| similarity > b.similarity).unwrap_or(true)
            {
                best = Some(MemoryHit {
                    translated_text: translated,
                    similarity,
                });
            }
        }
        Ok(best)
    }

    pub fn count(&self) -> Result<u64, StoreError> {
        self.db.with_conn(|conn| {
            let count: u64 =
                conn.query_row("SELECT COUNT(*) FROM translation_memory", [], |r| r.get(0))?;
            Ok(count)
        })
    }
}

/// Normalized Levenshtein similarity over characters, in 0.0..=1.0.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let max_len = a_chars.len().max(b_chars.len());
    if max_len == 0 {
        return 1.0;
    }
    let distance = levenshtein(&a_chars, &b_chars);
    1.0 - (distance as f64 / max_len as f64)
}

fn levenshtein(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> TranslationMemoryStore {
        TranslationMemoryStore::new(Database::in_memory().unwrap())
    }

    #[test]
    fn test_exact_lookup() {
        let tm = store();
        tm.store("en", "de", "hello there", "hallo zusammen").unwrap();

        let hit = tm.lookup("en", "de", "hello there", 0.9).unwrap().unwrap();
        assert_eq!(hit.translated_text, "hallo zusammen");
        assert!((hit.similarity - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_near_match_above_threshold() {
        let tm = store();
        tm.store("en", "de", "hello there friend", "hallo freund")
            .unwrap();

        // One character different out of 18
        let hit = tm
            .lookup("en", "de", "hello there friend!", 0.9)
            .unwrap()
            .unwrap();
        assert_eq!(hit.translated_text, "hallo freund");
        assert!(hit.similarity >= 0.9);
        assert!(hit.similarity < 1.0);
    }

    #[test]
    fn test_miss_below_threshold() {
        let tm = store();
        tm.store("en", "de", "hello there", "hallo").unwrap();

        let hit = tm.lookup("en", "de", "completely different", 0.9).unwrap();
        assert!(hit.is_none());
    }

    #[test]
    fn test_lookup_is_language_pair_scoped() {
        let tm = store();
        tm.store("en", "de", "hello", "hallo").unwrap();
        assert!(tm.lookup("en", "fr", "hello", 0.9).unwrap().is_none());
        assert!(tm.lookup("ja", "de", "hello", 0.9).unwrap().is_none());
    }

    #[test]
    fn test_empty_source_ignored() {
        let tm = store();
        tm.store("en", "de", "", "nothing").unwrap();
        assert_eq!(tm.count().unwrap(), 0);
        assert!(tm.lookup("en", "de", "", 0.9).unwrap().is_none());
    }

    #[test]
    fn test_store_updates_existing() {
        let tm = store();
        tm.store("en", "de", "hello", "hallo").unwrap();
        tm.store("en", "de", "hello", "guten tag").unwrap();
        assert_eq!(tm.count().unwrap(), 1);

        let hit = tm.lookup("en", "de", "hello", 1.0).unwrap().unwrap();
        assert_eq!(hit.translated_text, "guten tag");
    }

    #[test]
    fn test_similarity_ratio() {
        assert!((similarity_ratio("abc", "abc") - 1.0).abs() < f64::EPSILON);
        assert!((similarity_ratio("abcd", "abce") - 0.75).abs() < f64::EPSILON);
        assert_eq!(similarity_ratio("", ""), 1.0);
        assert_eq!(similarity_ratio("abc", ""), 0.0);
    }

    #[test]
    fn test_threshold_one_requires_exact() {
        let tm = store();
        tm.store("en", "de", "hello there", "hallo").unwrap();
        assert!(tm.lookup("en", "de", "hello theri", 1.0).unwrap().is_none());
    }
}
