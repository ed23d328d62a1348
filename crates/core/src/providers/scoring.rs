//! Result scoring.
//!
//! `compute_score` is a pure function of the weights snapshot, the provider
//! modifiers, the result fields and the query. The engine caches a snapshot
//! for 60 s and reloads early when the scoring store's generation counter
//! moves (config writes invalidate before they become visible).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::store::{ScoreType, ScoringStore, StoreError};
use crate::subtitle::{language_matches, SubtitleFormat};

use super::types::{canonical_text, SubtitleResult, VideoQuery};

/// Bonus for styled (ASS/SSA) results.
pub const ASS_FORMAT_BONUS: i64 = 50;

/// Default penalty applied to likely machine translations.
pub const DEFAULT_MT_PENALTY: i64 = -30;

/// Default confidence gate for the MT penalty.
pub const DEFAULT_MT_CONFIDENCE_THRESHOLD: u8 = 70;

/// Snapshot lifetime before a time-based refresh.
const SNAPSHOT_TTL: Duration = Duration::from_secs(60);

/// Immutable view of the scoring configuration.
#[derive(Debug, Clone)]
pub struct ScoringSnapshot {
    pub episode_weights: HashMap<String, i64>,
    pub movie_weights: HashMap<String, i64>,
    pub provider_modifiers: HashMap<String, i64>,
    pub mt_penalty: i64,
    pub mt_confidence_threshold: u8,
    generation: u64,
}

/// Pure scoring over a snapshot.
pub fn compute_score(
    snapshot: &ScoringSnapshot,
    result: &SubtitleResult,
    query: &VideoQuery,
) -> i64 {
    let weights = if query.is_episode {
        &snapshot.episode_weights
    } else {
        &snapshot.movie_weights
    };

    let release = result
        .release_info
        .as_deref()
        .map(canonical_text)
        .unwrap_or_default();

    let mut score = 0i64;
    for (key, weight) in weights {
        let matched = match key.as_str() {
            "title" => release.contains(&canonical_text(&query.title)),
            "season" => match query.season {
                Some(season) => {
                    release.contains(&format!("s{:02}", season))
                        || release.contains(&format!("season {}", season))
                }
                None => false,
            },
            "episode" => match (query.episode, query.absolute_episode) {
                (Some(episode), _) if release.contains(&format!("e{:02}", episode)) => true,
                (_, Some(abs)) => release.contains(&format!(" {:02} ", abs))
                    || release.contains(&format!(" {} ", abs)),
                _ => false,
            },
            "year" => match query.year {
                Some(year) => release.contains(&year.to_string()),
                None => false,
            },
            "source_language" => language_matches(&result.language, &query.source_language)
                || language_matches(&result.language, &query.target_language),
            "release_group" => release.contains('-') || release.contains('['),
            _ => false,
        };
        if matched {
            score += weight;
        }
    }

    // Per-provider modifier
    score += snapshot
        .provider_modifiers
        .get(&result.provider_name)
        .copied()
        .unwrap_or(0);

    // Format bonus
    if matches!(result.format, SubtitleFormat::Ass | SubtitleFormat::Ssa) {
        score += ASS_FORMAT_BONUS;
    }

    // Uploader trust (0–20)
    score += result.uploader_trust.min(20) as i64;

    // Machine-translation penalty
    if result.machine_translated && result.mt_confidence >= snapshot.mt_confidence_threshold {
        score += snapshot.mt_penalty;
    }

    score
}

/// Snapshot cache in front of the scoring store.
pub struct ScoringEngine {
    store: ScoringStore,
    cached: Mutex<Option<(ScoringSnapshot, Instant)>>,
}

impl ScoringEngine {
    pub fn new(store: ScoringStore) -> Self {
        Self {
            store,
            cached: Mutex::new(None),
        }
    }

    /// Current snapshot; reloads when stale or when the store's generation
    /// moved since the snapshot was taken.
    pub fn snapshot(&self) -> Result<ScoringSnapshot, StoreError> {
        let generation = self.store.generation();
        {
            let cached = self.cached.lock().unwrap();
            if let Some((snapshot, taken)) = cached.as_ref() {
                if taken.elapsed() < SNAPSHOT_TTL && snapshot.generation == generation {
                    return Ok(snapshot.clone());
                }
            }
        }

        let snapshot = ScoringSnapshot {
            episode_weights: self.store.weights(ScoreType::Episode)?.into_iter().collect(),
            movie_weights: self.store.weights(ScoreType::Movie)?.into_iter().collect(),
            provider_modifiers: self.store.modifiers()?.into_iter().collect(),
            mt_penalty: DEFAULT_MT_PENALTY,
            mt_confidence_threshold: DEFAULT_MT_CONFIDENCE_THRESHOLD,
            generation,
        };

        *self.cached.lock().unwrap() = Some((snapshot.clone(), Instant::now()));
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Database;
    use crate::subtitle::SubtitleFormat;

    fn engine() -> ScoringEngine {
        let store = ScoringStore::new(Database::in_memory().unwrap());
        store.seed_defaults().unwrap();
        ScoringEngine::new(store)
    }

    fn query() -> VideoQuery {
        VideoQuery {
            title: "Frieren".to_string(),
            season: Some(1),
            episode: Some(4),
            absolute_episode: None,
            year: Some(2023),
            source_language: "en".to_string(),
            target_language: "de".to_string(),
            forced_only: false,
            is_episode: true,
        }
    }

    fn result(release: &str, format: SubtitleFormat) -> SubtitleResult {
        SubtitleResult {
            provider_name: "os".to_string(),
            language: "en".to_string(),
            format,
            download_url: "http://example.test/dl".to_string(),
            score: 0,
            forced: false,
            machine_translated: false,
            mt_confidence: 0,
            uploader_trust: 0,
            hash: None,
            release_info: Some(release.to_string()),
        }
    }

    #[test]
    fn test_score_is_deterministic() {
        let engine = engine();
        let snapshot = engine.snapshot().unwrap();
        let r = result("Frieren S01E04 1080p [SubGroup]", SubtitleFormat::Ass);
        let q = query();

        let a = compute_score(&snapshot, &r, &q);
        let b = compute_score(&snapshot, &r, &q);
        assert_eq!(a, b);
        assert!(a > 0);
    }

    #[test]
    fn test_ass_bonus() {
        let engine = engine();
        let snapshot = engine.snapshot().unwrap();
        let q = query();
        let ass = compute_score(&snapshot, &result("Frieren S01E04", SubtitleFormat::Ass), &q);
        let srt = compute_score(&snapshot, &result("Frieren S01E04", SubtitleFormat::Srt), &q);
        assert_eq!(ass - srt, ASS_FORMAT_BONUS);
    }

    #[test]
    fn test_title_and_episode_match_add_weight() {
        let engine = engine();
        let snapshot = engine.snapshot().unwrap();
        let q = query();
        let matching = compute_score(&snapshot, &result("Frieren S01E04", SubtitleFormat::Srt), &q);
        let unrelated = compute_score(&snapshot, &result("Other Show S03E09", SubtitleFormat::Srt), &q);
        assert!(matching > unrelated);
    }

    #[test]
    fn test_mt_penalty_gated_by_confidence() {
        let engine = engine();
        let snapshot = engine.snapshot().unwrap();
        let q = query();

        let mut mt = result("Frieren S01E04", SubtitleFormat::Srt);
        mt.machine_translated = true;
        mt.mt_confidence = 90;
        let mut low_conf = mt.clone();
        low_conf.mt_confidence = 30;
        let clean = result("Frieren S01E04", SubtitleFormat::Srt);

        let penalized = compute_score(&snapshot, &mt, &q);
        let unpenalized = compute_score(&snapshot, &low_conf, &q);
        let baseline = compute_score(&snapshot, &clean, &q);

        assert_eq!(penalized, baseline + DEFAULT_MT_PENALTY);
        assert_eq!(unpenalized, baseline);
    }

    #[test]
    fn test_uploader_trust_capped() {
        let engine = engine();
        let snapshot = engine.snapshot().unwrap();
        let q = query();
        let mut trusted = result("Frieren S01E04", SubtitleFormat::Srt);
        trusted.uploader_trust = 200; // capped to 20
        let plain = result("Frieren S01E04", SubtitleFormat::Srt);

        assert_eq!(
            compute_score(&snapshot, &trusted, &q) - compute_score(&snapshot, &plain, &q),
            20
        );
    }

    #[test]
    fn test_provider_modifier_applies() {
        let store = ScoringStore::new(Database::in_memory().unwrap());
        store.seed_defaults().unwrap();
        store.set_modifier("os", 33).unwrap();
        let engine = ScoringEngine::new(store);

        let snapshot = engine.snapshot().unwrap();
        let q = query();
        let r = result("Frieren S01E04", SubtitleFormat::Srt);
        let other = SubtitleResult {
            provider_name: "jimaku".to_string(),
            ..r.clone()
        };

        assert_eq!(
            compute_score(&snapshot, &r, &q) - compute_score(&snapshot, &other, &q),
            33
        );
    }

    #[test]
    fn test_snapshot_reloads_on_generation_change() {
        let store = ScoringStore::new(Database::in_memory().unwrap());
        store.seed_defaults().unwrap();
        let engine = ScoringEngine::new(store);

        let first = engine.snapshot().unwrap();
        engine.store.set_weight(ScoreType::Episode, "title", 500).unwrap();
        let second = engine.snapshot().unwrap();

        assert_ne!(
            first.episode_weights["title"],
            second.episode_weights["title"]
        );
        assert_eq!(second.episode_weights["title"], 500);
    }
}
