//! Language profiles and the cached media inventory.
//!
//! The inventory tables (series/episodes/movies) are derived state written by
//! the scanner from the external managers; users never mutate them directly.

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};

use super::{Database, StoreError};

/// How forced subtitles are handled for a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForcedPreference {
    /// Never create forced wanted items.
    Disabled,
    /// Create a separate forced wanted item per target language.
    Separate,
    /// Detect and record embedded forced streams, but do not acquire.
    Auto,
}

impl ForcedPreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Separate => "separate",
            Self::Auto => "auto",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "separate" => Self::Separate,
            "auto" => Self::Auto,
            _ => Self::Disabled,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageProfile {
    pub id: i64,
    pub name: String,
    pub source_language: String,
    pub target_languages: Vec<String>,
    pub forced_preference: ForcedPreference,
    /// Per-profile translation backend chain (instance names); None uses the
    /// global chain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_chain: Option<Vec<String>>,
    pub is_default: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewLanguageProfile {
    pub name: String,
    pub source_language: String,
    pub target_languages: Vec<String>,
    #[serde(default = "default_forced")]
    pub forced_preference: ForcedPreference,
    #[serde(default)]
    pub backend_chain: Option<Vec<String>>,
    #[serde(default)]
    pub is_default: bool,
}

fn default_forced() -> ForcedPreference {
    ForcedPreference::Disabled
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Series,
    Movie,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Series => "series",
            Self::Movie => "movie",
        }
    }
}

/// A series row cached from an external inventory.
#[derive(Debug, Clone, Serialize)]
pub struct SeriesRow {
    pub id: i64,
    pub instance: String,
    pub title: String,
    pub path: String,
    pub tags: Vec<String>,
    pub profile_id: Option<i64>,
    pub last_info_sync: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EpisodeRow {
    pub id: i64,
    pub instance: String,
    pub series_id: i64,
    pub season: u32,
    pub episode: u32,
    pub file_path: String,
    pub last_seen_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MovieRow {
    pub id: i64,
    pub instance: String,
    pub title: String,
    pub file_path: String,
    pub tags: Vec<String>,
    pub profile_id: Option<i64>,
    pub year: Option<u32>,
    pub date_added: Option<DateTime<Utc>>,
    pub last_seen_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ProfileStore {
    db: Database,
}

impl ProfileStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn create(&self, profile: &NewLanguageProfile) -> Result<LanguageProfile, StoreError> {
        self.db.with_tx(|tx| {
            if profile.is_default {
                tx.execute("UPDATE language_profiles SET is_default = 0", [])?;
            }
            tx.execute(
                "INSERT INTO language_profiles
                 (name, source_language, target_languages, forced_preference, backend_chain, is_default)
                 VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    &profile.name,
                    &profile.source_language,
                    serde_json::to_string(&profile.target_languages).unwrap_or_default(),
                    profile.forced_preference.as_str(),
                    profile
                        .backend_chain
                        .as_ref()
                        .map(|c| serde_json::to_string(c).unwrap_or_default()),
                    profile.is_default as i32,
                ],
            )?;
            let id = tx.last_insert_rowid();
            Ok(LanguageProfile {
                id,
                name: profile.name.clone(),
                source_language: profile.source_language.clone(),
                target_languages: profile.target_languages.clone(),
                forced_preference: profile.forced_preference,
                backend_chain: profile.backend_chain.clone(),
                is_default: profile.is_default,
            })
        })
    }

    pub fn update(&self, id: i64, profile: &NewLanguageProfile) -> Result<(), StoreError> {
        self.db.with_tx(|tx| {
            if profile.is_default {
                tx.execute("UPDATE language_profiles SET is_default = 0", [])?;
            }
            let affected = tx.execute(
                "UPDATE language_profiles SET name = ?, source_language = ?,
                 target_languages = ?, forced_preference = ?, backend_chain = ?, is_default = ?
                 WHERE id = ?",
                params![
                    &profile.name,
                    &profile.source_language,
                    serde_json::to_string(&profile.target_languages).unwrap_or_default(),
                    profile.forced_preference.as_str(),
                    profile
                        .backend_chain
                        .as_ref()
                        .map(|c| serde_json::to_string(c).unwrap_or_default()),
                    profile.is_default as i32,
                    id,
                ],
            )?;
            if affected == 0 {
                return Err(StoreError::NotFound(format!("profile {}", id)));
            }
            Ok(())
        })
    }

    pub fn delete(&self, id: i64) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let affected =
                conn.execute("DELETE FROM language_profiles WHERE id = ?", params![id])?;
            if affected == 0 {
                return Err(StoreError::NotFound(format!("profile {}", id)));
            }
            Ok(())
        })
    }

    pub fn get(&self, id: i64) -> Result<LanguageProfile, StoreError> {
        self.db.with_conn(|conn| {
            conn.query_row(
                &format!("{} WHERE id = ?", SELECT_PROFILE),
                params![id],
                row_to_profile,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    StoreError::NotFound(format!("profile {}", id))
                }
                other => StoreError::from(other),
            })
        })
    }

    pub fn list(&self) -> Result<Vec<LanguageProfile>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{} ORDER BY id", SELECT_PROFILE))?;
            let rows = stmt.query_map([], row_to_profile)?;
            let mut profiles = Vec::new();
            for row in rows {
                profiles.push(row?);
            }
            Ok(profiles)
        })
    }

    /// The global default profile, if one is marked.
    pub fn default_profile(&self) -> Result<Option<LanguageProfile>, StoreError> {
        self.db.with_conn(|conn| {
            conn.query_row(
                &format!("{} WHERE is_default = 1", SELECT_PROFILE),
                [],
                row_to_profile,
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(StoreError::from(other)),
            })
        })
    }

    pub fn assign(
        &self,
        kind: MediaKind,
        instance: &str,
        external_id: i64,
        profile_id: i64,
    ) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO profile_assignments (kind, instance, external_id, profile_id)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT(kind, instance, external_id) DO UPDATE SET profile_id = excluded.profile_id",
                params![kind.as_str(), instance, external_id, profile_id],
            )?;
            Ok(())
        })
    }

    pub fn unassign(
        &self,
        kind: MediaKind,
        instance: &str,
        external_id: i64,
    ) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM profile_assignments WHERE kind = ? AND instance = ? AND external_id = ?",
                params![kind.as_str(), instance, external_id],
            )?;
            Ok(())
        })
    }

    /// The effective profile for an item: assignment, else the default.
    pub fn effective(
        &self,
        kind: MediaKind,
        instance: &str,
        external_id: i64,
    ) -> Result<Option<LanguageProfile>, StoreError> {
        let assigned: Option<i64> = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT profile_id FROM profile_assignments
                 WHERE kind = ? AND instance = ? AND external_id = ?",
                params![kind.as_str(), instance, external_id],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(StoreError::from(other)),
            })
        })?;

        match assigned {
            Some(id) => self.get(id).map(Some),
            None => self.default_profile(),
        }
    }
}

const SELECT_PROFILE: &str = "SELECT id, name, source_language, target_languages, \
    forced_preference, backend_chain, is_default FROM language_profiles";

fn row_to_profile(row: &rusqlite::Row) -> rusqlite::Result<LanguageProfile> {
    let targets: String = row.get(3)?;
    let forced: String = row.get(4)?;
    let chain: Option<String> = row.get(5)?;
    Ok(LanguageProfile {
        id: row.get(0)?,
        name: row.get(1)?,
        source_language: row.get(2)?,
        target_languages: serde_json::from_str(&targets).unwrap_or_default(),
        forced_preference: ForcedPreference::parse(&forced),
        backend_chain: chain.and_then(|c| serde_json::from_str(&c).ok()),
        is_default: row.get::<_, i32>(6)? != 0,
    })
}

/// Cached media inventory written by the scanner.
#[derive(Clone)]
pub struct LibraryStore {
    db: Database,
}

impl LibraryStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn upsert_series(&self, row: &SeriesRow) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO series (id, instance, title, path, tags, profile_id, last_info_sync)
                 VALUES (?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(instance, id) DO UPDATE SET
                    title = excluded.title, path = excluded.path, tags = excluded.tags,
                    profile_id = excluded.profile_id, last_info_sync = excluded.last_info_sync",
                params![
                    row.id,
                    &row.instance,
                    &row.title,
                    &row.path,
                    serde_json::to_string(&row.tags).unwrap_or_default(),
                    row.profile_id,
                    row.last_info_sync.map(|t| t.to_rfc3339()),
                ],
            )?;
            Ok(())
        })
    }

    pub fn upsert_episode(&self, row: &EpisodeRow) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO episodes (id, instance, series_id, season, episode, file_path, last_seen_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(instance, id) DO UPDATE SET
                    series_id = excluded.series_id, season = excluded.season,
                    episode = excluded.episode, file_path = excluded.file_path,
                    last_seen_at = excluded.last_seen_at",
                params![
                    row.id,
                    &row.instance,
                    row.series_id,
                    row.season,
                    row.episode,
                    &row.file_path,
                    row.last_seen_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    pub fn upsert_movie(&self, row: &MovieRow) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO movies (id, instance, title, file_path, tags, profile_id, year, date_added, last_seen_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(instance, id) DO UPDATE SET
                    title = excluded.title, file_path = excluded.file_path,
                    tags = excluded.tags, profile_id = excluded.profile_id,
                    year = excluded.year, date_added = excluded.date_added,
                    last_seen_at = excluded.last_seen_at",
                params![
                    row.id,
                    &row.instance,
                    &row.title,
                    &row.file_path,
                    serde_json::to_string(&row.tags).unwrap_or_default(),
                    row.profile_id,
                    row.year,
                    row.date_added.map(|t| t.to_rfc3339()),
                    row.last_seen_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    pub fn list_series(&self) -> Result<Vec<SeriesRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, instance, title, path, tags, profile_id, last_info_sync
                 FROM series ORDER BY title",
            )?;
            let rows = stmt.query_map([], |row| {
                let tags: String = row.get(4)?;
                let sync: Option<String> = row.get(6)?;
                Ok(SeriesRow {
                    id: row.get(0)?,
                    instance: row.get(1)?,
                    title: row.get(2)?,
                    path: row.get(3)?,
                    tags: serde_json::from_str(&tags).unwrap_or_default(),
                    profile_id: row.get(5)?,
                    last_info_sync: sync
                        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                        .map(|dt| dt.with_timezone(&Utc)),
                })
            })?;
            let mut series = Vec::new();
            for row in rows {
                series.push(row?);
            }
            Ok(series)
        })
    }

    pub fn list_episodes(&self, instance: &str, series_id: i64) -> Result<Vec<EpisodeRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, instance, series_id, season, episode, file_path, last_seen_at
                 FROM episodes WHERE instance = ? AND series_id = ?
                 ORDER BY season, episode",
            )?;
            let rows = stmt.query_map(params![instance, series_id], row_to_episode)?;
            let mut episodes = Vec::new();
            for row in rows {
                episodes.push(row?);
            }
            Ok(episodes)
        })
    }

    pub fn list_movies(&self) -> Result<Vec<MovieRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, instance, title, file_path, tags, profile_id, year, date_added, last_seen_at
                 FROM movies ORDER BY title",
            )?;
            let rows = stmt.query_map([], |row| {
                let tags: String = row.get(4)?;
                let added: Option<String> = row.get(7)?;
                let seen: String = row.get(8)?;
                Ok(MovieRow {
                    id: row.get(0)?,
                    instance: row.get(1)?,
                    title: row.get(2)?,
                    file_path: row.get(3)?,
                    tags: serde_json::from_str(&tags).unwrap_or_default(),
                    profile_id: row.get(5)?,
                    year: row.get(6)?,
                    date_added: added
                        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                        .map(|dt| dt.with_timezone(&Utc)),
                    last_seen_at: DateTime::parse_from_rfc3339(&seen)
                        .map(|dt| dt.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now()),
                })
            })?;
            let mut movies = Vec::new();
            for row in rows {
                movies.push(row?);
            }
            Ok(movies)
        })
    }

    /// All known media file paths (episodes + movies), for scan cleanup.
    pub fn all_file_paths(&self) -> Result<Vec<String>, StoreError> {
        self.db.with_conn(|conn| {
            let mut paths = Vec::new();
            let mut stmt = conn.prepare("SELECT file_path FROM episodes")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            for row in rows {
                paths.push(row?);
            }
            let mut stmt = conn.prepare("SELECT file_path FROM movies")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            for row in rows {
                paths.push(row?);
            }
            Ok(paths)
        })
    }
}

fn row_to_episode(row: &rusqlite::Row) -> rusqlite::Result<EpisodeRow> {
    let seen: String = row.get(6)?;
    Ok(EpisodeRow {
        id: row.get(0)?,
        instance: row.get(1)?,
        series_id: row.get(2)?,
        season: row.get(3)?,
        episode: row.get(4)?,
        file_path: row.get(5)?,
        last_seen_at: DateTime::parse_from_rfc3339(&seen)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stores() -> (ProfileStore, LibraryStore) {
        let db = Database::in_memory().unwrap();
        (ProfileStore::new(db.clone()), LibraryStore::new(db))
    }

    fn sample_profile(name: &str, is_default: bool) -> NewLanguageProfile {
        NewLanguageProfile {
            name: name.to_string(),
            source_language: "en".to_string(),
            target_languages: vec!["de".to_string(), "fr".to_string()],
            forced_preference: ForcedPreference::Separate,
            backend_chain: None,
            is_default,
        }
    }

    #[test]
    fn test_profile_crud() {
        let (profiles, _) = stores();
        let created = profiles.create(&sample_profile("anime", true)).unwrap();
        assert!(created.is_default);

        let fetched = profiles.get(created.id).unwrap();
        assert_eq!(fetched.name, "anime");
        assert_eq!(fetched.target_languages, vec!["de", "fr"]);
        assert_eq!(fetched.forced_preference, ForcedPreference::Separate);

        let mut update = sample_profile("anime-v2", true);
        update.forced_preference = ForcedPreference::Auto;
        profiles.update(created.id, &update).unwrap();
        let fetched = profiles.get(created.id).unwrap();
        assert_eq!(fetched.name, "anime-v2");
        assert_eq!(fetched.forced_preference, ForcedPreference::Auto);

        profiles.delete(created.id).unwrap();
        assert!(matches!(
            profiles.get(created.id),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_single_default_profile() {
        let (profiles, _) = stores();
        let first = profiles.create(&sample_profile("a", true)).unwrap();
        let second = profiles.create(&sample_profile("b", true)).unwrap();

        let default = profiles.default_profile().unwrap().unwrap();
        assert_eq!(default.id, second.id);
        assert!(!profiles.get(first.id).unwrap().is_default);
    }

    #[test]
    fn test_effective_profile_assignment_wins() {
        let (profiles, _) = stores();
        let default = profiles.create(&sample_profile("default", true)).unwrap();
        let special = profiles.create(&sample_profile("special", false)).unwrap();

        // Unassigned falls back to the default
        let eff = profiles
            .effective(MediaKind::Series, "main", 42)
            .unwrap()
            .unwrap();
        assert_eq!(eff.id, default.id);

        profiles
            .assign(MediaKind::Series, "main", 42, special.id)
            .unwrap();
        let eff = profiles
            .effective(MediaKind::Series, "main", 42)
            .unwrap()
            .unwrap();
        assert_eq!(eff.id, special.id);

        profiles.unassign(MediaKind::Series, "main", 42).unwrap();
        let eff = profiles
            .effective(MediaKind::Series, "main", 42)
            .unwrap()
            .unwrap();
        assert_eq!(eff.id, default.id);
    }

    #[test]
    fn test_library_upserts() {
        let (_, library) = stores();
        library
            .upsert_series(&SeriesRow {
                id: 1,
                instance: "main".to_string(),
                title: "Show".to_string(),
                path: "/m/Show".to_string(),
                tags: vec!["anime".to_string()],
                profile_id: None,
                last_info_sync: None,
            })
            .unwrap();
        library
            .upsert_episode(&EpisodeRow {
                id: 10,
                instance: "main".to_string(),
                series_id: 1,
                season: 1,
                episode: 1,
                file_path: "/m/Show/S01E01.mkv".to_string(),
                last_seen_at: Utc::now(),
            })
            .unwrap();

        let episodes = library.list_episodes("main", 1).unwrap();
        assert_eq!(episodes.len(), 1);
        assert_eq!(episodes[0].file_path, "/m/Show/S01E01.mkv");

        // Upsert with a new path replaces, not duplicates
        library
            .upsert_episode(&EpisodeRow {
                id: 10,
                instance: "main".to_string(),
                series_id: 1,
                season: 1,
                episode: 1,
                file_path: "/m/Show/S01E01-proper.mkv".to_string(),
                last_seen_at: Utc::now(),
            })
            .unwrap();
        let episodes = library.list_episodes("main", 1).unwrap();
        assert_eq!(episodes.len(), 1);
        assert_eq!(episodes[0].file_path, "/m/Show/S01E01-proper.mkv");
    }

    #[test]
    fn test_all_file_paths() {
        let (_, library) = stores();
        library
            .upsert_movie(&MovieRow {
                id: 5,
                instance: "radarr".to_string(),
                title: "Film".to_string(),
                file_path: "/m/Film/Film.mkv".to_string(),
                tags: vec![],
                profile_id: None,
                year: Some(2020),
                date_added: None,
                last_seen_at: Utc::now(),
            })
            .unwrap();
        let paths = library.all_file_paths().unwrap();
        assert_eq!(paths, vec!["/m/Film/Film.mkv"]);
    }
}
