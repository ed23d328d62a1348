//! Sonarr- and Radarr-compatible inventory clients.
//!
//! Inventory is read-only: series, episode files and movies, with tags and
//! sync timestamps. Per-instance path mapping converts the manager's remote
//! paths into local media-mount paths before any filesystem access.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::config::ArrInstanceConfig;

use super::IntegrationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrKind {
    Sonarr,
    Radarr,
}

/// A series from a Sonarr-compatible instance.
#[derive(Debug, Clone)]
pub struct ArrSeries {
    pub id: i64,
    pub title: String,
    pub path: String,
    pub tags: Vec<String>,
    pub year: Option<u32>,
    pub last_info_sync: Option<DateTime<Utc>>,
}

/// An episode with its on-disk file.
#[derive(Debug, Clone)]
pub struct ArrEpisode {
    pub id: i64,
    pub series_id: i64,
    pub season: u32,
    pub episode: u32,
    pub absolute_episode: Option<u32>,
    pub file_path: String,
    pub date_added: Option<DateTime<Utc>>,
}

/// A movie from a Radarr-compatible instance.
#[derive(Debug, Clone)]
pub struct ArrMovie {
    pub id: i64,
    pub title: String,
    pub year: Option<u32>,
    pub file_path: String,
    pub tags: Vec<String>,
    pub date_added: Option<DateTime<Utc>>,
}

/// Read-only inventory contract.
#[async_trait]
pub trait InventoryClient: Send + Sync {
    fn instance_name(&self) -> &str;
    fn kind(&self) -> ArrKind;

    /// Series list; empty for Radarr-compatible instances.
    async fn fetch_series(&self) -> Result<Vec<ArrSeries>, IntegrationError>;

    /// Episodes with files for one series; empty for Radarr.
    async fn fetch_episodes(&self, series_id: i64) -> Result<Vec<ArrEpisode>, IntegrationError>;

    /// Movie list; empty for Sonarr-compatible instances.
    async fn fetch_movies(&self) -> Result<Vec<ArrMovie>, IntegrationError>;

    /// Convert a remote path into a local one via the instance's mapping.
    fn map_path(&self, remote: &str) -> String;

    async fn health_check(&self) -> (bool, String);
}

/// Shared HTTP plumbing for both client kinds.
struct ArrHttp {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    path_map: Option<(String, String)>,
}

impl ArrHttp {
    fn new(config: &ArrInstanceConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("Failed to create HTTP client"),
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            path_map: config
                .path_map
                .as_ref()
                .map(|m| (m.remote.clone(), m.local.clone())),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<T, IntegrationError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .header("X-Api-Key", &self.api_key)
            .send()
            .await
            .map_err(|e| IntegrationError::Connection(e.to_string()))?;

        let status = response.status().as_u16();
        if status == 401 || status == 403 {
            return Err(IntegrationError::Auth(format!("HTTP {}", status)));
        }
        if status != 200 {
            return Err(IntegrationError::Api(format!("HTTP {}", status)));
        }

        response
            .json()
            .await
            .map_err(|e| IntegrationError::Parse(e.to_string()))
    }

    fn map_path(&self, remote: &str) -> String {
        match &self.path_map {
            Some((from, to)) => match remote.strip_prefix(from.as_str()) {
                Some(rest) => format!("{}{}", to.trim_end_matches('/'), ensure_slash(rest)),
                None => remote.to_string(),
            },
            None => remote.to_string(),
        }
    }
}

fn ensure_slash(rest: &str) -> String {
    if rest.starts_with('/') {
        rest.to_string()
    } else {
        format!("/{}", rest)
    }
}

fn parse_ts(s: &Option<String>) -> Option<DateTime<Utc>> {
    s.as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

// --- Sonarr ------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SonarrSeries {
    id: i64,
    title: String,
    path: String,
    #[serde(default)]
    tags: Vec<i64>,
    #[serde(default)]
    year: Option<u32>,
    #[serde(default, rename = "lastInfoSync")]
    last_info_sync: Option<String>,
    #[serde(default)]
    added: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SonarrEpisode {
    id: i64,
    #[serde(rename = "seriesId")]
    series_id: i64,
    #[serde(rename = "seasonNumber")]
    season_number: u32,
    #[serde(rename = "episodeNumber")]
    episode_number: u32,
    #[serde(default, rename = "absoluteEpisodeNumber")]
    absolute_episode_number: Option<u32>,
    #[serde(default, rename = "episodeFileId")]
    episode_file_id: i64,
}

#[derive(Debug, Deserialize)]
struct SonarrEpisodeFile {
    id: i64,
    path: String,
    #[serde(default, rename = "dateAdded")]
    date_added: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ArrTag {
    id: i64,
    label: String,
}

pub struct SonarrClient {
    name: String,
    http: ArrHttp,
}

impl SonarrClient {
    pub fn new(config: &ArrInstanceConfig) -> Self {
        Self {
            name: config.name.clone(),
            http: ArrHttp::new(config),
        }
    }

    async fn tag_labels(&self) -> HashMap<i64, String> {
        match self.http.get_json::<Vec<ArrTag>>("/api/v3/tag").await {
            Ok(tags) => tags.into_iter().map(|t| (t.id, t.label)).collect(),
            Err(e) => {
                tracing::debug!(instance = %self.name, "Tag fetch failed: {}", e);
                HashMap::new()
            }
        }
    }
}

#[async_trait]
impl InventoryClient for SonarrClient {
    fn instance_name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ArrKind {
        ArrKind::Sonarr
    }

    async fn fetch_series(&self) -> Result<Vec<ArrSeries>, IntegrationError> {
        let series: Vec<SonarrSeries> = self.http.get_json("/api/v3/series").await?;
        let labels = self.tag_labels().await;

        Ok(series
            .into_iter()
            .map(|s| ArrSeries {
                id: s.id,
                title: s.title,
                path: self.http.map_path(&s.path),
                tags: s
                    .tags
                    .iter()
                    .map(|id| labels.get(id).cloned().unwrap_or_else(|| id.to_string()))
                    .collect(),
                year: s.year,
                last_info_sync: parse_ts(&s.last_info_sync).or_else(|| parse_ts(&s.added)),
            })
            .collect())
    }

    async fn fetch_episodes(&self, series_id: i64) -> Result<Vec<ArrEpisode>, IntegrationError> {
        let episodes: Vec<SonarrEpisode> = self
            .http
            .get_json(&format!("/api/v3/episode?seriesId={}", series_id))
            .await?;
        let files: Vec<SonarrEpisodeFile> = self
            .http
            .get_json(&format!("/api/v3/episodefile?seriesId={}", series_id))
            .await?;
        let files_by_id: HashMap<i64, &SonarrEpisodeFile> =
            files.iter().map(|f| (f.id, f)).collect();

        Ok(episodes
            .into_iter()
            .filter(|e| e.episode_file_id != 0)
            .filter_map(|e| {
                let file = files_by_id.get(&e.episode_file_id)?;
                Some(ArrEpisode {
                    id: e.id,
                    series_id: e.series_id,
                    season: e.season_number,
                    episode: e.episode_number,
                    absolute_episode: e.absolute_episode_number,
                    file_path: self.http.map_path(&file.path),
                    date_added: parse_ts(&file.date_added),
                })
            })
            .collect())
    }

    async fn fetch_movies(&self) -> Result<Vec<ArrMovie>, IntegrationError> {
        Ok(Vec::new())
    }

    fn map_path(&self, remote: &str) -> String {
        self.http.map_path(remote)
    }

    async fn health_check(&self) -> (bool, String) {
        match self
            .http
            .get_json::<serde_json::Value>("/api/v3/system/status")
            .await
        {
            Ok(_) => (true, "ok".to_string()),
            Err(e) => (false, e.to_string()),
        }
    }
}

// --- Radarr ------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RadarrMovie {
    id: i64,
    title: String,
    #[serde(default)]
    year: Option<u32>,
    #[serde(default)]
    tags: Vec<i64>,
    #[serde(default, rename = "movieFile")]
    movie_file: Option<RadarrMovieFile>,
    #[serde(default)]
    added: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RadarrMovieFile {
    path: String,
    #[serde(default, rename = "dateAdded")]
    date_added: Option<String>,
}

pub struct RadarrClient {
    name: String,
    http: ArrHttp,
}

impl RadarrClient {
    pub fn new(config: &ArrInstanceConfig) -> Self {
        Self {
            name: config.name.clone(),
            http: ArrHttp::new(config),
        }
    }
}

#[async_trait]
impl InventoryClient for RadarrClient {
    fn instance_name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ArrKind {
        ArrKind::Radarr
    }

    async fn fetch_series(&self) -> Result<Vec<ArrSeries>, IntegrationError> {
        Ok(Vec::new())
    }

    async fn fetch_episodes(&self, _series_id: i64) -> Result<Vec<ArrEpisode>, IntegrationError> {
        Ok(Vec::new())
    }

    async fn fetch_movies(&self) -> Result<Vec<ArrMovie>, IntegrationError> {
        let movies: Vec<RadarrMovie> = self.http.get_json("/api/v3/movie").await?;
        let labels = match self.http.get_json::<Vec<ArrTag>>("/api/v3/tag").await {
            Ok(tags) => tags.into_iter().map(|t| (t.id, t.label)).collect(),
            Err(_) => HashMap::new(),
        };

        Ok(movies
            .into_iter()
            .filter_map(|m| {
                let file = m.movie_file?;
                Some(ArrMovie {
                    id: m.id,
                    title: m.title,
                    year: m.year,
                    file_path: self.http.map_path(&file.path),
                    tags: m
                        .tags
                        .iter()
                        .map(|id| labels.get(id).cloned().unwrap_or_else(|| id.to_string()))
                        .collect(),
                    date_added: parse_ts(&file.date_added).or_else(|| parse_ts(&m.added)),
                })
            })
            .collect())
    }

    fn map_path(&self, remote: &str) -> String {
        self.http.map_path(remote)
    }

    async fn health_check(&self) -> (bool, String) {
        match self
            .http
            .get_json::<serde_json::Value>("/api/v3/system/status")
            .await
        {
            Ok(_) => (true, "ok".to_string()),
            Err(e) => (false, e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PathMapConfig;

    fn config(path_map: Option<PathMapConfig>) -> ArrInstanceConfig {
        ArrInstanceConfig {
            name: "main".to_string(),
            url: "http://sonarr:8989".to_string(),
            api_key: "key".to_string(),
            enabled: true,
            path_map,
        }
    }

    #[test]
    fn test_path_mapping() {
        let client = SonarrClient::new(&config(Some(PathMapConfig {
            remote: "/tv".to_string(),
            local: "/mnt/media/tv".to_string(),
        })));

        assert_eq!(
            client.map_path("/tv/Show/S01E01.mkv"),
            "/mnt/media/tv/Show/S01E01.mkv"
        );
        // Paths outside the mapping pass through
        assert_eq!(client.map_path("/other/file.mkv"), "/other/file.mkv");
    }

    #[test]
    fn test_no_path_mapping_is_identity() {
        let client = SonarrClient::new(&config(None));
        assert_eq!(client.map_path("/tv/Show/x.mkv"), "/tv/Show/x.mkv");
    }

    #[test]
    fn test_sonarr_episode_join_shapes() {
        let episodes: Vec<SonarrEpisode> = serde_json::from_str(
            r#"[{"id": 1, "seriesId": 10, "seasonNumber": 1, "episodeNumber": 2,
                 "absoluteEpisodeNumber": 14, "episodeFileId": 100},
                {"id": 2, "seriesId": 10, "seasonNumber": 1, "episodeNumber": 3,
                 "episodeFileId": 0}]"#,
        )
        .unwrap();
        assert_eq!(episodes.len(), 2);
        assert_eq!(episodes[0].absolute_episode_number, Some(14));
        // Episodes without files are filtered by fetch_episodes
        assert_eq!(episodes[1].episode_file_id, 0);
    }

    #[test]
    fn test_radarr_movie_shape() {
        let movies: Vec<RadarrMovie> = serde_json::from_str(
            r#"[{"id": 5, "title": "Film", "year": 2020, "tags": [1],
                 "movieFile": {"path": "/movies/Film/Film.mkv",
                               "dateAdded": "2024-01-01T00:00:00Z"}},
                {"id": 6, "title": "No File"}]"#,
        )
        .unwrap();
        assert_eq!(movies.len(), 2);
        assert!(movies[0].movie_file.is_some());
        assert!(movies[1].movie_file.is_none());
    }
}
