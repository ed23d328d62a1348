//! OpenSubtitles-compatible REST provider.
//!
//! Speaks the v1 JSON API: `GET /subtitles` for search, `POST /download` to
//! resolve a file id into a temporary download link. Forced searches use the
//! native `foreign_parts_only` filter.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::config::ProviderInstanceConfig;
use crate::subtitle::{canonical_language, SubtitleFormat};

use super::types::{
    ConfigField, ConfigFieldKind, ProviderError, SubtitleProvider, SubtitleResult, VideoQuery,
};

pub struct OpenSubtitlesProvider {
    name: String,
    client: reqwest::Client,
    api_base: String,
    api_key: String,
}

impl OpenSubtitlesProvider {
    pub fn new(config: &ProviderInstanceConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            name: config.name.clone(),
            client,
            api_base: config
                .url
                .clone()
                .unwrap_or_else(|| "https://api.opensubtitles.com/api/v1".to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key: config.api_key.clone().unwrap_or_default(),
        }
    }

    fn build_search_url(&self, query: &VideoQuery) -> String {
        let mut url = format!(
            "{}/subtitles?query={}&languages={},{}",
            self.api_base,
            urlencoding::encode(&query.title),
            canonical_language(&query.source_language),
            canonical_language(&query.target_language),
        );
        if let Some(season) = query.season {
            url.push_str(&format!("&season_number={}", season));
        }
        if let Some(episode) = query.episode {
            url.push_str(&format!("&episode_number={}", episode));
        }
        if let Some(year) = query.year {
            url.push_str(&format!("&year={}", year));
        }
        if query.forced_only {
            url.push_str("&foreign_parts_only=only");
        }
        url
    }

    fn map_response(&self, response: OsSearchResponse) -> Vec<SubtitleResult> {
        response
            .data
            .into_iter()
            .filter_map(|entry| {
                let attributes = entry.attributes;
                let file = attributes.files.into_iter().next()?;
                let format = attributes
                    .format
                    .as_deref()
                    .and_then(SubtitleFormat::from_extension)
                    .unwrap_or(SubtitleFormat::Srt);

                Some(SubtitleResult {
                    provider_name: self.name.clone(),
                    language: canonical_language(&attributes.language),
                    format,
                    download_url: format!("file_id:{}", file.file_id),
                    score: 0,
                    forced: attributes.foreign_parts_only,
                    machine_translated: attributes.machine_translated,
                    mt_confidence: if attributes.machine_translated { 80 } else { 0 },
                    uploader_trust: trust_from_rank(attributes.uploader.and_then(|u| u.rank)),
                    hash: attributes.moviehash,
                    release_info: attributes.release,
                })
            })
            .collect()
    }
}

fn trust_from_rank(rank: Option<String>) -> u8 {
    match rank.as_deref() {
        Some("administrator") | Some("platinum member") => 20,
        Some("gold member") | Some("trusted") => 15,
        Some("silver member") => 10,
        Some("bronze member") => 5,
        _ => 0,
    }
}

// --- API response shapes ---------------------------------------------------

#[derive(Debug, Deserialize)]
struct OsSearchResponse {
    #[serde(default)]
    data: Vec<OsEntry>,
}

#[derive(Debug, Deserialize)]
struct OsEntry {
    attributes: OsAttributes,
}

#[derive(Debug, Deserialize)]
struct OsAttributes {
    language: String,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    foreign_parts_only: bool,
    #[serde(default)]
    machine_translated: bool,
    #[serde(default)]
    moviehash: Option<String>,
    #[serde(default)]
    release: Option<String>,
    #[serde(default)]
    uploader: Option<OsUploader>,
    #[serde(default)]
    files: Vec<OsFile>,
}

#[derive(Debug, Deserialize)]
struct OsUploader {
    #[serde(default)]
    rank: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OsFile {
    file_id: u64,
}

#[derive(Debug, Deserialize)]
struct OsDownloadResponse {
    link: String,
}

fn map_status_error(status: u16, body: &str) -> ProviderError {
    match status {
        401 | 403 => ProviderError::Auth(format!("HTTP {}", status)),
        429 => ProviderError::RateLimit {
            retry_after_secs: None,
        },
        _ => ProviderError::Network(format!(
            "HTTP {}: {}",
            status,
            body.chars().take(200).collect::<String>()
        )),
    }
}

#[async_trait]
impl SubtitleProvider for OpenSubtitlesProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_native_forced_filter(&self) -> bool {
        true
    }

    fn config_fields(&self) -> Vec<ConfigField> {
        vec![
            ConfigField {
                name: "url",
                label: "API base URL",
                kind: ConfigFieldKind::String,
                default: Some("https://api.opensubtitles.com/api/v1"),
                help_text: "Base URL of an OpenSubtitles-compatible API",
            },
            ConfigField {
                name: "api_key",
                label: "API key",
                kind: ConfigFieldKind::Secret,
                default: None,
                help_text: "Consumer API key",
            },
            ConfigField {
                name: "timeout_secs",
                label: "Request timeout (s)",
                kind: ConfigFieldKind::Int,
                default: Some("15"),
                help_text: "Per-request deadline",
            },
        ]
    }

    async fn search(&self, query: &VideoQuery) -> Result<Vec<SubtitleResult>, ProviderError> {
        let url = self.build_search_url(query);
        tracing::debug!(provider = %self.name, "Searching OpenSubtitles");

        let response = self
            .client
            .get(&url)
            .header("Api-Key", &self.api_key)
            .header("accept", "application/json")
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(ProviderError::RateLimit {
                retry_after_secs: retry_after,
            });
        }
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status_error(status, &body));
        }

        let parsed: OsSearchResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        let results = self.map_response(parsed);
        if results.is_empty() {
            return Err(ProviderError::Empty);
        }
        Ok(results)
    }

    async fn download(&self, result: &SubtitleResult) -> Result<Vec<u8>, ProviderError> {
        let file_id: u64 = result
            .download_url
            .strip_prefix("file_id:")
            .and_then(|id| id.parse().ok())
            .ok_or_else(|| ProviderError::Parse("bad file id".to_string()))?;

        let response = self
            .client
            .post(format!("{}/download", self.api_base))
            .header("Api-Key", &self.api_key)
            .json(&serde_json::json!({"file_id": file_id}))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status_error(status, &body));
        }

        let download: OsDownloadResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        let payload = self
            .client
            .get(&download.link)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        if !payload.status().is_success() {
            return Err(ProviderError::Network(format!(
                "download HTTP {}",
                payload.status()
            )));
        }
        payload
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| ProviderError::Network(e.to_string()))
    }

    async fn health_check(&self) -> (bool, String) {
        let url = format!("{}/infos/user", self.api_base);
        match self
            .client
            .get(&url)
            .header("Api-Key", &self.api_key)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => (true, "ok".to_string()),
            Ok(response) => (false, format!("HTTP {}", response.status())),
            Err(e) => (false, e.to_string()),
        }
    }
}
