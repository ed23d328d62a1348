//! Jimaku-style anime subtitle provider.
//!
//! A directory of fansub archives: entries are located by name search, then
//! each entry lists downloadable files. Episode matching happens client-side
//! against the file names (anime archives commonly use absolute numbering).

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::config::ProviderInstanceConfig;
use crate::subtitle::SubtitleFormat;

use super::types::{
    ConfigField, ConfigFieldKind, ProviderError, SubtitleProvider, SubtitleResult, VideoQuery,
};

pub struct JimakuProvider {
    name: String,
    client: reqwest::Client,
    api_base: String,
    api_key: String,
}

impl JimakuProvider {
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
                .unwrap_or_else(|| "https://jimaku.cc/api".to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key: config.api_key.clone().unwrap_or_default(),
        }
    }

    /// Does a file name plausibly belong to the queried episode?
    fn file_matches_episode(name: &str, query: &VideoQuery) -> bool {
        if !query.is_episode {
            return true;
        }
        let lower = name.to_lowercase();
        if let (Some(season), Some(episode)) = (query.season, query.episode) {
            if lower.contains(&format!("s{:02}e{:02}", season, episode)) {
                return true;
            }
        }
        if let Some(episode) = query.episode {
            if contains_episode_number(&lower, episode) {
                return true;
            }
        }
        if let Some(abs) = query.absolute_episode {
            if contains_episode_number(&lower, abs) {
                return true;
            }
        }
        false
    }

    fn map_files(
        &self,
        files: Vec<JimakuFile>,
        query: &VideoQuery,
    ) -> Vec<SubtitleResult> {
        files
            .into_iter()
            .filter_map(|file| {
                let ext = file.name.rsplit('.').next().unwrap_or("");
                let format = SubtitleFormat::from_extension(ext)?;
                if !Self::file_matches_episode(&file.name, query) {
                    return None;
                }
                Some(SubtitleResult {
                    provider_name: self.name.clone(),
                    // Fansub archives carry source-language subtitles
                    language: query.source_language.clone(),
                    format,
                    download_url: file.url,
                    score: 0,
                    forced: false,
                    machine_translated: false,
                    mt_confidence: 0,
                    uploader_trust: 0,
                    hash: None,
                    release_info: Some(file.name),
                })
            })
            .collect()
    }
}

/// Match "- 04", "ep04", "e04", " 04 " style episode markers.
fn contains_episode_number(name: &str, number: u32) -> bool {
    let padded = format!("{:02}", number);
    let patterns = [
        format!("- {}", padded),
        format!("ep{}", padded),
        format!("e{}", padded),
        format!(" {} ", padded),
        format!("[{}]", padded),
    ];
    patterns.iter().any(|p| name.contains(p.as_str()))
}

// --- API response shapes ---------------------------------------------------

#[derive(Debug, Deserialize)]
struct JimakuEntry {
    id: u64,
    #[allow(dead_code)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct JimakuFile {
    url: String,
    name: String,
}

#[async_trait]
impl SubtitleProvider for JimakuProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn config_fields(&self) -> Vec<ConfigField> {
        vec![
            ConfigField {
                name: "url",
                label: "API base URL",
                kind: ConfigFieldKind::String,
                default: Some("https://jimaku.cc/api"),
                help_text: "Base URL of the archive API",
            },
            ConfigField {
                name: "api_key",
                label: "API key",
                kind: ConfigFieldKind::Secret,
                default: None,
                help_text: "Account API key",
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
        let url = format!(
            "{}/entries/search?query={}",
            self.api_base,
            urlencoding::encode(&query.title)
        );
        tracing::debug!(provider = %self.name, "Searching archive entries");

        let response = self
            .client
            .get(&url)
            .header("Authorization", &self.api_key)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        match status {
            200 => {}
            401 | 403 => return Err(ProviderError::Auth(format!("HTTP {}", status))),
            429 => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok());
                return Err(ProviderError::RateLimit {
                    retry_after_secs: retry_after,
                });
            }
            _ => {
                return Err(ProviderError::Network(format!("HTTP {}", status)));
            }
        }

        let entries: Vec<JimakuEntry> = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        let mut results = Vec::new();
        for entry in entries.into_iter().take(3) {
            let files_url = format!("{}/entries/{}/files", self.api_base, entry.id);
            let response = self
                .client
                .get(&files_url)
                .header("Authorization", &self.api_key)
                .send()
                .await
                .map_err(|e| ProviderError::Network(e.to_string()))?;
            if !response.status().is_success() {
                continue;
            }
            let files: Vec<JimakuFile> = response
                .json()
                .await
                .map_err(|e| ProviderError::Parse(e.to_string()))?;
            results.extend(self.map_files(files, query));
        }

        if results.is_empty() {
            return Err(ProviderError::Empty);
        }
        Ok(results)
    }

    async fn download(&self, result: &SubtitleResult) -> Result<Vec<u8>, ProviderError> {
        let response = self
            .client
            .get(&result.download_url)
            .header("Authorization", &self.api_key)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ProviderError::Network(format!(
                "download HTTP {}",
                response.status()
            )));
        }
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| ProviderError::Network(e.to_string()))
    }

    async fn health_check(&self) -> (bool, String) {
        let url = format!("{}/entries/search?query=test", self.api_base);
        match self
            .client
            .get(&url)
            .header("Authorization", &self.api_key)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => (true, "ok".to_string()),
            Ok(response) => (false, format!("HTTP {}", response.status())),
            Err(e) => (false, e.to_string()),
        }
    }
}
