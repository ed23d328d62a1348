//! Types for the subtitle provider system.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::subtitle::{canonical_language, SubtitleFormat};

/// Query parameters for a provider search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoQuery {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub absolute_episode: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u32>,
    pub source_language: String,
    pub target_language: String,
    /// Search for forced/signs tracks only.
    #[serde(default)]
    pub forced_only: bool,
    pub is_episode: bool,
}

impl VideoQuery {
    /// Canonical query form used for cache keys and title matching:
    /// lowercased, diacritics folded, punctuation collapsed to spaces.
    pub fn canonical_form(&self) -> String {
        let mut parts = vec![canonical_text(&self.title)];
        if let Some(season) = self.season {
            parts.push(format!("s{:02}", season));
        }
        if let Some(episode) = self.episode {
            parts.push(format!("e{:02}", episode));
        }
        if let Some(abs) = self.absolute_episode {
            parts.push(format!("abs{}", abs));
        }
        if let Some(year) = self.year {
            parts.push(year.to_string());
        }
        if self.forced_only {
            parts.push("forced".to_string());
        }
        parts.push(canonical_language(&self.source_language));
        parts.push(canonical_language(&self.target_language));
        parts.join(" ")
    }
}

/// Fold common diacritics and collapse punctuation for matching.
pub fn canonical_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.to_lowercase().chars() {
        let folded = match c {
            'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
            'è' | 'é' | 'ê' | 'ë' => 'e',
            'ì' | 'í' | 'î' | 'ï' => 'i',
            'ò' | 'ó' | 'ô' | 'õ' | 'ö' => 'o',
            'ù' | 'ú' | 'û' | 'ü' => 'u',
            'ý' | 'ÿ' => 'y',
            'ñ' => 'n',
            'ç' => 'c',
            'ß' => 's',
            c if c.is_alphanumeric() => c,
            _ => ' ',
        };
        out.push(folded);
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A subtitle candidate returned by a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtitleResult {
    pub provider_name: String,
    pub language: String,
    pub format: SubtitleFormat,
    pub download_url: String,
    /// Filled in by the scoring pass.
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub forced: bool,
    #[serde(default)]
    pub machine_translated: bool,
    /// Confidence 0–100 that this is a machine translation.
    #[serde(default)]
    pub mt_confidence: u8,
    /// Provider-ranked uploader trust, 0–20.
    #[serde(default)]
    pub uploader_trust: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_info: Option<String>,
}

/// Outcome of a manager-level search.
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub results: Vec<SubtitleResult>,
    pub duration_ms: u64,
    /// Providers that failed this round (name -> error message).
    #[serde(default, skip_serializing_if = "std::collections::HashMap::is_empty")]
    pub provider_errors: std::collections::HashMap<String, String>,
    /// Providers served from cache.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cache_hits: Vec<String>,
}

/// A downloaded, validated subtitle artifact.
#[derive(Debug, Clone)]
pub struct DownloadedSubtitle {
    pub content: String,
    pub format: SubtitleFormat,
    pub content_hash: String,
    pub provider_name: String,
}

/// Errors inside the provider layer. These never propagate above the
/// manager: they open breakers and are reported as empty search results.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Rate limited, retry after {retry_after_secs:?}s")]
    RateLimit { retry_after_secs: Option<u64> },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("No results")]
    Empty,
}

/// A self-describing configuration field (rendered by the UI).
#[derive(Debug, Clone, Serialize)]
pub struct ConfigField {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: ConfigFieldKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<&'static str>,
    pub help_text: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "options")]
pub enum ConfigFieldKind {
    String,
    Int,
    Bool,
    Secret,
    Select(&'static [&'static str]),
}

/// Abstract subtitle provider contract.
#[async_trait]
pub trait SubtitleProvider: Send + Sync {
    /// Instance name (unique per configured provider).
    fn name(&self) -> &str;

    /// Does the provider filter forced subtitles at the source (e.g. via a
    /// `foreign_parts_only` flag)?
    fn supports_native_forced_filter(&self) -> bool {
        false
    }

    /// Configuration schema for the UI.
    fn config_fields(&self) -> Vec<ConfigField>;

    async fn search(&self, query: &VideoQuery) -> Result<Vec<SubtitleResult>, ProviderError>;

    /// Download the raw artifact bytes (possibly an archive).
    async fn download(&self, result: &SubtitleResult) -> Result<Vec<u8>, ProviderError>;

    async fn health_check(&self) -> (bool, String);
}
