use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub auth: AuthConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub library: LibraryConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    #[serde(default)]
    pub providers: Vec<ProviderInstanceConfig>,
    #[serde(default)]
    pub translation: TranslationConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whisper: Option<WhisperConfig>,
    #[serde(default)]
    pub sonarr: Vec<ArrInstanceConfig>,
    #[serde(default)]
    pub radarr: Vec<ArrInstanceConfig>,
    #[serde(default)]
    pub media_servers: Vec<MediaServerConfig>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    "0.0.0.0".parse().unwrap()
}

fn default_port() -> u16 {
    6767
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "sublarr.db".to_string()
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    pub method: AuthMethod,
    /// API key, required when method is `api_key`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    None,
    ApiKey,
}

/// Library-wide language defaults. Per-series/movie assignments live in the
/// language_profiles tables and override these.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LibraryConfig {
    #[serde(default = "default_source_language")]
    pub source_language: String,
    #[serde(default = "default_target_languages")]
    pub target_languages: Vec<String>,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            source_language: default_source_language(),
            target_languages: default_target_languages(),
        }
    }
}

fn default_source_language() -> String {
    "en".to_string()
}

fn default_target_languages() -> Vec<String> {
    vec!["de".to_string()]
}

/// Wanted scanner configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScannerConfig {
    /// Hours between scheduled scans.
    #[serde(default = "default_scan_interval_hours")]
    pub interval_hours: u64,
    /// Every K-th cycle runs a full scan instead of an incremental one.
    #[serde(default = "default_full_scan_every")]
    pub full_scan_every: u32,
    /// Parallel ffprobe workers.
    #[serde(default = "default_probe_workers")]
    pub probe_workers: usize,
    /// Extract embedded source subtitles as soon as a wanted item is created.
    #[serde(default)]
    pub auto_extract: bool,
    /// Chain a translation right after auto-extraction.
    #[serde(default)]
    pub auto_translate: bool,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            interval_hours: default_scan_interval_hours(),
            full_scan_every: default_full_scan_every(),
            probe_workers: default_probe_workers(),
            auto_extract: false,
            auto_translate: false,
        }
    }
}

fn default_scan_interval_hours() -> u64 {
    6
}

fn default_full_scan_every() -> u32 {
    6
}

fn default_probe_workers() -> usize {
    4
}

/// Acquisition pipeline configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AcquisitionConfig {
    /// Days since the file was added during which SRT→ASS upgrades are tried.
    #[serde(default = "default_upgrade_window_days")]
    pub upgrade_window_days: u32,
    /// Remove the SRT after a successful ASS upgrade.
    #[serde(default)]
    pub upgrade_delete_srt: bool,
    /// Give up on a wanted item after this many failed search rounds.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Minimum provider score below which the Whisper fallback kicks in.
    #[serde(default = "default_whisper_score_threshold")]
    pub whisper_score_threshold: i64,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            upgrade_window_days: default_upgrade_window_days(),
            upgrade_delete_srt: false,
            max_attempts: default_max_attempts(),
            whisper_score_threshold: default_whisper_score_threshold(),
        }
    }
}

fn default_upgrade_window_days() -> u32 {
    7
}

fn default_max_attempts() -> u32 {
    5
}

fn default_whisper_score_threshold() -> i64 {
    50
}

/// One configured subtitle provider.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderInstanceConfig {
    /// Provider kind: "opensubtitles" or "jimaku".
    pub kind: ProviderKind,
    /// Instance name, unique across providers.
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Added to every result score from this provider.
    #[serde(default)]
    pub score_modifier: i64,
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Opensubtitles,
    Jimaku,
}

fn default_true() -> bool {
    true
}

fn default_provider_timeout() -> u32 {
    15
}

/// Translation chain configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TranslationConfig {
    /// Ordered fallback chain of backend instances.
    #[serde(default)]
    pub backends: Vec<BackendInstanceConfig>,
    /// Dialogue lines per LLM request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub quality: QualityConfig,
    #[serde(default)]
    pub memory: TranslationMemoryConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendInstanceConfig {
    /// Backend kind: "anthropic", "ollama" or "deepl".
    pub kind: BackendKind,
    /// Instance name, unique across the chain.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Prompt preset id; falls back to the built-in prompt when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_preset: Option<i64>,
    /// Retry each failing line individually after a line-count mismatch.
    #[serde(default)]
    pub single_line_fallback: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Anthropic,
    Ollama,
    Deepl,
}

/// Self-evaluation configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QualityConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Lines scoring below this are retried.
    #[serde(default = "default_quality_threshold")]
    pub threshold: u8,
    #[serde(default = "default_quality_retries")]
    pub max_retries: u32,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: default_quality_threshold(),
            max_retries: default_quality_retries(),
        }
    }
}

fn default_quality_threshold() -> u8 {
    50
}

fn default_quality_retries() -> u32 {
    2
}

fn default_batch_size() -> usize {
    50
}

/// Translation memory configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranslationMemoryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Similarity threshold for lookups (0.0–1.0).
    #[serde(default = "default_tm_similarity")]
    pub similarity_threshold: f64,
}

impl Default for TranslationMemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            similarity_threshold: default_tm_similarity(),
        }
    }
}

fn default_tm_similarity() -> f64 {
    0.9
}

/// Whisper transcription fallback
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WhisperConfig {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_whisper_model")]
    pub model: String,
    #[serde(default = "default_whisper_concurrent")]
    pub max_concurrent: usize,
    /// Transcription can take minutes; this bounds a single request.
    #[serde(default = "default_whisper_timeout")]
    pub timeout_secs: u32,
}

fn default_whisper_model() -> String {
    "whisper-1".to_string()
}

fn default_whisper_concurrent() -> usize {
    1
}

fn default_whisper_timeout() -> u32 {
    1800
}

/// A Sonarr- or Radarr-compatible inventory instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArrInstanceConfig {
    pub name: String,
    pub url: String,
    pub api_key: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Maps the instance's remote path prefix to the local mount.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_map: Option<PathMapConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PathMapConfig {
    pub remote: String,
    pub local: String,
}

/// A media server to notify after subtitle writes.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MediaServerConfig {
    /// Server kind: "plex" or "jellyfin".
    pub kind: MediaServerKind,
    pub name: String,
    pub url: String,
    pub token: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaServerKind {
    Plex,
    Jellyfin,
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub auth: SanitizedAuthConfig,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub library: LibraryConfig,
    pub scanner: ScannerConfig,
    pub acquisition: AcquisitionConfig,
    pub providers: Vec<SanitizedProviderConfig>,
    pub translation: SanitizedTranslationConfig,
    pub whisper_configured: bool,
    pub sonarr: Vec<SanitizedArrConfig>,
    pub radarr: Vec<SanitizedArrConfig>,
    pub media_servers: Vec<SanitizedMediaServerConfig>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedAuthConfig {
    pub method: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedProviderConfig {
    pub kind: ProviderKind,
    pub name: String,
    pub enabled: bool,
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub score_modifier: i64,
    pub timeout_secs: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedTranslationConfig {
    pub backends: Vec<SanitizedBackendConfig>,
    pub batch_size: usize,
    pub quality: QualityConfig,
    pub memory: TranslationMemoryConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedBackendConfig {
    pub kind: BackendKind,
    pub name: String,
    pub model: Option<String>,
    pub url: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedArrConfig {
    pub name: String,
    pub url: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedMediaServerConfig {
    pub kind: MediaServerKind,
    pub name: String,
    pub url: String,
    pub enabled: bool,
}

/// Replacement for secret values in sanitized output.
pub const MASKED: &str = "********";

fn mask(secret: &Option<String>) -> Option<String> {
    secret.as_ref().map(|_| MASKED.to_string())
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            auth: SanitizedAuthConfig {
                method: match config.auth.method {
                    AuthMethod::None => "none".to_string(),
                    AuthMethod::ApiKey => "api_key".to_string(),
                },
            },
            server: config.server.clone(),
            database: config.database.clone(),
            library: config.library.clone(),
            scanner: config.scanner.clone(),
            acquisition: config.acquisition.clone(),
            providers: config
                .providers
                .iter()
                .map(|p| SanitizedProviderConfig {
                    kind: p.kind,
                    name: p.name.clone(),
                    enabled: p.enabled,
                    url: p.url.clone(),
                    api_key: mask(&p.api_key),
                    score_modifier: p.score_modifier,
                    timeout_secs: p.timeout_secs,
                })
                .collect(),
            translation: SanitizedTranslationConfig {
                backends: config
                    .translation
                    .backends
                    .iter()
                    .map(|b| SanitizedBackendConfig {
                        kind: b.kind,
                        name: b.name.clone(),
                        model: b.model.clone(),
                        url: b.url.clone(),
                        api_key: mask(&b.api_key),
                    })
                    .collect(),
                batch_size: config.translation.batch_size,
                quality: config.translation.quality.clone(),
                memory: config.translation.memory.clone(),
            },
            whisper_configured: config.whisper.is_some(),
            sonarr: config.sonarr.iter().map(sanitize_arr).collect(),
            radarr: config.radarr.iter().map(sanitize_arr).collect(),
            media_servers: config
                .media_servers
                .iter()
                .map(|m| SanitizedMediaServerConfig {
                    kind: m.kind,
                    name: m.name.clone(),
                    url: m.url.clone(),
                    enabled: m.enabled,
                })
                .collect(),
        }
    }
}

fn sanitize_arr(a: &ArrInstanceConfig) -> SanitizedArrConfig {
    SanitizedArrConfig {
        name: a.name.clone(),
        url: a.url.clone(),
        enabled: a.enabled,
    }
}
