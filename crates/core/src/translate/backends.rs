//! Translation backend implementations.
//!
//! Two LLM backends (Anthropic API, Ollama for local inference) share the
//! prompt contract from `prompt`; DeepL is a conventional MT API that
//! supports glossaries but neither references nor evaluation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::BackendInstanceConfig;
use crate::providers::{ConfigField, ConfigFieldKind};

use super::prompt::{
    build_evaluation_prompt, build_translation_prompt, parse_response_lines,
    DEFAULT_SYSTEM_PROMPT,
};
use super::types::{
    BackendCapabilities, TranslationBackend, TranslationError, TranslationRequest,
};

/// Max tokens budgeted per translated line.
const TOKENS_PER_LINE: u32 = 60;

// ============================================================================
// Anthropic
// ============================================================================

pub struct AnthropicBackend {
    name: String,
    client: reqwest::Client,
    api_key: String,
    model: String,
    api_base: String,
}

impl AnthropicBackend {
    pub fn new(config: &BackendInstanceConfig) -> Self {
        Self {
            name: config.name.clone(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .expect("Failed to create HTTP client"),
            api_key: config.api_key.clone().unwrap_or_default(),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| "claude-3-haiku-20240307".to_string()),
            api_base: config
                .url
                .clone()
                .unwrap_or_else(|| "https://api.anthropic.com".to_string())
                .trim_end_matches('/')
                .to_string(),
        }
    }

    async fn complete(
        &self,
        system: &str,
        prompt: String,
        max_tokens: u32,
    ) -> Result<String, TranslationError> {
        let request = AnthropicRequest {
            model: self.model.clone(),
            max_tokens,
            system: Some(system.to_string()),
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: prompt,
            }],
            temperature: Some(0.2),
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.api_base))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| TranslationError::BackendUnavailable(e.to_string()))?;

        let status = response.status().as_u16();
        if status == 401 || status == 403 {
            return Err(TranslationError::Auth(format!("HTTP {}", status)));
        }
        if status != 200 {
            let error_text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<AnthropicErrorBody>(&error_text)
                .map(|e| e.error.message)
                .unwrap_or(error_text);
            return Err(TranslationError::BackendUnavailable(format!(
                "HTTP {}: {}",
                status, message
            )));
        }

        let parsed: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| TranslationError::BadResponse(e.to_string()))?;

        Ok(parsed
            .content
            .into_iter()
            .filter(|c| c.content_type == "text")
            .map(|c| c.text)
            .collect::<Vec<_>>()
            .join(""))
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    content_type: String,
    text: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    error: AnthropicErrorDetail,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorDetail {
    message: String,
}

#[async_trait]
impl TranslationBackend for AnthropicBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "anthropic"
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            supports_glossary: true,
            supports_srt_reference: true,
            supports_evaluation: true,
        }
    }

    fn config_fields(&self) -> Vec<ConfigField> {
        vec![
            ConfigField {
                name: "api_key",
                label: "API key",
                kind: ConfigFieldKind::Secret,
                default: None,
                help_text: "Anthropic API key",
            },
            ConfigField {
                name: "model",
                label: "Model",
                kind: ConfigFieldKind::String,
                default: Some("claude-3-haiku-20240307"),
                help_text: "Model identifier",
            },
            ConfigField {
                name: "url",
                label: "API base URL",
                kind: ConfigFieldKind::String,
                default: Some("https://api.anthropic.com"),
                help_text: "Override for proxies",
            },
        ]
    }

    async fn translate_batch(
        &self,
        request: &TranslationRequest,
    ) -> Result<Vec<String>, TranslationError> {
        let system = request
            .system_prompt
            .as_deref()
            .unwrap_or(DEFAULT_SYSTEM_PROMPT);
        let prompt = build_translation_prompt(request);
        let max_tokens = (request.lines.len() as u32 * TOKENS_PER_LINE).clamp(512, 8192);

        let text = self.complete(system, prompt, max_tokens).await?;
        parse_response_lines(&text, request.lines.len()).ok_or_else(|| {
            TranslationError::LineCountMismatch {
                expected: request.lines.len(),
                got: text.lines().filter(|l| !l.trim().is_empty()).count(),
            }
        })
    }

    async fn evaluate_batch(
        &self,
        source: &[String],
        translated: &[String],
        source_language: &str,
        target_language: &str,
    ) -> Result<Vec<u8>, TranslationError> {
        let prompt =
            build_evaluation_prompt(source, translated, source_language, target_language);
        let text = self
            .complete(
                "You are a strict translation quality rater.",
                prompt,
                (source.len() as u32 * 8).clamp(128, 4096),
            )
            .await?;
        parse_scores(&text, source.len())
    }

    async fn health_check(&self) -> (bool, String) {
        if self.api_key.is_empty() {
            return (false, "no API key configured".to_string());
        }
        match self.complete("Reply with OK.", "ping".to_string(), 8).await {
            Ok(_) => (true, "ok".to_string()),
            Err(e) => (false, e.to_string()),
        }
    }
}

// ============================================================================
// Ollama
// ============================================================================

pub struct OllamaBackend {
    name: String,
    client: reqwest::Client,
    model: String,
    api_base: String,
}

impl OllamaBackend {
    pub fn new(config: &BackendInstanceConfig) -> Self {
        Self {
            name: config.name.clone(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(300))
                .build()
                .expect("Failed to create HTTP client"),
            model: config.model.clone().unwrap_or_else(|| "llama3".to_string()),
            api_base: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string())
                .trim_end_matches('/')
                .to_string(),
        }
    }

    async fn generate(&self, system: &str, prompt: String) -> Result<String, TranslationError> {
        let request = OllamaRequest {
            model: self.model.clone(),
            prompt,
            system: Some(system.to_string()),
            stream: false,
            options: Some(OllamaOptions {
                temperature: Some(0.2),
            }),
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.api_base))
            .json(&request)
            .send()
            .await
            .map_err(|e| TranslationError::BackendUnavailable(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<OllamaErrorBody>(&error_text)
                .map(|e| e.error)
                .unwrap_or(error_text);
            return Err(TranslationError::BackendUnavailable(format!(
                "HTTP {}: {}",
                status, message
            )));
        }

        let parsed: OllamaResponse = response
            .json()
            .await
            .map_err(|e| TranslationError::BadResponse(e.to_string()))?;
        Ok(parsed.response)
    }
}

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct OllamaErrorBody {
    error: String,
}

#[async_trait]
impl TranslationBackend for OllamaBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "ollama"
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            supports_glossary: true,
            supports_srt_reference: true,
            supports_evaluation: true,
        }
    }

    fn config_fields(&self) -> Vec<ConfigField> {
        vec![
            ConfigField {
                name: "url",
                label: "Server URL",
                kind: ConfigFieldKind::String,
                default: Some("http://localhost:11434"),
                help_text: "Ollama server address",
            },
            ConfigField {
                name: "model",
                label: "Model",
                kind: ConfigFieldKind::String,
                default: Some("llama3"),
                help_text: "Local model name",
            },
        ]
    }

    async fn translate_batch(
        &self,
        request: &TranslationRequest,
    ) -> Result<Vec<String>, TranslationError> {
        let system = request
            .system_prompt
            .as_deref()
            .unwrap_or(DEFAULT_SYSTEM_PROMPT);
        let prompt = build_translation_prompt(request);

        let text = self.generate(system, prompt).await?;
        parse_response_lines(&text, request.lines.len()).ok_or_else(|| {
            TranslationError::LineCountMismatch {
                expected: request.lines.len(),
                got: text.lines().filter(|l| !l.trim().is_empty()).count(),
            }
        })
    }

    async fn evaluate_batch(
        &self,
        source: &[String],
        translated: &[String],
        source_language: &str,
        target_language: &str,
    ) -> Result<Vec<u8>, TranslationError> {
        let prompt =
            build_evaluation_prompt(source, translated, source_language, target_language);
        let text = self
            .generate("You are a strict translation quality rater.", prompt)
            .await?;
        parse_scores(&text, source.len())
    }

    async fn health_check(&self) -> (bool, String) {
        match self
            .client
            .get(format!("{}/api/tags", self.api_base))
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => (true, "ok".to_string()),
            Ok(response) => (false, format!("HTTP {}", response.status())),
            Err(e) => (false, e.to_string()),
        }
    }
}

// ============================================================================
// DeepL
// ============================================================================

pub struct DeepLBackend {
    name: String,
    client: reqwest::Client,
    api_key: String,
    api_base: String,
}

impl DeepLBackend {
    pub fn new(config: &BackendInstanceConfig) -> Self {
        Self {
            name: config.name.clone(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .expect("Failed to create HTTP client"),
            api_key: config.api_key.clone().unwrap_or_default(),
            api_base: config
                .url
                .clone()
                .unwrap_or_else(|| "https://api-free.deepl.com/v2".to_string())
                .trim_end_matches('/')
                .to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DeepLResponse {
    translations: Vec<DeepLTranslation>,
}

#[derive(Debug, Deserialize)]
struct DeepLTranslation {
    text: String,
}

#[async_trait]
impl TranslationBackend for DeepLBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "deepl"
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            supports_glossary: true,
            supports_srt_reference: false,
            supports_evaluation: false,
        }
    }

    fn config_fields(&self) -> Vec<ConfigField> {
        vec![
            ConfigField {
                name: "api_key",
                label: "API key",
                kind: ConfigFieldKind::Secret,
                default: None,
                help_text: "DeepL auth key",
            },
            ConfigField {
                name: "url",
                label: "API base URL",
                kind: ConfigFieldKind::String,
                default: Some("https://api-free.deepl.com/v2"),
                help_text: "Free or pro endpoint",
            },
        ]
    }

    async fn translate_batch(
        &self,
        request: &TranslationRequest,
    ) -> Result<Vec<String>, TranslationError> {
        let body = serde_json::json!({
            "text": request.lines,
            "source_lang": request.source_language.to_uppercase(),
            "target_lang": request.target_language.to_uppercase(),
            "preserve_formatting": true,
        });

        let response = self
            .client
            .post(format!("{}/translate", self.api_base))
            .header("Authorization", format!("DeepL-Auth-Key {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| TranslationError::BackendUnavailable(e.to_string()))?;

        let status = response.status().as_u16();
        if status == 401 || status == 403 {
            return Err(TranslationError::Auth(format!("HTTP {}", status)));
        }
        if status != 200 {
            return Err(TranslationError::BackendUnavailable(format!(
                "HTTP {}",
                status
            )));
        }

        let parsed: DeepLResponse = response
            .json()
            .await
            .map_err(|e| TranslationError::BadResponse(e.to_string()))?;

        let lines: Vec<String> = parsed.translations.into_iter().map(|t| t.text).collect();
        if lines.len() != request.lines.len() {
            return Err(TranslationError::LineCountMismatch {
                expected: request.lines.len(),
                got: lines.len(),
            });
        }
        Ok(lines)
    }

    async fn health_check(&self) -> (bool, String) {
        match self
            .client
            .get(format!("{}/usage", self.api_base))
            .header("Authorization", format!("DeepL-Auth-Key {}", self.api_key))
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => (true, "ok".to_string()),
            Ok(response) => (false, format!("HTTP {}", response.status())),
            Err(e) => (false, e.to_string()),
        }
    }
}

/// Parse evaluator output: one integer per line, clamped to 0–100.
fn parse_scores(text: &str, expected: usize) -> Result<Vec<u8>, TranslationError> {
    let scores: Vec<u8> = text
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim().trim_end_matches('.');
            if trimmed.is_empty() {
                return None;
            }
            trimmed
                .split_whitespace()
                .next()
                .and_then(|tok| tok.parse::<i64>().ok())
                .map(|v| v.clamp(0, 100) as u8)
        })
        .collect();

    if scores.len() != expected {
        return Err(TranslationError::BadResponse(format!(
            "expected {} scores, got {}",
            expected,
            scores.len()
        )));
    }
    Ok(scores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendKind;

    fn backend_config(kind: BackendKind) -> BackendInstanceConfig {
        BackendInstanceConfig {
            kind,
            name: "test".to_string(),
            api_key: Some("key".to_string()),
            model: None,
            url: None,
            prompt_preset: None,
            single_line_fallback: false,
        }
    }

    #[test]
    fn test_anthropic_capabilities() {
        let backend = AnthropicBackend::new(&backend_config(BackendKind::Anthropic));
        let caps = backend.capabilities();
        assert!(caps.supports_glossary);
        assert!(caps.supports_srt_reference);
        assert!(caps.supports_evaluation);
        assert_eq!(backend.kind(), "anthropic");
        assert_eq!(backend.model, "claude-3-haiku-20240307");
    }

    #[test]
    fn test_deepl_capabilities() {
        let backend = DeepLBackend::new(&backend_config(BackendKind::Deepl));
        let caps = backend.capabilities();
        assert!(caps.supports_glossary);
        assert!(!caps.supports_srt_reference);
        assert!(!caps.supports_evaluation);
    }

    #[test]
    fn test_ollama_defaults() {
        let backend = OllamaBackend::new(&backend_config(BackendKind::Ollama));
        assert_eq!(backend.api_base, "http://localhost:11434");
        assert_eq!(backend.model, "llama3");
    }

    #[test]
    fn test_parse_scores() {
        let scores = parse_scores("90\n45\n100\n", 3).unwrap();
        assert_eq!(scores, vec![90, 45, 100]);
    }

    #[test]
    fn test_parse_scores_tolerates_noise() {
        let scores = parse_scores("90 (good)\n45.\n\n120\n", 3).unwrap();
        assert_eq!(scores, vec![90, 45, 100]);
    }

    #[test]
    fn test_parse_scores_count_mismatch() {
        assert!(parse_scores("90\n45\n", 3).is_err());
    }

    #[test]
    fn test_anthropic_request_serialization() {
        let request = AnthropicRequest {
            model: "claude-3-haiku-20240307".to_string(),
            max_tokens: 1024,
            system: Some("system".to_string()),
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: "prompt".to_string(),
            }],
            temperature: Some(0.2),
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"max_tokens\":1024"));
        assert!(json.contains("\"role\":\"user\""));
    }
}
