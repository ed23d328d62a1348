//! Types for the translation system.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::providers::ConfigField;

/// Errors inside the translation layer. These advance the fallback chain
/// and only surface once every backend has been exhausted.
#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Bad response: {0}")]
    BadResponse(String),

    #[error("Line count mismatch: expected {expected}, got {got}")]
    LineCountMismatch { expected: usize, got: usize },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Operation not supported by this backend")]
    Unsupported,
}

/// Capability flags a backend advertises.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BackendCapabilities {
    pub supports_glossary: bool,
    pub supports_srt_reference: bool,
    /// Can score translations (LLM backends).
    pub supports_evaluation: bool,
}

/// One batch translation request.
#[derive(Debug, Clone, Default)]
pub struct TranslationRequest {
    pub lines: Vec<String>,
    pub source_language: String,
    pub target_language: String,
    /// (source term, target term) pairs.
    pub glossary: Vec<(String, String)>,
    /// Same-video target-language SRT lines, used as tone/vocabulary
    /// context only (never line-aligned).
    pub srt_reference: Option<Vec<String>>,
    /// Overrides the built-in system prompt (prompt presets).
    pub system_prompt: Option<String>,
}

/// Per-backend attempt record inside a chain call.
#[derive(Debug, Clone, Serialize)]
pub struct BackendAttempt {
    pub backend: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub latency_ms: u64,
}

/// Result of a chain translation.
#[derive(Debug, Clone, Serialize)]
pub struct TranslationOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub lines: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_used: Option<String>,
    pub attempts: Vec<BackendAttempt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TranslationOutcome {
    pub fn failure(attempts: Vec<BackendAttempt>) -> Self {
        let error = attempts
            .iter()
            .filter_map(|a| a.error.as_deref())
            .collect::<Vec<_>>()
            .join("; ");
        Self {
            success: false,
            lines: Vec::new(),
            backend_used: None,
            attempts,
            error: Some(if error.is_empty() {
                "no backends configured".to_string()
            } else {
                error
            }),
        }
    }
}

/// Abstract translation backend.
#[async_trait]
pub trait TranslationBackend: Send + Sync {
    /// Instance name (unique in the chain).
    fn name(&self) -> &str;

    /// Backend kind ("anthropic", "ollama", "deepl").
    fn kind(&self) -> &'static str;

    fn capabilities(&self) -> BackendCapabilities;

    fn config_fields(&self) -> Vec<ConfigField>;

    /// Translate a batch; must return exactly one output line per input line.
    async fn translate_batch(
        &self,
        request: &TranslationRequest,
    ) -> Result<Vec<String>, TranslationError>;

    /// Score translated lines 0–100 against their sources. Only meaningful
    /// when `supports_evaluation` is set.
    async fn evaluate_batch(
        &self,
        _source: &[String],
        _translated: &[String],
        _source_language: &str,
        _target_language: &str,
    ) -> Result<Vec<u8>, TranslationError> {
        Err(TranslationError::Unsupported)
    }

    async fn health_check(&self) -> (bool, String);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_outcome_aggregates_errors() {
        let outcome = TranslationOutcome::failure(vec![
            BackendAttempt {
                backend: "primary".to_string(),
                success: false,
                error: Some("HTTP 503".to_string()),
                latency_ms: 120,
            },
            BackendAttempt {
                backend: "secondary".to_string(),
                success: false,
                error: Some("timeout".to_string()),
                latency_ms: 15000,
            },
        ]);
        assert!(!outcome.success);
        let error = outcome.error.unwrap();
        assert!(error.contains("HTTP 503"));
        assert!(error.contains("timeout"));
    }

    #[test]
    fn test_failure_outcome_empty_chain() {
        let outcome = TranslationOutcome::failure(vec![]);
        assert_eq!(outcome.error.as_deref(), Some("no backends configured"));
    }
}
