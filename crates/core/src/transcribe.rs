//! Audio transcription via a Whisper-compatible HTTP server.
//!
//! Transcription is an opaque tool: audio in, SRT out. It runs for minutes,
//! so callers always go through a queued job, never inline.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::WhisperConfig;

#[derive(Debug, Error)]
pub enum TranscribeError {
    #[error("Transcription service unavailable: {0}")]
    Unavailable(String),

    #[error("Transcription failed: {0}")]
    Failed(String),

    #[error("Audio file error: {0}")]
    Audio(String),
}

/// Outcome of a transcription run.
#[derive(Debug, Clone)]
pub struct TranscriptionOutcome {
    /// SRT content in the audio's language.
    pub srt_content: String,
    pub language: Option<String>,
    pub duration_ms: u64,
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe a 16 kHz mono WAV file into SRT.
    async fn transcribe(
        &self,
        audio_path: &Path,
        language_hint: Option<&str>,
    ) -> Result<TranscriptionOutcome, TranscribeError>;

    async fn health_check(&self) -> (bool, String);
}

/// OpenAI-compatible Whisper API client (`/v1/audio/transcriptions`).
pub struct WhisperClient {
    client: reqwest::Client,
    config: WhisperConfig,
}

impl WhisperClient {
    pub fn new(config: WhisperConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .expect("Failed to create HTTP client");
        Self { client, config }
    }
}

#[async_trait]
impl Transcriber for WhisperClient {
    async fn transcribe(
        &self,
        audio_path: &Path,
        language_hint: Option<&str>,
    ) -> Result<TranscriptionOutcome, TranscribeError> {
        let started = std::time::Instant::now();
        let bytes = tokio::fs::read(audio_path)
            .await
            .map_err(|e| TranscribeError::Audio(e.to_string()))?;

        let file_name = audio_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio.wav".to_string());

        let mut form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            )
            .text("model", self.config.model.clone())
            .text("response_format", "srt");
        if let Some(language) = language_hint {
            form = form.text("language", language.to_string());
        }

        let mut request = self
            .client
            .post(format!(
                "{}/v1/audio/transcriptions",
                self.config.url.trim_end_matches('/')
            ))
            .multipart(form);
        if let Some(api_key) = &self.config.api_key {
            request = request.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| TranscribeError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TranscribeError::Failed(format!(
                "HTTP {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let srt_content = response
            .text()
            .await
            .map_err(|e| TranscribeError::Failed(e.to_string()))?;

        if crate::subtitle::SrtFile::parse(&srt_content).is_err() {
            return Err(TranscribeError::Failed(
                "service response does not parse as SRT".to_string(),
            ));
        }

        Ok(TranscriptionOutcome {
            srt_content,
            language: language_hint.map(String::from),
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn health_check(&self) -> (bool, String) {
        let url = format!("{}/v1/models", self.config.url.trim_end_matches('/'));
        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => (true, "ok".to_string()),
            Ok(response) => (false, format!("HTTP {}", response.status())),
            Err(e) => (false, e.to_string()),
        }
    }
}
