//! Testing utilities and mock implementations.
//!
//! Mock implementations of every external service trait, allowing
//! comprehensive tests without real infrastructure.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::integrations::{
    ArrEpisode, ArrKind, ArrMovie, ArrSeries, IntegrationError, InventoryClient, MediaServer,
    RefreshKind,
};
use crate::media::{MediaError, MediaInfo, MediaProber};
use crate::providers::{ConfigField, ProviderError, SubtitleProvider, SubtitleResult, VideoQuery};
use crate::transcribe::{TranscribeError, TranscriptionOutcome, Transcriber};
use crate::translate::{
    BackendCapabilities, TranslationBackend, TranslationError, TranslationRequest,
};

// ---------------------------------------------------------------------------
// MockProvider
// ---------------------------------------------------------------------------

pub struct MockProvider {
    name: String,
    results: Vec<SubtitleResult>,
    fail: bool,
    download_payload: Vec<u8>,
    calls: Arc<AtomicUsize>,
}

impl MockProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            results: Vec::new(),
            fail: false,
            download_payload: Vec::new(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_results(mut self, results: Vec<SubtitleResult>) -> Self {
        self.results = results;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn with_download(mut self, payload: Vec<u8>) -> Self {
        self.download_payload = payload;
        self
    }

    /// Search invocation counter, shared with the caller.
    pub fn call_count(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl SubtitleProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn config_fields(&self) -> Vec<ConfigField> {
        Vec::new()
    }

    async fn search(&self, _query: &VideoQuery) -> Result<Vec<SubtitleResult>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ProviderError::Network("mock failure".to_string()));
        }
        if self.results.is_empty() {
            return Err(ProviderError::Empty);
        }
        Ok(self.results.clone())
    }

    async fn download(&self, _result: &SubtitleResult) -> Result<Vec<u8>, ProviderError> {
        if self.fail {
            return Err(ProviderError::Network("mock failure".to_string()));
        }
        Ok(self.download_payload.clone())
    }

    async fn health_check(&self) -> (bool, String) {
        (!self.fail, "mock".to_string())
    }
}

// ---------------------------------------------------------------------------
// MockBackend
// ---------------------------------------------------------------------------

type TranslateFn = Box<dyn Fn(&str) -> String + Send + Sync>;

pub struct MockBackend {
    name: String,
    translate: Option<TranslateFn>,
    fail_message: Option<String>,
    scores: Option<Vec<u8>>,
    eval_calls: AtomicUsize,
    mismatch_batches: bool,
    calls: Arc<AtomicUsize>,
    sent: Arc<Mutex<Vec<String>>>,
}

impl MockBackend {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            translate: None,
            fail_message: None,
            scores: None,
            eval_calls: AtomicUsize::new(0),
            mismatch_batches: false,
            calls: Arc::new(AtomicUsize::new(0)),
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn translating(mut self, f: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        self.translate = Some(Box::new(f));
        self
    }

    pub fn failing(mut self, message: &str) -> Self {
        self.fail_message = Some(message.to_string());
        self
    }

    /// Evaluation returns this score for every line, on every call.
    pub fn scoring(mut self, score: u8) -> Self {
        self.scores = Some(vec![score]);
        self
    }

    /// Evaluation returns `scores[n]` for every line on the n-th call
    /// (sticking to the last entry once exhausted).
    pub fn scoring_sequence(mut self, scores: Vec<u8>) -> Self {
        self.scores = Some(scores);
        self
    }

    /// Batch requests with more than one line fail with a count mismatch.
    pub fn mismatch_on_batches(mut self) -> Self {
        self.mismatch_batches = true;
        self
    }

    pub fn call_count(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    /// Every line ever sent to `translate_batch`, in order.
    pub fn sent_lines(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.sent)
    }
}

#[async_trait]
impl TranslationBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "mock"
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            supports_glossary: true,
            supports_srt_reference: true,
            supports_evaluation: self.scores.is_some(),
        }
    }

    fn config_fields(&self) -> Vec<ConfigField> {
        Vec::new()
    }

    async fn translate_batch(
        &self,
        request: &TranslationRequest,
    ) -> Result<Vec<String>, TranslationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.fail_message {
            return Err(TranslationError::BackendUnavailable(message.clone()));
        }
        if self.mismatch_batches && request.lines.len() > 1 {
            return Err(TranslationError::LineCountMismatch {
                expected: request.lines.len(),
                got: request.lines.len() + 1,
            });
        }
        self.sent
            .lock()
            .unwrap()
            .extend(request.lines.iter().cloned());
        let translate = self
            .translate
            .as_ref()
            .ok_or(TranslationError::Unsupported)?;
        Ok(request.lines.iter().map(|l| translate(l)).collect())
    }

    async fn evaluate_batch(
        &self,
        source: &[String],
        _translated: &[String],
        _source_language: &str,
        _target_language: &str,
    ) -> Result<Vec<u8>, TranslationError> {
        let Some(scores) = &self.scores else {
            return Err(TranslationError::Unsupported);
        };
        let call = self.eval_calls.fetch_add(1, Ordering::SeqCst);
        let score = scores[call.min(scores.len() - 1)];
        Ok(vec![score; source.len()])
    }

    async fn health_check(&self) -> (bool, String) {
        (self.fail_message.is_none(), "mock".to_string())
    }
}

// ---------------------------------------------------------------------------
// MockMediaServer
// ---------------------------------------------------------------------------

pub struct MockMediaServer {
    name: String,
    fail: bool,
    calls: Arc<AtomicUsize>,
}

impl MockMediaServer {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fail: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn call_count(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl MediaServer for MockMediaServer {
    fn instance_name(&self) -> &str {
        &self.name
    }

    async fn refresh_item(&self, _path: &str, _kind: RefreshKind) -> Result<(), IntegrationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(IntegrationError::Connection("mock failure".to_string()));
        }
        Ok(())
    }

    async fn health_check(&self) -> (bool, String) {
        (!self.fail, "mock".to_string())
    }
}

// ---------------------------------------------------------------------------
// MockProber
// ---------------------------------------------------------------------------

pub struct MockProber {
    info: MediaInfo,
    stream_contents: Mutex<std::collections::HashMap<usize, String>>,
    fail_probe: bool,
}

impl MockProber {
    pub fn new() -> Self {
        Self {
            info: MediaInfo::default(),
            stream_contents: Mutex::new(std::collections::HashMap::new()),
            fail_probe: false,
        }
    }

    pub fn with_info(mut self, info: MediaInfo) -> Self {
        self.info = info;
        self
    }

    /// Content written when `extract_subtitle` targets this stream index.
    pub fn with_stream_content(self, index: usize, content: &str) -> Self {
        self.stream_contents
            .lock()
            .unwrap()
            .insert(index, content.to_string());
        self
    }

    pub fn failing_probe(mut self) -> Self {
        self.fail_probe = true;
        self
    }
}

impl Default for MockProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaProber for MockProber {
    async fn probe(&self, path: &Path) -> Result<MediaInfo, MediaError> {
        if self.fail_probe {
            return Err(MediaError::Probe("mock probe failure".to_string()));
        }
        if !path.exists() {
            return Err(MediaError::NotFound(path.display().to_string()));
        }
        Ok(self.info.clone())
    }

    async fn extract_subtitle(
        &self,
        _path: &Path,
        stream_index: usize,
        dest: &Path,
    ) -> Result<(), MediaError> {
        let contents = self.stream_contents.lock().unwrap();
        let content = contents
            .get(&stream_index)
            .ok_or(MediaError::NotText(stream_index))?;
        std::fs::write(dest, content).map_err(|e| MediaError::Extract(e.to_string()))?;
        Ok(())
    }

    async fn extract_audio(
        &self,
        _path: &Path,
        _stream_index: usize,
        dest: &Path,
    ) -> Result<(), MediaError> {
        std::fs::write(dest, b"RIFFfake-wav").map_err(|e| MediaError::Extract(e.to_string()))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockTranscriber
// ---------------------------------------------------------------------------

pub struct MockTranscriber {
    srt_content: String,
    fail: bool,
}

impl MockTranscriber {
    pub fn new(srt_content: &str) -> Self {
        Self {
            srt_content: srt_content.to_string(),
            fail: false,
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(
        &self,
        _audio_path: &Path,
        language_hint: Option<&str>,
    ) -> Result<TranscriptionOutcome, TranscribeError> {
        if self.fail {
            return Err(TranscribeError::Failed("mock failure".to_string()));
        }
        Ok(TranscriptionOutcome {
            srt_content: self.srt_content.clone(),
            language: language_hint.map(String::from),
            duration_ms: 42,
        })
    }

    async fn health_check(&self) -> (bool, String) {
        (!self.fail, "mock".to_string())
    }
}

// ---------------------------------------------------------------------------
// MockInventory
// ---------------------------------------------------------------------------

pub struct MockInventory {
    name: String,
    kind: ArrKind,
    series: Vec<ArrSeries>,
    episodes: Vec<ArrEpisode>,
    movies: Vec<ArrMovie>,
}

impl MockInventory {
    pub fn sonarr(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ArrKind::Sonarr,
            series: Vec::new(),
            episodes: Vec::new(),
            movies: Vec::new(),
        }
    }

    pub fn radarr(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ArrKind::Radarr,
            series: Vec::new(),
            episodes: Vec::new(),
            movies: Vec::new(),
        }
    }

    pub fn with_series(mut self, series: Vec<ArrSeries>) -> Self {
        self.series = series;
        self
    }

    pub fn with_episodes(mut self, episodes: Vec<ArrEpisode>) -> Self {
        self.episodes = episodes;
        self
    }

    pub fn with_movies(mut self, movies: Vec<ArrMovie>) -> Self {
        self.movies = movies;
        self
    }
}

#[async_trait]
impl InventoryClient for MockInventory {
    fn instance_name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ArrKind {
        self.kind
    }

    async fn fetch_series(&self) -> Result<Vec<ArrSeries>, IntegrationError> {
        Ok(self.series.clone())
    }

    async fn fetch_episodes(&self, series_id: i64) -> Result<Vec<ArrEpisode>, IntegrationError> {
        Ok(self
            .episodes
            .iter()
            .filter(|e| e.series_id == series_id)
            .cloned()
            .collect())
    }

    async fn fetch_movies(&self) -> Result<Vec<ArrMovie>, IntegrationError> {
        Ok(self.movies.clone())
    }

    fn map_path(&self, remote: &str) -> String {
        remote.to_string()
    }

    async fn health_check(&self) -> (bool, String) {
        (true, "mock".to_string())
    }
}
