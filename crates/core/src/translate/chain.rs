//! Fallback chain over translation backends.

use std::sync::Arc;
use std::time::Instant;

use crate::breaker::BreakerRegistry;

use super::types::{
    BackendAttempt, TranslationBackend, TranslationError, TranslationOutcome, TranslationRequest,
};

/// Breaker kind for translation backends.
pub const BREAKER_KIND: &str = "backend";

pub struct ChainEntry {
    pub backend: Arc<dyn TranslationBackend>,
    /// Retry line-by-line after a line-count mismatch.
    pub single_line_fallback: bool,
}

/// Ordered list of backend instances tried in turn.
pub struct FallbackChain {
    entries: Vec<ChainEntry>,
    breakers: Arc<BreakerRegistry>,
}

impl FallbackChain {
    pub fn new(entries: Vec<ChainEntry>, breakers: Arc<BreakerRegistry>) -> Self {
        Self { entries, breakers }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn backends(&self) -> impl Iterator<Item = &Arc<dyn TranslationBackend>> {
        self.entries.iter().map(|e| &e.backend)
    }

    /// Restrict the chain to the named instances, in the given order.
    /// Unknown names are ignored; an empty selection keeps the full chain.
    pub fn subchain(&self, names: &[String]) -> Vec<&ChainEntry> {
        if names.is_empty() {
            return self.entries.iter().collect();
        }
        names
            .iter()
            .filter_map(|name| self.entries.iter().find(|e| e.backend.name() == name))
            .collect()
    }

    /// Try each backend in order until one succeeds.
    ///
    /// OPEN breakers are skipped. On failure the error is recorded and the
    /// chain advances. When every backend fails the outcome carries the
    /// per-backend error array.
    pub async fn translate_with_fallback(
        &self,
        request: &TranslationRequest,
        backend_names: &[String],
    ) -> TranslationOutcome {
        let mut attempts = Vec::new();

        for entry in self.subchain(backend_names) {
            let backend = &entry.backend;
            let breaker = self.breakers.get(BREAKER_KIND, backend.name());
            if !breaker.allow() {
                attempts.push(BackendAttempt {
                    backend: backend.name().to_string(),
                    success: false,
                    error: Some("circuit breaker open".to_string()),
                    latency_ms: 0,
                });
                continue;
            }

            // Strip request features the backend cannot honor
            let mut effective = request.clone();
            let caps = backend.capabilities();
            if !caps.supports_glossary {
                effective.glossary.clear();
            }
            if !caps.supports_srt_reference {
                effective.srt_reference = None;
            }

            let started = Instant::now();
            let mut result = backend.translate_batch(&effective).await;

            // Line-count mismatches can often be recovered by translating
            // each line individually.
            if entry.single_line_fallback {
                if let Err(TranslationError::LineCountMismatch { .. }) = &result {
                    tracing::warn!(
                        backend = backend.name(),
                        "Line count mismatch, retrying line by line"
                    );
                    result = Self::translate_single_lines(backend, &effective).await;
                }
            }

            let latency_ms = started.elapsed().as_millis() as u64;
            match result {
                Ok(lines) => {
                    breaker.record_success();
                    attempts.push(BackendAttempt {
                        backend: backend.name().to_string(),
                        success: true,
                        error: None,
                        latency_ms,
                    });
                    return TranslationOutcome {
                        success: true,
                        lines,
                        backend_used: Some(backend.name().to_string()),
                        attempts,
                        error: None,
                    };
                }
                Err(e) => {
                    breaker.record_failure();
                    tracing::warn!(
                        backend = backend.name(),
                        error = %e,
                        "Backend translation failed, advancing chain"
                    );
                    attempts.push(BackendAttempt {
                        backend: backend.name().to_string(),
                        success: false,
                        error: Some(e.to_string()),
                        latency_ms,
                    });
                }
            }
        }

        TranslationOutcome::failure(attempts)
    }

    async fn translate_single_lines(
        backend: &Arc<dyn TranslationBackend>,
        request: &TranslationRequest,
    ) -> Result<Vec<String>, TranslationError> {
        let mut translated = Vec::with_capacity(request.lines.len());
        for line in &request.lines {
            let single = TranslationRequest {
                lines: vec![line.clone()],
                ..request.clone()
            };
            let mut lines = backend.translate_batch(&single).await?;
            translated.push(lines.pop().unwrap_or_default());
        }
        Ok(translated)
    }

    /// Evaluate translations, preferring the producing backend.
    ///
    /// When the producing backend cannot evaluate (no capability, open
    /// breaker, or error) the next evaluation-capable backend in the chain
    /// is tried. Returns None when nobody can score; callers fall back to a
    /// neutral score and never fail the job over this.
    pub async fn evaluate(
        &self,
        source: &[String],
        translated: &[String],
        source_language: &str,
        target_language: &str,
        preferred_backend: Option<&str>,
    ) -> Option<Vec<u8>> {
        let mut ordered: Vec<&ChainEntry> = Vec::new();
        if let Some(name) = preferred_backend {
            if let Some(entry) = self.entries.iter().find(|e| e.backend.name() == name) {
                ordered.push(entry);
            }
        }
        for entry in &self.entries {
            if Some(entry.backend.name()) != preferred_backend {
                ordered.push(entry);
            }
        }

        for entry in ordered {
            let backend = &entry.backend;
            if !backend.capabilities().supports_evaluation {
                continue;
            }
            let breaker = self.breakers.get(BREAKER_KIND, backend.name());
            if breaker.is_open() {
                continue;
            }
            match backend
                .evaluate_batch(source, translated, source_language, target_language)
                .await
            {
                Ok(scores) => return Some(scores),
                Err(e) => {
                    tracing::debug!(backend = backend.name(), "Evaluation failed: {}", e);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::BreakerConfig;
    use crate::testing::MockBackend;

    fn chain(entries: Vec<ChainEntry>) -> FallbackChain {
        FallbackChain::new(
            entries,
            Arc::new(BreakerRegistry::new(BreakerConfig {
                failure_threshold: 3,
                cooldown: std::time::Duration::from_secs(60),
            })),
        )
    }

    fn entry(backend: MockBackend) -> ChainEntry {
        ChainEntry {
            backend: Arc::new(backend),
            single_line_fallback: false,
        }
    }

    fn request(lines: &[&str]) -> TranslationRequest {
        TranslationRequest {
            lines: lines.iter().map(|s| s.to_string()).collect(),
            source_language: "en".to_string(),
            target_language: "de".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_first_backend_success() {
        let chain = chain(vec![
            entry(MockBackend::new("primary").translating(|l| format!("DE:{}", l))),
            entry(MockBackend::new("secondary").translating(|l| format!("X:{}", l))),
        ]);

        let outcome = chain
            .translate_with_fallback(&request(&["hello"]), &[])
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.backend_used.as_deref(), Some("primary"));
        assert_eq!(outcome.lines, vec!["DE:hello"]);
        assert_eq!(outcome.attempts.len(), 1);
    }

    #[tokio::test]
    async fn test_fallback_advances_on_failure() {
        let chain = chain(vec![
            entry(MockBackend::new("primary").failing("HTTP 503")),
            entry(MockBackend::new("secondary").translating(|l| format!("DE:{}", l))),
        ]);

        let outcome = chain
            .translate_with_fallback(&request(&["hello"]), &[])
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.backend_used.as_deref(), Some("secondary"));
        assert_eq!(outcome.attempts.len(), 2);
        assert!(outcome.attempts[0]
            .error
            .as_deref()
            .unwrap()
            .contains("HTTP 503"));
    }

    #[tokio::test]
    async fn test_all_backends_fail() {
        let chain = chain(vec![
            entry(MockBackend::new("a").failing("down")),
            entry(MockBackend::new("b").failing("also down")),
        ]);

        let outcome = chain
            .translate_with_fallback(&request(&["hello"]), &[])
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.attempts.len(), 2);
        let error = outcome.error.unwrap();
        assert!(error.contains("down"));
        assert!(error.contains("also down"));
    }

    #[tokio::test]
    async fn test_open_breaker_is_skipped() {
        let failing = MockBackend::new("primary").failing("HTTP 503");
        let calls = failing.call_count();
        let chain = chain(vec![
            entry(failing),
            entry(MockBackend::new("secondary").translating(|l| l.to_string())),
        ]);

        // threshold 3: three failing calls open the breaker
        for _ in 0..3 {
            chain
                .translate_with_fallback(&request(&["x"]), &[])
                .await;
        }
        let outcome = chain
            .translate_with_fallback(&request(&["x"]), &[])
            .await;

        assert!(outcome.success);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 3);
        assert_eq!(
            outcome.attempts[0].error.as_deref(),
            Some("circuit breaker open")
        );
    }

    #[tokio::test]
    async fn test_single_line_fallback() {
        let backend = MockBackend::new("mismatching")
            .translating(|l| format!("DE:{}", l))
            .mismatch_on_batches();
        let chain = chain(vec![ChainEntry {
            backend: Arc::new(backend),
            single_line_fallback: true,
        }]);

        let outcome = chain
            .translate_with_fallback(&request(&["one", "two"]), &[])
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.lines, vec!["DE:one", "DE:two"]);
    }

    #[tokio::test]
    async fn test_subchain_selection() {
        let chain = chain(vec![
            entry(MockBackend::new("a").translating(|l| format!("A:{}", l))),
            entry(MockBackend::new("b").translating(|l| format!("B:{}", l))),
        ]);

        let outcome = chain
            .translate_with_fallback(&request(&["x"]), &["b".to_string()])
            .await;
        assert_eq!(outcome.backend_used.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_evaluate_prefers_producing_backend() {
        let a = MockBackend::new("a")
            .translating(|l| l.to_string())
            .scoring(90);
        let b = MockBackend::new("b")
            .translating(|l| l.to_string())
            .scoring(10);
        let chain = chain(vec![entry(a), entry(b)]);

        let scores = chain
            .evaluate(
                &["s".to_string()],
                &["t".to_string()],
                "en",
                "de",
                Some("b"),
            )
            .await
            .unwrap();
        assert_eq!(scores, vec![10]);
    }

    #[tokio::test]
    async fn test_evaluate_falls_through_to_capable_backend() {
        let incapable = MockBackend::new("deepl-like").translating(|l| l.to_string());
        let capable = MockBackend::new("llm")
            .translating(|l| l.to_string())
            .scoring(75);
        let chain = chain(vec![entry(incapable), entry(capable)]);

        let scores = chain
            .evaluate(
                &["s".to_string()],
                &["t".to_string()],
                "en",
                "de",
                Some("deepl-like"),
            )
            .await
            .unwrap();
        assert_eq!(scores, vec![75]);
    }

    #[tokio::test]
    async fn test_evaluate_none_when_nobody_scores() {
        let chain = chain(vec![entry(MockBackend::new("plain").translating(|l| l.to_string()))]);
        let scores = chain
            .evaluate(&["s".to_string()], &["t".to_string()], "en", "de", None)
            .await;
        assert!(scores.is_none());
    }
}
