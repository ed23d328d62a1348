//! Translation manager.
//!
//! Coordinates the memory layer, glossary injection, batch splitting with
//! SRT-reference windows, the fallback chain, and self-evaluated quality
//! retries. Also owns the dialog/signs split for ASS documents: signs and
//! songs lines are never sent to a backend.

use serde::Serialize;

use crate::config::TranslationConfig;
use crate::store::{GlossaryStore, PresetStore, StoreError, TranslationMemoryStore};
use crate::subtitle::{classify_styles, AssDocument, SrtFile, StyleClass};

use super::chain::FallbackChain;
use super::normalize::{is_memory_safe, normalize_line};
use super::prompt::reference_window;
use super::types::{BackendAttempt, TranslationRequest};

/// Neutral score used when evaluation is disabled or unavailable.
const NEUTRAL_SCORE: u8 = 50;

/// Score recorded for translation-memory hits.
const MEMORY_HIT_SCORE: u8 = 100;

#[derive(Debug, Clone, Serialize)]
pub struct TranslationStats {
    pub avg_quality: f64,
    pub min_quality: u8,
    pub low_quality_lines: usize,
    pub quality_threshold: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct LineTranslationResult {
    pub success: bool,
    pub lines: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_used: Option<String>,
    pub attempts: Vec<BackendAttempt>,
    /// One score per line, aligned with `lines`.
    pub quality_scores: Vec<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<TranslationStats>,
    pub memory_hits: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LineTranslationResult {
    fn failure(attempts: Vec<BackendAttempt>, error: String) -> Self {
        Self {
            success: false,
            lines: Vec::new(),
            backend_used: None,
            attempts,
            quality_scores: Vec::new(),
            stats: None,
            memory_hits: 0,
            error: Some(error),
        }
    }
}

/// Result of translating a whole subtitle document.
#[derive(Debug, Clone)]
pub struct DocumentTranslation {
    pub content: String,
    pub result: LineTranslationResult,
    /// Lines that went through translation (dialog only for ASS).
    pub translated_line_count: usize,
}

pub type ProgressFn<'a> = &'a (dyn Fn(usize, usize) + Send + Sync);

pub struct TranslationManager {
    chain: FallbackChain,
    memory: TranslationMemoryStore,
    glossary: GlossaryStore,
    presets: PresetStore,
    config: TranslationConfig,
}

impl TranslationManager {
    pub fn new(
        chain: FallbackChain,
        memory: TranslationMemoryStore,
        glossary: GlossaryStore,
        presets: PresetStore,
        config: TranslationConfig,
    ) -> Self {
        Self {
            chain,
            memory,
            glossary,
            presets,
            config,
        }
    }

    pub fn chain(&self) -> &FallbackChain {
        &self.chain
    }

    /// Resolve the system prompt from the first backend in the selection
    /// carrying a prompt preset.
    fn system_prompt(&self, backend_names: &[String]) -> Option<String> {
        for backend_config in &self.config.backends {
            let selected =
                backend_names.is_empty() || backend_names.contains(&backend_config.name);
            if !selected {
                continue;
            }
            if let Some(preset_id) = backend_config.prompt_preset {
                match self.presets.get(preset_id) {
                    Ok(preset) => return Some(preset.system_prompt),
                    Err(e) => {
                        tracing::warn!(preset = preset_id, "Prompt preset missing: {}", e);
                    }
                }
            }
        }
        None
    }

    /// Translate a flat list of lines.
    ///
    /// `srt_reference` is a same-video target-language SRT used as context;
    /// `series_id` scopes glossary terms. The result's `lines` is aligned
    /// with the input.
    pub async fn translate_lines(
        &self,
        lines: &[String],
        source_language: &str,
        target_language: &str,
        backend_names: &[String],
        srt_reference: Option<&[String]>,
        series_id: Option<i64>,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<LineTranslationResult, StoreError> {
        if lines.is_empty() {
            return Ok(LineTranslationResult {
                success: true,
                lines: Vec::new(),
                backend_used: None,
                attempts: Vec::new(),
                quality_scores: Vec::new(),
                stats: None,
                memory_hits: 0,
                error: None,
            });
        }

        let glossary = self.glossary.terms_for(series_id)?;
        let system_prompt = self.system_prompt(backend_names);

        // Memory substitution: hits leave the outbound batch entirely.
        let mut translated: Vec<Option<String>> = vec![None; lines.len()];
        let mut memory_hits = 0usize;
        if self.config.memory.enabled {
            for (idx, line) in lines.iter().enumerate() {
                if !is_memory_safe(line) {
                    continue;
                }
                let normalized = normalize_line(line);
                if let Some(hit) = self.memory.lookup(
                    source_language,
                    target_language,
                    &normalized,
                    self.config.memory.similarity_threshold,
                )? {
                    translated[idx] = Some(hit.translated_text);
                    memory_hits += 1;
                }
            }
        }

        let outbound: Vec<usize> = (0..lines.len()).filter(|i| translated[*i].is_none()).collect();

        // Batch translation with proportional reference windows
        let mut attempts: Vec<BackendAttempt> = Vec::new();
        let mut backend_used: Option<String> = None;
        let mut outbound_translated: Vec<String> = Vec::with_capacity(outbound.len());
        let batch_size = self.config.batch_size.max(1);

        for (batch_number, batch) in outbound.chunks(batch_size).enumerate() {
            let batch_lines: Vec<String> =
                batch.iter().map(|&i| lines[i].clone()).collect();
            let window = srt_reference.map(|reference| {
                reference_window(reference, batch[0], batch.len(), lines.len())
            });

            let request = TranslationRequest {
                lines: batch_lines,
                source_language: source_language.to_string(),
                target_language: target_language.to_string(),
                glossary: glossary.clone(),
                srt_reference: window.filter(|w| !w.is_empty()),
                system_prompt: system_prompt.clone(),
            };

            let outcome = self
                .chain
                .translate_with_fallback(&request, backend_names)
                .await;
            attempts.extend(outcome.attempts.clone());

            if !outcome.success {
                return Ok(LineTranslationResult::failure(
                    attempts,
                    outcome
                        .error
                        .unwrap_or_else(|| "translation failed".to_string()),
                ));
            }
            if backend_used.is_none() {
                backend_used = outcome.backend_used.clone();
            }
            outbound_translated.extend(outcome.lines);

            if let Some(progress) = progress {
                let done = (batch_number * batch_size + batch.len()).min(outbound.len());
                progress(done, outbound.len());
            }
        }

        // Quality self-evaluation with bounded retries
        let mut outbound_scores = vec![NEUTRAL_SCORE; outbound.len()];
        if self.config.quality.enabled && !outbound.is_empty() {
            let sources: Vec<String> = outbound.iter().map(|&i| lines[i].clone()).collect();
            if let Some(scores) = self
                .chain
                .evaluate(
                    &sources,
                    &outbound_translated,
                    source_language,
                    target_language,
                    backend_used.as_deref(),
                )
                .await
            {
                outbound_scores = scores;
                let threshold = self.config.quality.threshold;

                for _round in 0..self.config.quality.max_retries {
                    let low: Vec<usize> = (0..outbound.len())
                        .filter(|&i| outbound_scores[i] < threshold)
                        .collect();
                    if low.is_empty() {
                        break;
                    }

                    let retry_request = TranslationRequest {
                        lines: low.iter().map(|&i| sources[i].clone()).collect(),
                        source_language: source_language.to_string(),
                        target_language: target_language.to_string(),
                        glossary: glossary.clone(),
                        srt_reference: None,
                        system_prompt: system_prompt.clone(),
                    };
                    let retry = self
                        .chain
                        .translate_with_fallback(&retry_request, backend_names)
                        .await;
                    if !retry.success {
                        break;
                    }

                    let retry_sources: Vec<String> =
                        low.iter().map(|&i| sources[i].clone()).collect();
                    let retry_scores = self
                        .chain
                        .evaluate(
                            &retry_sources,
                            &retry.lines,
                            source_language,
                            target_language,
                            retry.backend_used.as_deref(),
                        )
                        .await;
                    let Some(retry_scores) = retry_scores else {
                        break;
                    };

                    // Keep the best-scoring version per line
                    for (pos, &line_idx) in low.iter().enumerate() {
                        if retry_scores[pos] > outbound_scores[line_idx] {
                            outbound_scores[line_idx] = retry_scores[pos];
                            outbound_translated[line_idx] = retry.lines[pos].clone();
                        }
                    }
                }
            }
            // Evaluation failure keeps the neutral scores and never blocks.
        }

        // Persist new memory entries
        if self.config.memory.enabled {
            for (pos, &line_idx) in outbound.iter().enumerate() {
                let source = &lines[line_idx];
                if is_memory_safe(source) {
                    self.memory.store(
                        source_language,
                        target_language,
                        &normalize_line(source),
                        &outbound_translated[pos],
                    )?;
                }
            }
        }

        // Reassemble aligned output
        let mut quality_scores = vec![MEMORY_HIT_SCORE; lines.len()];
        for (pos, &line_idx) in outbound.iter().enumerate() {
            translated[line_idx] = Some(outbound_translated[pos].clone());
            quality_scores[line_idx] = outbound_scores[pos];
        }
        let lines_out: Vec<String> = translated
            .into_iter()
            .map(|l| l.unwrap_or_default())
            .collect();

        let threshold = self.config.quality.threshold;
        let stats = if quality_scores.is_empty() {
            None
        } else {
            Some(TranslationStats {
                avg_quality: quality_scores.iter().map(|&s| s as f64).sum::<f64>()
                    / quality_scores.len() as f64,
                min_quality: quality_scores.iter().copied().min().unwrap_or(0),
                low_quality_lines: quality_scores
                    .iter()
                    .filter(|&&s| s < threshold)
                    .count(),
                quality_threshold: threshold,
            })
        };

        Ok(LineTranslationResult {
            success: true,
            lines: lines_out,
            backend_used,
            attempts,
            quality_scores,
            stats,
            memory_hits,
            error: None,
        })
    }

    /// Translate an SRT document. Every cue is dialogue.
    pub async fn translate_srt(
        &self,
        content: &str,
        source_language: &str,
        target_language: &str,
        backend_names: &[String],
        srt_reference: Option<&[String]>,
        series_id: Option<i64>,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<DocumentTranslation, StoreError> {
        let mut srt = match SrtFile::parse(content) {
            Ok(srt) => srt,
            Err(e) => {
                return Ok(DocumentTranslation {
                    content: String::new(),
                    result: LineTranslationResult::failure(Vec::new(), e.to_string()),
                    translated_line_count: 0,
                })
            }
        };

        // Inner cue breaks travel as \N so the one-line-per-cue contract holds
        let lines: Vec<String> = srt
            .texts()
            .iter()
            .map(|t| t.replace('\n', "\\N"))
            .collect();

        let result = self
            .translate_lines(
                &lines,
                source_language,
                target_language,
                backend_names,
                srt_reference,
                series_id,
                progress,
            )
            .await?;

        if !result.success {
            return Ok(DocumentTranslation {
                content: String::new(),
                result,
                translated_line_count: 0,
            });
        }

        let restored: Vec<String> = result
            .lines
            .iter()
            .map(|l| l.replace("\\N", "\n"))
            .collect();
        let count = restored.len();
        if let Err(e) = srt.replace_texts(&restored) {
            return Ok(DocumentTranslation {
                content: String::new(),
                result: LineTranslationResult::failure(result.attempts, e.to_string()),
                translated_line_count: 0,
            });
        }

        Ok(DocumentTranslation {
            content: srt.serialize(),
            result,
            translated_line_count: count,
        })
    }

    /// Translate an ASS document.
    ///
    /// Only dialog-classified styles are translated; signs/songs events pass
    /// through verbatim. Timing, styles and override tags are preserved, and
    /// the Script Info `Language:` field is set to the target.
    pub async fn translate_ass(
        &self,
        content: &str,
        source_language: &str,
        target_language: &str,
        backend_names: &[String],
        srt_reference: Option<&[String]>,
        series_id: Option<i64>,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<DocumentTranslation, StoreError> {
        let mut doc = match AssDocument::parse(content) {
            Ok(doc) => doc,
            Err(e) => {
                return Ok(DocumentTranslation {
                    content: String::new(),
                    result: LineTranslationResult::failure(Vec::new(), e.to_string()),
                    translated_line_count: 0,
                })
            }
        };

        let event_pairs: Vec<(String, String)> = doc
            .dialogue_events()
            .map(|e| (e.style.clone(), e.text.clone()))
            .collect();
        let classes = classify_styles(&event_pairs);

        let dialog_events: Vec<(usize, String)> = doc
            .dialogue_events()
            .filter(|e| classes.get(&e.style) == Some(&StyleClass::Dialog))
            .map(|e| (e.line_index, e.text.clone()))
            .collect();

        let lines: Vec<String> = dialog_events.iter().map(|(_, t)| t.clone()).collect();
        let result = self
            .translate_lines(
                &lines,
                source_language,
                target_language,
                backend_names,
                srt_reference,
                series_id,
                progress,
            )
            .await?;

        if !result.success {
            return Ok(DocumentTranslation {
                content: String::new(),
                result,
                translated_line_count: 0,
            });
        }

        doc.set_language(target_language);
        // set_language may shift line indices; re-resolve dialog events by
        // walking the document again in the same order.
        let dialog_indices: Vec<usize> = doc
            .dialogue_events()
            .filter(|e| classes.get(&e.style) == Some(&StyleClass::Dialog))
            .map(|e| e.line_index)
            .collect();
        for (line_index, new_text) in dialog_indices.iter().zip(result.lines.iter()) {
            if let Err(e) = doc.set_event_text(*line_index, new_text) {
                tracing::error!("Failed to write back event text: {}", e);
            }
        }

        let count = result.lines.len();
        Ok(DocumentTranslation {
            content: doc.serialize(),
            result,
            translated_line_count: count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::BreakerRegistry;
    use crate::config::{QualityConfig, TranslationMemoryConfig};
    use crate::store::Database;
    use crate::testing::MockBackend;
    use crate::translate::chain::ChainEntry;
    use std::sync::Arc;

    fn manager_with(backends: Vec<MockBackend>, config: TranslationConfig) -> TranslationManager {
        let db = Database::in_memory().unwrap();
        let chain = FallbackChain::new(
            backends
                .into_iter()
                .map(|b| ChainEntry {
                    backend: Arc::new(b),
                    single_line_fallback: false,
                })
                .collect(),
            Arc::new(BreakerRegistry::default()),
        );
        TranslationManager::new(
            chain,
            TranslationMemoryStore::new(db.clone()),
            GlossaryStore::new(db.clone()),
            PresetStore::new(db),
            config,
        )
    }

    fn config() -> TranslationConfig {
        TranslationConfig {
            backends: Vec::new(),
            batch_size: 10,
            quality: QualityConfig {
                enabled: false,
                threshold: 50,
                max_retries: 2,
            },
            memory: TranslationMemoryConfig {
                enabled: true,
                similarity_threshold: 0.9,
            },
        }
    }

    const ASS_SAMPLE: &str = "[Script Info]\nScriptType: v4.00+\n\n[Events]\nFormat: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\nDialogue: 0,0:00:01.00,0:00:02.00,Default,,0,0,0,,Hello there\nDialogue: 0,0:00:03.00,0:00:04.00,Signs,,0,0,0,,{\\pos(1,1)}STATION\nDialogue: 0,0:00:05.00,0:00:06.00,Default,,0,0,0,,Goodbye\nDialogue: 0,0:00:07.00,0:00:08.00,Signs,,0,0,0,,{\\pos(2,2)}EXIT\n";

    #[tokio::test]
    async fn test_translate_lines_roundtrip() {
        let manager = manager_with(
            vec![MockBackend::new("mock").translating(|l| format!("DE:{}", l))],
            config(),
        );
        let lines = vec!["one".to_string(), "two".to_string()];
        let result = manager
            .translate_lines(&lines, "en", "de", &[], None, None, None)
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.lines, vec!["DE:one", "DE:two"]);
        assert_eq!(result.backend_used.as_deref(), Some("mock"));
    }

    #[tokio::test]
    async fn test_memory_hits_skip_backend() {
        let backend = MockBackend::new("mock").translating(|l| format!("DE:{}", l));
        let sent = backend.sent_lines();
        let manager = manager_with(vec![backend], config());

        let lines = vec!["hello there".to_string(), "fresh line".to_string()];
        // Seed the memory with the first line
        manager
            .memory
            .store("en", "de", "hello there", "hallo zusammen")
            .unwrap();

        let result = manager
            .translate_lines(&lines, "en", "de", &[], None, None, None)
            .await
            .unwrap();
        assert_eq!(result.memory_hits, 1);
        assert_eq!(result.lines[0], "hallo zusammen");
        assert_eq!(result.lines[1], "DE:fresh line");

        // Only the miss went out
        let sent = sent.lock().unwrap();
        assert_eq!(sent.as_slice(), &["fresh line".to_string()]);
    }

    #[tokio::test]
    async fn test_translation_stores_memory() {
        let manager = manager_with(
            vec![MockBackend::new("mock").translating(|l| format!("DE:{}", l))],
            config(),
        );
        let lines = vec!["store me".to_string()];
        manager
            .translate_lines(&lines, "en", "de", &[], None, None, None)
            .await
            .unwrap();

        let hit = manager
            .memory
            .lookup("en", "de", "store me", 1.0)
            .unwrap()
            .unwrap();
        assert_eq!(hit.translated_text, "DE:store me");
    }

    #[tokio::test]
    async fn test_quality_retry_keeps_best() {
        // First evaluation scores everything 30, retries score 80
        let backend = MockBackend::new("mock")
            .translating(|l| format!("DE:{}", l))
            .scoring_sequence(vec![30, 80]);
        let mut cfg = config();
        cfg.quality.enabled = true;
        let manager = manager_with(vec![backend], cfg);

        let lines = vec!["tough line".to_string()];
        let result = manager
            .translate_lines(&lines, "en", "de", &[], None, None, None)
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.quality_scores, vec![80]);
        let stats = result.stats.unwrap();
        assert_eq!(stats.low_quality_lines, 0);
    }

    #[tokio::test]
    async fn test_quality_eval_failure_falls_back_to_neutral() {
        // Backend translates but cannot evaluate
        let backend = MockBackend::new("plain").translating(|l| format!("DE:{}", l));
        let mut cfg = config();
        cfg.quality.enabled = true;
        let manager = manager_with(vec![backend], cfg);

        let result = manager
            .translate_lines(&["x".to_string()], "en", "de", &[], None, None, None)
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.quality_scores, vec![50]);
    }

    #[tokio::test]
    async fn test_all_backends_failing_surfaces_error_array() {
        let manager = manager_with(
            vec![
                MockBackend::new("a").failing("HTTP 503"),
                MockBackend::new("b").failing("timeout"),
            ],
            config(),
        );
        let result = manager
            .translate_lines(&["x".to_string()], "en", "de", &[], None, None, None)
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.attempts.len(), 2);
        assert!(result.error.unwrap().contains("HTTP 503"));
    }

    #[tokio::test]
    async fn test_translate_ass_skips_signs() {
        let backend = MockBackend::new("mock").translating(|l| format!("DE:{}", l));
        let sent = backend.sent_lines();
        let manager = manager_with(vec![backend], config());

        let translation = manager
            .translate_ass(ASS_SAMPLE, "en", "de", &[], None, None, None)
            .await
            .unwrap();
        assert!(translation.result.success);
        assert_eq!(translation.translated_line_count, 2);

        // Signs lines never reached the backend (and survive verbatim)
        let sent = sent.lock().unwrap();
        assert!(sent.iter().all(|l| !l.contains("STATION") && !l.contains("EXIT")));
        assert!(translation.content.contains("{\\pos(1,1)}STATION"));
        assert!(translation.content.contains("{\\pos(2,2)}EXIT"));
        assert!(translation.content.contains("DE:Hello there"));
        assert!(translation.content.contains("Language: de"));
    }

    #[tokio::test]
    async fn test_translate_srt_preserves_cue_breaks() {
        let manager = manager_with(
            vec![MockBackend::new("mock").translating(|l| l.to_uppercase())],
            config(),
        );
        let srt = "1\n00:00:01,000 --> 00:00:02,000\ntwo\nlines\n\n";
        let translation = manager
            .translate_srt(srt, "en", "de", &[], None, None, None)
            .await
            .unwrap();
        assert!(translation.result.success);
        assert!(translation.content.contains("TWO\nLINES"));
    }

    #[tokio::test]
    async fn test_empty_input() {
        let manager = manager_with(vec![], config());
        let result = manager
            .translate_lines(&[], "en", "de", &[], None, None, None)
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.lines.is_empty());
    }
}
