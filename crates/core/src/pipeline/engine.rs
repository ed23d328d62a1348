//! The acquisition decision engine.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;

use crate::config::AcquisitionConfig;
use crate::events::EventHandle;
use crate::integrations::{MediaServerManager, RefreshKind};
use crate::media::{extraction_temp_path, EmbeddedCodec, MediaProber};
use crate::providers::{ProviderManager, SubtitleResult, VideoQuery};
use crate::runtime::CancelFlag;
use crate::store::{
    HistoryAction, HistoryStore, NewHistoryEntry, ProfileStore, SubtitleType, WantedItem,
    WantedStore,
};
use crate::subtitle::{
    best_existing_full, find_existing_subtitles, quality_sidecar_path, subtitle_path,
    language_matches, SubtitleFormat,
};
use crate::transcribe::Transcriber;
use crate::translate::{DocumentTranslation, TranslationManager};

use super::fsio::{content_hash, write_atomic};
use super::PipelineError;

/// Terminal report for one processed item.
#[derive(Debug, Clone)]
pub struct ItemReport {
    pub case: &'static str,
    pub action: HistoryAction,
    pub subtitle_path: Option<PathBuf>,
    pub stats: serde_json::Value,
}

/// What happened to an item this round.
#[derive(Debug, Clone)]
pub enum ProcessOutcome {
    /// Reached a terminal state.
    Done(ItemReport),
    /// No candidates this round; back to pending for a later retry.
    Requeued { attempts: u32 },
    /// Case D: the item waits for a transcription job.
    TranscriptionQueued,
}

pub struct AcquisitionEngine {
    wanted: WantedStore,
    history: HistoryStore,
    profiles: ProfileStore,
    providers: Arc<ProviderManager>,
    translator: Arc<TranslationManager>,
    prober: Arc<dyn MediaProber>,
    transcriber: Option<Arc<dyn Transcriber>>,
    media_servers: Arc<MediaServerManager>,
    events: EventHandle,
    config: AcquisitionConfig,
}

impl AcquisitionEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        wanted: WantedStore,
        history: HistoryStore,
        profiles: ProfileStore,
        providers: Arc<ProviderManager>,
        translator: Arc<TranslationManager>,
        prober: Arc<dyn MediaProber>,
        transcriber: Option<Arc<dyn Transcriber>>,
        media_servers: Arc<MediaServerManager>,
        events: EventHandle,
        config: AcquisitionConfig,
    ) -> Self {
        Self {
            wanted,
            history,
            profiles,
            providers,
            translator,
            prober,
            transcriber,
            media_servers,
            events,
            config,
        }
    }

    /// Process one wanted item end to end.
    ///
    /// Claims the row (losing the race returns `AlreadyProcessing` without
    /// touching the item), runs the case decision, and converts any internal
    /// error into a terminal `failed` state before returning it.
    pub async fn process_item(
        &self,
        item_id: i64,
        cancel: &CancelFlag,
    ) -> Result<ProcessOutcome, PipelineError> {
        if !self.wanted.claim(item_id)? {
            return Err(PipelineError::AlreadyProcessing);
        }
        let item = self.wanted.get(item_id)?;

        let result = self.run_cases(&item, cancel).await;
        match result {
            Ok(ProcessOutcome::Done(report)) => {
                self.emit_processed(&item, "completed", report.case);
                Ok(ProcessOutcome::Done(report))
            }
            Ok(ProcessOutcome::Requeued { attempts }) => {
                self.wanted.release(item.id)?;
                Ok(ProcessOutcome::Requeued { attempts })
            }
            Ok(ProcessOutcome::TranscriptionQueued) => {
                self.wanted
                    .set_status(item.id, crate::store::WantedStatus::Transcribing)?;
                Ok(ProcessOutcome::TranscriptionQueued)
            }
            Err(PipelineError::AlreadyProcessing) => Err(PipelineError::AlreadyProcessing),
            Err(e) => {
                self.fail_item(&item, &e)?;
                Err(e)
            }
        }
    }

    /// Resume a transcribing item: extract audio, transcribe, translate.
    pub async fn transcribe_item(
        &self,
        item_id: i64,
        cancel: &CancelFlag,
    ) -> Result<ItemReport, PipelineError> {
        let item = self.wanted.get(item_id)?;
        let result = self.run_transcription(&item, cancel).await;
        match result {
            Ok(report) => {
                self.emit_processed(&item, "completed", report.case);
                Ok(report)
            }
            Err(e) => {
                self.fail_item(&item, &e)?;
                Err(e)
            }
        }
    }

    // --- case decision -----------------------------------------------------

    async fn run_cases(
        &self,
        item: &WantedItem,
        cancel: &CancelFlag,
    ) -> Result<ProcessOutcome, PipelineError> {
        check_cancel(cancel)?;

        if item.subtitle_type == SubtitleType::Forced {
            return self.forced_pipeline(item, cancel).await;
        }

        let video = Path::new(&item.file_path);
        if !video.exists() {
            return Err(PipelineError::File(format!(
                "video not found: {}",
                item.file_path
            )));
        }

        // Case A: a target subtitle already exists on disk
        if let Some(existing) = best_existing_full(video, &item.target_language) {
            if existing.format.is_styled() {
                return self.skip_present(item, &existing.path, "skip: present").await;
            }
            // Target SRT exists: Case B (upgrade) inside the window
            if self.within_upgrade_window(item) {
                return self.upgrade_pipeline(item, &existing.path, cancel).await;
            }
            return self
                .skip_present(item, &existing.path, "skip: srt present, outside upgrade window")
                .await;
        }

        // Case C: acquire from scratch
        self.acquire_pipeline(item, cancel).await
    }

    async fn skip_present(
        &self,
        item: &WantedItem,
        existing: &Path,
        reason: &str,
    ) -> Result<ProcessOutcome, PipelineError> {
        let content = tokio::fs::read_to_string(existing)
            .await
            .map_err(|e| PipelineError::File(e.to_string()))?;
        // Completion requires content that actually parses as a subtitle
        if crate::subtitle::detect_format(&content).is_none() {
            return Err(PipelineError::File(format!(
                "existing subtitle does not parse: {}",
                existing.display()
            )));
        }
        let hash = content_hash(&content);
        self.wanted
            .complete(item.id, &existing.to_string_lossy(), &hash)?;
        self.history.record(
            HistoryAction::Skipped,
            &NewHistoryEntry {
                file_path: &item.file_path,
                language: &item.target_language,
                details: Some(reason),
                ..Default::default()
            },
        )?;
        Ok(ProcessOutcome::Done(ItemReport {
            case: "A",
            action: HistoryAction::Skipped,
            subtitle_path: Some(existing.to_path_buf()),
            stats: serde_json::json!({ "skip": reason }),
        }))
    }

    fn within_upgrade_window(&self, item: &WantedItem) -> bool {
        match item.file_added_at {
            Some(added) => {
                let age = Utc::now().signed_duration_since(added);
                age.num_days() <= self.config.upgrade_window_days as i64
            }
            None => false,
        }
    }

    // --- Case B: upgrade ---------------------------------------------------

    async fn upgrade_pipeline(
        &self,
        item: &WantedItem,
        existing_srt: &Path,
        cancel: &CancelFlag,
    ) -> Result<ProcessOutcome, PipelineError> {
        check_cancel(cancel)?;
        let video = Path::new(&item.file_path);

        // B1: provider search for a target-language ASS
        let query = self.build_query(item, false);
        let outcome = self.providers.search(&query).await?;
        let target_ass = outcome.results.iter().find(|r| {
            r.format.is_styled() && language_matches(&r.language, &item.target_language)
        });

        if let Some(result) = target_ass {
            check_cancel(cancel)?;
            if let Ok(downloaded) = self.providers.download(result).await {
                let dest = subtitle_path(video, &item.target_language, false, SubtitleFormat::Ass);
                let hash = write_atomic(&dest, &downloaded.content)
                    .await
                    .map_err(|e| PipelineError::File(e.to_string()))?;

                if self.config.upgrade_delete_srt && existing_srt != dest {
                    if let Err(e) = tokio::fs::remove_file(existing_srt).await {
                        tracing::warn!("Failed to remove upgraded SRT: {}", e);
                    }
                }

                self.wanted.complete(item.id, &dest.to_string_lossy(), &hash)?;
                self.history.record(
                    HistoryAction::Upgraded,
                    &NewHistoryEntry {
                        file_path: &item.file_path,
                        language: &item.target_language,
                        provider: Some(&downloaded.provider_name),
                        score: Some(result.score),
                        ..Default::default()
                    },
                )?;
                self.events.emit(
                    "upgrade_complete",
                    serde_json::json!({
                        "file_path": item.file_path,
                        "subtitle_path": dest.to_string_lossy(),
                        "language": item.target_language,
                        "provider": downloaded.provider_name,
                    }),
                );
                self.refresh_media(item, &dest).await;
                return Ok(ProcessOutcome::Done(ItemReport {
                    case: "B1",
                    action: HistoryAction::Upgraded,
                    subtitle_path: Some(dest),
                    stats: serde_json::json!({ "upgraded": true, "score": result.score }),
                }));
            }
        }

        // B2: translate an embedded source-language ASS
        let info = self
            .prober
            .probe(video)
            .await
            .map_err(|e| PipelineError::File(e.to_string()))?;
        if let Some(stream) = info.best_subtitle_stream(&item.source_language) {
            if stream.codec == EmbeddedCodec::Ass {
                check_cancel(cancel)?;
                let content = self.extract_stream(video, stream.index, "ass").await?;
                let report = self
                    .translate_and_store(item, &content, SubtitleFormat::Ass, "B2", None, cancel)
                    .await?;
                let mut report = report;
                report.stats["upgraded"] = serde_json::json!(true);
                return Ok(ProcessOutcome::Done(report));
            }
        }

        // B3: keep the SRT
        self.skip_present(item, existing_srt, "no upgrade path")
            .await
            .map(|outcome| match outcome {
                ProcessOutcome::Done(mut report) => {
                    report.case = "B3";
                    ProcessOutcome::Done(report)
                }
                other => other,
            })
    }

    // --- Case C: acquire ---------------------------------------------------

    async fn acquire_pipeline(
        &self,
        item: &WantedItem,
        cancel: &CancelFlag,
    ) -> Result<ProcessOutcome, PipelineError> {
        let video = Path::new(&item.file_path);
        let info = self
            .prober
            .probe(video)
            .await
            .map_err(|e| PipelineError::File(e.to_string()))?;

        // C1/C2: embedded source subtitle
        if let Some(stream) = info.best_subtitle_stream(&item.source_language) {
            check_cancel(cancel)?;
            match stream.codec {
                EmbeddedCodec::Ass => {
                    let content = self.extract_stream(video, stream.index, "ass").await?;
                    let report = self
                        .translate_and_store(item, &content, SubtitleFormat::Ass, "C1", None, cancel)
                        .await?;
                    return Ok(ProcessOutcome::Done(report));
                }
                EmbeddedCodec::Srt => {
                    let content = self.extract_stream(video, stream.index, "srt").await?;
                    let report = self
                        .translate_and_store(item, &content, SubtitleFormat::Srt, "C2", None, cancel)
                        .await?;
                    return Ok(ProcessOutcome::Done(report));
                }
                EmbeddedCodec::Other => {}
            }
        }

        // C3: provider search
        check_cancel(cancel)?;
        let query = self.build_query(item, false);
        let outcome = self.providers.search(&query).await?;

        // Direct target-language hit is the cheapest path
        let direct = outcome
            .results
            .iter()
            .find(|r| language_matches(&r.language, &item.target_language));
        if let Some(result) = direct {
            check_cancel(cancel)?;
            if let Ok(downloaded) = self.providers.download(result).await {
                let dest = subtitle_path(video, &item.target_language, false, downloaded.format);
                let hash = write_atomic(&dest, &downloaded.content)
                    .await
                    .map_err(|e| PipelineError::File(e.to_string()))?;
                self.wanted.complete(item.id, &dest.to_string_lossy(), &hash)?;
                self.history.record(
                    HistoryAction::Downloaded,
                    &NewHistoryEntry {
                        file_path: &item.file_path,
                        language: &item.target_language,
                        provider: Some(&downloaded.provider_name),
                        score: Some(result.score),
                        ..Default::default()
                    },
                )?;
                self.events.emit(
                    "subtitle_downloaded",
                    serde_json::json!({
                        "file_path": item.file_path,
                        "subtitle_path": dest.to_string_lossy(),
                        "language": item.target_language,
                        "provider": downloaded.provider_name,
                        "score": result.score,
                        "forced": false,
                    }),
                );
                self.refresh_media(item, &dest).await;
                return Ok(ProcessOutcome::Done(ItemReport {
                    case: "C3",
                    action: HistoryAction::Downloaded,
                    subtitle_path: Some(dest),
                    stats: serde_json::json!({ "score": result.score }),
                }));
            }
        }

        // Source-language hit: download then translate
        let source_hit = outcome
            .results
            .iter()
            .find(|r| language_matches(&r.language, &item.source_language));
        if let Some(result) = source_hit {
            if !self.should_fall_back_to_whisper(result) {
                check_cancel(cancel)?;
                if let Ok(downloaded) = self.providers.download(result).await {
                    let report = self
                        .translate_and_store(
                            item,
                            &downloaded.content,
                            downloaded.format,
                            "C3",
                            Some((downloaded.provider_name.clone(), result.score)),
                            cancel,
                        )
                        .await?;
                    return Ok(ProcessOutcome::Done(report));
                }
            }
        }

        // C4: Whisper fallback
        let best_score = outcome.results.first().map(|r| r.score);
        let whisper_applicable = self.transcriber.is_some()
            && (outcome.results.is_empty()
                || best_score.map(|s| s < self.config.whisper_score_threshold).unwrap_or(true));
        if whisper_applicable {
            return Ok(ProcessOutcome::TranscriptionQueued);
        }

        // Nothing viable this round
        if item.attempts >= self.config.max_attempts {
            return Err(PipelineError::NoSource("all cases exhausted".to_string()));
        }
        Ok(ProcessOutcome::Requeued {
            attempts: item.attempts,
        })
    }

    fn should_fall_back_to_whisper(&self, best: &SubtitleResult) -> bool {
        self.transcriber.is_some() && best.score < self.config.whisper_score_threshold
    }

    // --- forced pipeline ---------------------------------------------------

    /// Forced items are download-only: never translated.
    async fn forced_pipeline(
        &self,
        item: &WantedItem,
        cancel: &CancelFlag,
    ) -> Result<ProcessOutcome, PipelineError> {
        let video = Path::new(&item.file_path);

        let existing = find_existing_subtitles(video, &item.target_language)
            .into_iter()
            .find(|f| f.forced);
        if let Some(existing) = existing {
            return self
                .skip_present(item, &existing.path, "skip: forced present")
                .await;
        }

        check_cancel(cancel)?;
        let query = self.build_query(item, true);
        let outcome = self.providers.search(&query).await?;
        let best = outcome
            .results
            .iter()
            .find(|r| language_matches(&r.language, &item.target_language));

        let Some(result) = best else {
            if item.attempts >= self.config.max_attempts {
                return Err(PipelineError::NoSource(
                    "no forced candidates".to_string(),
                ));
            }
            return Ok(ProcessOutcome::Requeued {
                attempts: item.attempts,
            });
        };

        check_cancel(cancel)?;
        let downloaded = self
            .providers
            .download(result)
            .await
            .map_err(|e| PipelineError::NoSource(e.to_string()))?;

        let dest = subtitle_path(video, &item.target_language, true, downloaded.format);
        let hash = write_atomic(&dest, &downloaded.content)
            .await
            .map_err(|e| PipelineError::File(e.to_string()))?;

        self.wanted.complete(item.id, &dest.to_string_lossy(), &hash)?;
        self.history.record(
            HistoryAction::Downloaded,
            &NewHistoryEntry {
                file_path: &item.file_path,
                language: &item.target_language,
                provider: Some(&downloaded.provider_name),
                score: Some(result.score),
                details: Some("forced"),
                ..Default::default()
            },
        )?;
        self.events.emit(
            "subtitle_downloaded",
            serde_json::json!({
                "file_path": item.file_path,
                "subtitle_path": dest.to_string_lossy(),
                "language": item.target_language,
                "provider": downloaded.provider_name,
                "score": result.score,
                "forced": true,
            }),
        );
        self.refresh_media(item, &dest).await;

        Ok(ProcessOutcome::Done(ItemReport {
            case: "forced",
            action: HistoryAction::Downloaded,
            subtitle_path: Some(dest),
            stats: serde_json::json!({ "forced": true, "score": result.score }),
        }))
    }

    // --- Case D: transcription ---------------------------------------------

    async fn run_transcription(
        &self,
        item: &WantedItem,
        cancel: &CancelFlag,
    ) -> Result<ItemReport, PipelineError> {
        let transcriber = self
            .transcriber
            .as_ref()
            .ok_or_else(|| PipelineError::Transcription("no transcriber configured".to_string()))?;

        let video = Path::new(&item.file_path);
        let info = self
            .prober
            .probe(video)
            .await
            .map_err(|e| PipelineError::File(e.to_string()))?;
        let track = info
            .audio_track_for(&item.source_language)
            .ok_or_else(|| PipelineError::Transcription("no audio track".to_string()))?;

        check_cancel(cancel)?;
        let audio_path = extraction_temp_path(video, track.index, "wav");
        self.prober
            .extract_audio(video, track.index, &audio_path)
            .await
            .map_err(|e| PipelineError::Transcription(e.to_string()))?;

        check_cancel(cancel)?;
        let transcription = transcriber
            .transcribe(&audio_path, Some(&item.source_language))
            .await
            .map_err(|e| PipelineError::Transcription(e.to_string()));
        let _ = tokio::fs::remove_file(&audio_path).await;
        let transcription = transcription?;

        self.events.emit(
            "transcription_complete",
            serde_json::json!({
                "file_path": item.file_path,
                "subtitle_path": serde_json::Value::Null,
                "language": item.source_language,
            }),
        );

        // Resume at the translate-SRT step
        let mut report = self
            .translate_and_store(
                item,
                &transcription.srt_content,
                SubtitleFormat::Srt,
                "C4",
                None,
                cancel,
            )
            .await?;
        report.action = HistoryAction::Transcribed;
        report.stats["transcribed"] = serde_json::json!(true);
        Ok(report)
    }

    // --- shared translate-then-store path -----------------------------------

    async fn translate_and_store(
        &self,
        item: &WantedItem,
        source_content: &str,
        format: SubtitleFormat,
        case: &'static str,
        provider: Option<(String, i64)>,
        cancel: &CancelFlag,
    ) -> Result<ItemReport, PipelineError> {
        check_cancel(cancel)?;
        self.wanted
            .set_status(item.id, crate::store::WantedStatus::Translating)?;

        let video = Path::new(&item.file_path);
        let reference = self.srt_reference_lines(item).await;
        let backend_names = self.backend_names(item);

        let translation: DocumentTranslation = if format.is_styled() {
            self.translator
                .translate_ass(
                    source_content,
                    &item.source_language,
                    &item.target_language,
                    &backend_names,
                    reference.as_deref(),
                    item.series_id,
                    None,
                )
                .await?
        } else {
            self.translator
                .translate_srt(
                    source_content,
                    &item.source_language,
                    &item.target_language,
                    &backend_names,
                    reference.as_deref(),
                    item.series_id,
                    None,
                )
                .await?
        };

        if !translation.result.success {
            return Err(PipelineError::Translation(
                translation
                    .result
                    .error
                    .unwrap_or_else(|| "translation failed".to_string()),
            ));
        }

        check_cancel(cancel)?;
        let out_format = if format.is_styled() {
            SubtitleFormat::Ass
        } else {
            SubtitleFormat::Srt
        };
        let dest = subtitle_path(video, &item.target_language, false, out_format);
        let hash = write_atomic(&dest, &translation.content)
            .await
            .map_err(|e| PipelineError::File(e.to_string()))?;

        // Quality sidecar: one integer score per translated cue. Sidecar
        // failures are logged, never fatal.
        if !translation.result.quality_scores.is_empty() {
            let sidecar = quality_sidecar_path(&dest);
            let scores_json = serde_json::to_string(&translation.result.quality_scores)
                .unwrap_or_else(|_| "[]".to_string());
            if let Err(e) = tokio::fs::write(&sidecar, scores_json).await {
                tracing::warn!("Failed to write quality sidecar: {}", e);
            }
        }

        self.wanted.complete(item.id, &dest.to_string_lossy(), &hash)?;

        let backend = translation.result.backend_used.clone();
        self.history.record(
            HistoryAction::Translated,
            &NewHistoryEntry {
                file_path: &item.file_path,
                language: &item.target_language,
                provider: provider.as_ref().map(|(name, _)| name.as_str()),
                backend: backend.as_deref(),
                score: provider.as_ref().map(|(_, score)| *score),
                ..Default::default()
            },
        )?;

        let stats = serde_json::json!({
            "backend_used": backend,
            "memory_hits": translation.result.memory_hits,
            "translated_lines": translation.translated_line_count,
            "quality": translation.result.stats,
            "attempts": translation.result.attempts,
        });

        self.events.emit(
            "translation_complete",
            serde_json::json!({
                "file_path": item.file_path,
                "subtitle_path": dest.to_string_lossy(),
                "source_language": item.source_language,
                "target_language": item.target_language,
                "backend": backend,
                "avg_quality": translation.result.stats.as_ref().map(|s| s.avg_quality),
            }),
        );
        self.refresh_media(item, &dest).await;

        Ok(ItemReport {
            case,
            action: HistoryAction::Translated,
            subtitle_path: Some(dest),
            stats,
        })
    }

    /// Extract the embedded source-language subtitle next to the video
    /// without translating (`{stem}.{src}.{ext}`). Used by auto-extract-on-
    /// scan when auto-translate is off, and by the per-item extract action.
    pub async fn extract_embedded_source(
        &self,
        item_id: i64,
    ) -> Result<PathBuf, PipelineError> {
        let item = self.wanted.get(item_id)?;
        let video = Path::new(&item.file_path);
        let info = self
            .prober
            .probe(video)
            .await
            .map_err(|e| PipelineError::File(e.to_string()))?;
        let stream = info
            .best_subtitle_stream(&item.source_language)
            .ok_or_else(|| {
                PipelineError::NoSource("no embedded source subtitle".to_string())
            })?;

        let format = match stream.codec {
            EmbeddedCodec::Ass => SubtitleFormat::Ass,
            _ => SubtitleFormat::Srt,
        };
        let content = self.extract_stream(video, stream.index, format.extension()).await?;
        let dest = subtitle_path(video, &item.source_language, false, format);
        write_atomic(&dest, &content)
            .await
            .map_err(|e| PipelineError::File(e.to_string()))?;
        Ok(dest)
    }

    // --- helpers -----------------------------------------------------------

    fn build_query(&self, item: &WantedItem, forced_only: bool) -> VideoQuery {
        VideoQuery {
            title: item.title.clone(),
            season: item.season,
            episode: item.episode,
            absolute_episode: item.absolute_episode,
            year: item.year,
            source_language: item.source_language.clone(),
            target_language: item.target_language.clone(),
            forced_only,
            is_episode: item.is_episode,
        }
    }

    /// Same-video target-language SRT to feed the translator as reference.
    async fn srt_reference_lines(&self, item: &WantedItem) -> Option<Vec<String>> {
        let video = Path::new(&item.file_path);
        let existing = find_existing_subtitles(video, &item.target_language)
            .into_iter()
            .find(|f| !f.forced && f.format == SubtitleFormat::Srt)?;
        let content = tokio::fs::read_to_string(&existing.path).await.ok()?;
        let srt = crate::subtitle::SrtFile::parse(&content).ok()?;
        Some(srt.texts().iter().map(|t| t.replace('\n', " ")).collect())
    }

    fn backend_names(&self, item: &WantedItem) -> Vec<String> {
        let Some(profile_id) = item.profile_id else {
            return Vec::new();
        };
        match self.profiles.get(profile_id) {
            Ok(profile) => profile.backend_chain.unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }

    async fn extract_stream(
        &self,
        video: &Path,
        stream_index: usize,
        ext: &str,
    ) -> Result<String, PipelineError> {
        let temp = extraction_temp_path(video, stream_index, ext);
        self.prober
            .extract_subtitle(video, stream_index, &temp)
            .await
            .map_err(|e| PipelineError::File(e.to_string()))?;
        let content = tokio::fs::read_to_string(&temp)
            .await
            .map_err(|e| PipelineError::File(e.to_string()))?;
        let _ = tokio::fs::remove_file(&temp).await;
        Ok(content)
    }

    async fn refresh_media(&self, item: &WantedItem, _subtitle: &Path) {
        if self.media_servers.is_empty() {
            return;
        }
        let kind = if item.is_episode {
            RefreshKind::Episode
        } else {
            RefreshKind::Movie
        };
        let summary = self.media_servers.refresh_all(&item.file_path, kind).await;
        if !summary.failed.is_empty() {
            tracing::warn!(
                failed = summary.failed.len(),
                total = summary.total,
                "Some media servers failed to refresh"
            );
        }
    }

    fn fail_item(&self, item: &WantedItem, error: &PipelineError) -> Result<(), PipelineError> {
        let message = error.to_string();
        self.wanted.fail(item.id, &message)?;
        self.history.record(
            HistoryAction::Failed,
            &NewHistoryEntry {
                file_path: &item.file_path,
                language: &item.target_language,
                details: Some(&message),
                ..Default::default()
            },
        )?;
        self.emit_processed(item, "failed", "-");
        Ok(())
    }

    fn emit_processed(&self, item: &WantedItem, status: &str, case: &str) {
        self.events.emit(
            "wanted_item_processed",
            serde_json::json!({
                "file_path": item.file_path,
                "language": item.target_language,
                "subtitle_type": item.subtitle_type.as_str(),
                "status": status,
                "case": case,
            }),
        );
    }
}

fn check_cancel(cancel: &CancelFlag) -> Result<(), PipelineError> {
    if cancel.is_cancelled() {
        Err(PipelineError::Cancelled)
    } else {
        Ok(())
    }
}
