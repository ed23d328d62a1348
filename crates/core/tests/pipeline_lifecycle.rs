//! End-to-end acquisition pipeline scenarios against mocked external
//! services: providers, translation backends, ffprobe and media servers.

use std::sync::Arc;

use sublarr_core::breaker::{BreakerConfig, BreakerRegistry};
use sublarr_core::config::{
    AcquisitionConfig, QualityConfig, TranslationConfig, TranslationMemoryConfig,
};
use sublarr_core::events::create_event_bus;
use sublarr_core::integrations::MediaServerManager;
use sublarr_core::media::{EmbeddedCodec, MediaInfo, SubtitleStreamInfo};
use sublarr_core::pipeline::{AcquisitionEngine, PipelineError, ProcessOutcome};
use sublarr_core::providers::{
    ProviderManager, ScoringEngine, SubtitleProvider, SubtitleResult, VideoQuery,
};
use sublarr_core::runtime::CancelFlag;
use sublarr_core::store::{
    BlacklistStore, Database, ExistingSub, HistoryStore, NewWantedItem, PresetStore,
    ProfileStore, ProviderCacheStore, ScoringStore, SubtitleType, TranslationMemoryStore,
    WantedStatus, WantedStore,
};
use sublarr_core::subtitle::SubtitleFormat;
use sublarr_core::testing::{
    MockBackend, MockMediaServer, MockProber, MockProvider, MockTranscriber,
};
use sublarr_core::translate::{ChainEntry, FallbackChain, TranslationManager};

const ASS_SOURCE: &str = "[Script Info]\nScriptType: v4.00+\n\n[V4+ Styles]\nFormat: Name, Fontname, Fontsize\nStyle: Default,Arial,48\nStyle: Signs,Arial,40\n\n[Events]\nFormat: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\nDialogue: 0,0:00:01.00,0:00:03.00,Default,,0,0,0,,Hello there\nDialogue: 0,0:00:04.00,0:00:06.00,Signs,,0,0,0,,{\\pos(960,540)}STATION\nDialogue: 0,0:00:07.00,0:00:09.00,Default,,0,0,0,,See you tomorrow\n";

const SRT_SOURCE: &str = "1\n00:00:01,000 --> 00:00:02,000\nHello there\n\n2\n00:00:03,000 --> 00:00:04,000\nSee you tomorrow\n\n";

struct Harness {
    engine: AcquisitionEngine,
    wanted: WantedStore,
    history: HistoryStore,
    _dir: tempfile::TempDir,
    video: std::path::PathBuf,
}

struct HarnessOptions {
    providers: Vec<Arc<dyn SubtitleProvider>>,
    backends: Vec<MockBackend>,
    prober: MockProber,
    with_transcriber: bool,
    media_servers: Vec<MockMediaServer>,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            backends: vec![MockBackend::new("primary").translating(|l| format!("DE:{}", l))],
            prober: MockProber::new(),
            with_transcriber: false,
            media_servers: Vec::new(),
        }
    }
}

fn build_harness(options: HarnessOptions) -> Harness {
    let dir = tempfile::TempDir::new().unwrap();
    let video = dir.path().join("S01E01.mkv");
    std::fs::write(&video, b"fake video").unwrap();

    let db = Database::in_memory().unwrap();
    let wanted = WantedStore::new(db.clone());
    let history = HistoryStore::new(db.clone());
    let scoring_store = ScoringStore::new(db.clone());
    scoring_store.seed_defaults().unwrap();

    let breakers = Arc::new(BreakerRegistry::new(BreakerConfig {
        failure_threshold: 3,
        cooldown: std::time::Duration::from_secs(60),
    }));

    let provider_manager = Arc::new(ProviderManager::new(
        options.providers,
        ProviderCacheStore::new(db.clone()),
        BlacklistStore::new(db.clone()),
        Arc::new(ScoringEngine::new(scoring_store)),
        Arc::clone(&breakers),
    ));

    let chain = FallbackChain::new(
        options
            .backends
            .into_iter()
            .map(|b| ChainEntry {
                backend: Arc::new(b),
                single_line_fallback: false,
            })
            .collect(),
        Arc::clone(&breakers),
    );
    let translator = Arc::new(TranslationManager::new(
        chain,
        TranslationMemoryStore::new(db.clone()),
        sublarr_core::store::GlossaryStore::new(db.clone()),
        PresetStore::new(db.clone()),
        TranslationConfig {
            backends: Vec::new(),
            batch_size: 50,
            quality: QualityConfig {
                enabled: false,
                threshold: 50,
                max_retries: 2,
            },
            memory: TranslationMemoryConfig {
                enabled: false,
                similarity_threshold: 0.9,
            },
        },
    ));

    let media_servers = Arc::new(MediaServerManager::new(
        options
            .media_servers
            .into_iter()
            .map(|m| Arc::new(m) as Arc<dyn sublarr_core::integrations::MediaServer>)
            .collect(),
        Arc::clone(&breakers),
    ));

    let (events, dispatcher) = create_event_bus(vec![], None, 256, 4);
    tokio::spawn(dispatcher.run());

    let transcriber: Option<Arc<dyn sublarr_core::transcribe::Transcriber>> =
        if options.with_transcriber {
            Some(Arc::new(MockTranscriber::new(SRT_SOURCE)))
        } else {
            None
        };

    let engine = AcquisitionEngine::new(
        wanted.clone(),
        history.clone(),
        ProfileStore::new(db.clone()),
        provider_manager,
        translator,
        Arc::new(options.prober),
        transcriber,
        media_servers,
        events,
        AcquisitionConfig {
            upgrade_window_days: 7,
            upgrade_delete_srt: false,
            max_attempts: 2,
            whisper_score_threshold: 50,
        },
    );

    Harness {
        engine,
        wanted,
        history,
        _dir: dir,
        video,
    }
}

fn wanted_item(harness: &Harness, lang: &str, kind: SubtitleType) -> i64 {
    let (id, _) = harness
        .wanted
        .upsert(&NewWantedItem {
            file_path: harness.video.to_string_lossy().to_string(),
            target_language: lang.to_string(),
            subtitle_type: kind,
            source_language: "en".to_string(),
            existing_sub: ExistingSub::None,
            title: "Show".to_string(),
            season: Some(1),
            episode: Some(1),
            absolute_episode: None,
            year: Some(2023),
            is_episode: true,
            profile_id: None,
            series_id: None,
            file_added_at: Some(chrono::Utc::now() - chrono::Duration::days(2)),
        })
        .unwrap();
    id
}

fn provider_result(language: &str, format: SubtitleFormat, release: &str) -> SubtitleResult {
    SubtitleResult {
        provider_name: "os".to_string(),
        language: language.to_string(),
        format,
        download_url: format!("http://x/{}", release.replace(' ', ".")),
        score: 0,
        forced: false,
        machine_translated: false,
        mt_confidence: 0,
        uploader_trust: 0,
        hash: None,
        release_info: Some(release.to_string()),
    }
}

fn embedded_info(codec: EmbeddedCodec) -> MediaInfo {
    MediaInfo {
        subtitle_streams: vec![SubtitleStreamInfo {
            index: 2,
            codec,
            language: Some("eng".to_string()),
            title: None,
            forced_disposition: false,
            default_disposition: true,
        }],
        audio_streams: vec![sublarr_core::media::AudioStreamInfo {
            index: 1,
            language: Some("jpn".to_string()),
            default_disposition: true,
        }],
    }
}

// --- Case A ------------------------------------------------------------

#[tokio::test]
async fn case_a_skips_when_target_ass_exists() {
    let harness = build_harness(HarnessOptions::default());
    std::fs::write(harness.video.with_file_name("S01E01.de.ass"), ASS_SOURCE).unwrap();

    let id = wanted_item(&harness, "de", SubtitleType::Full);
    let outcome = harness
        .engine
        .process_item(id, &CancelFlag::new())
        .await
        .unwrap();

    match outcome {
        ProcessOutcome::Done(report) => {
            assert_eq!(report.case, "A");
            assert_eq!(report.stats["skip"], "skip: present");
        }
        other => panic!("expected Done, got {:?}", other),
    }

    let item = harness.wanted.get(id).unwrap();
    assert_eq!(item.status, WantedStatus::Completed);
    assert!(item.result_path.unwrap().ends_with("S01E01.de.ass"));
    assert!(item.result_hash.is_some());
}

// --- Case C1: embedded source ASS → translate ---------------------------

#[tokio::test]
async fn case_c1_translates_embedded_ass() {
    let backend = MockBackend::new("primary").translating(|l| format!("DE:{}", l));
    let sent = backend.sent_lines();
    let harness = build_harness(HarnessOptions {
        prober: MockProber::new()
            .with_info(embedded_info(EmbeddedCodec::Ass))
            .with_stream_content(2, ASS_SOURCE),
        backends: vec![backend],
        ..Default::default()
    });

    let id = wanted_item(&harness, "de", SubtitleType::Full);
    let outcome = harness
        .engine
        .process_item(id, &CancelFlag::new())
        .await
        .unwrap();

    let ProcessOutcome::Done(report) = outcome else {
        panic!("expected Done");
    };
    assert_eq!(report.case, "C1");

    let out_path = harness.video.with_file_name("S01E01.de.ass");
    let content = std::fs::read_to_string(&out_path).unwrap();
    assert!(content.contains("DE:Hello there"));
    assert!(content.contains("DE:See you tomorrow"));
    // Signs line untouched and never sent to the backend
    assert!(content.contains("{\\pos(960,540)}STATION"));
    assert!(content.contains("Language: de"));
    let sent = sent.lock().unwrap();
    assert!(sent.iter().all(|l| !l.contains("STATION")));

    // Quality sidecar exists with one score per translated line
    let sidecar = harness.video.with_file_name("S01E01.de.ass.quality.json");
    let scores: Vec<u8> =
        serde_json::from_str(&std::fs::read_to_string(&sidecar).unwrap()).unwrap();
    assert_eq!(scores.len(), 2);
}

// --- Case C3: provider search + translate (S2) ---------------------------

#[tokio::test]
async fn case_c3_downloads_source_and_translates() {
    let provider = MockProvider::new("os")
        .with_results(vec![provider_result(
            "en",
            SubtitleFormat::Ass,
            "Show S01E01 1080p",
        )])
        .with_download(ASS_SOURCE.as_bytes().to_vec());
    let media_server = MockMediaServer::new("jellyfin");
    let refresh_calls = media_server.call_count();

    let harness = build_harness(HarnessOptions {
        providers: vec![Arc::new(provider)],
        media_servers: vec![media_server],
        ..Default::default()
    });

    let id = wanted_item(&harness, "de", SubtitleType::Full);
    let outcome = harness
        .engine
        .process_item(id, &CancelFlag::new())
        .await
        .unwrap();

    let ProcessOutcome::Done(report) = outcome else {
        panic!("expected Done");
    };
    assert_eq!(report.case, "C3");
    assert_eq!(
        report.subtitle_path.unwrap(),
        harness.video.with_file_name("S01E01.de.ass")
    );

    // Media server was notified after the write
    assert_eq!(refresh_calls.load(std::sync::atomic::Ordering::SeqCst), 1);

    let history = harness.history.list(10, 0).unwrap();
    assert!(history
        .iter()
        .any(|h| h.action == sublarr_core::store::HistoryAction::Translated));
}

#[tokio::test]
async fn case_c3_direct_target_download_skips_translation() {
    let german_srt = "1\n00:00:01,000 --> 00:00:02,000\nHallo\n\n";
    let provider = MockProvider::new("os")
        .with_results(vec![provider_result(
            "de",
            SubtitleFormat::Srt,
            "Show S01E01 German",
        )])
        .with_download(german_srt.as_bytes().to_vec());
    let backend = MockBackend::new("primary").translating(|l| l.to_string());
    let backend_calls = backend.call_count();

    let harness = build_harness(HarnessOptions {
        providers: vec![Arc::new(provider)],
        backends: vec![backend],
        ..Default::default()
    });

    let id = wanted_item(&harness, "de", SubtitleType::Full);
    let outcome = harness
        .engine
        .process_item(id, &CancelFlag::new())
        .await
        .unwrap();

    let ProcessOutcome::Done(report) = outcome else {
        panic!("expected Done");
    };
    assert_eq!(report.action, sublarr_core::store::HistoryAction::Downloaded);
    assert_eq!(backend_calls.load(std::sync::atomic::Ordering::SeqCst), 0);

    let out = harness.video.with_file_name("S01E01.de.srt");
    assert!(out.exists());
}

// --- Case B1: upgrade (S3) -----------------------------------------------

#[tokio::test]
async fn case_b1_upgrades_srt_to_ass() {
    let provider = MockProvider::new("os")
        .with_results(vec![provider_result(
            "de",
            SubtitleFormat::Ass,
            "Show S01E01 German ASS",
        )])
        .with_download(ASS_SOURCE.as_bytes().to_vec());

    let harness = build_harness(HarnessOptions {
        providers: vec![Arc::new(provider)],
        ..Default::default()
    });
    let srt_path = harness.video.with_file_name("S01E01.de.srt");
    std::fs::write(&srt_path, SRT_SOURCE).unwrap();

    let id = wanted_item(&harness, "de", SubtitleType::Full);
    let outcome = harness
        .engine
        .process_item(id, &CancelFlag::new())
        .await
        .unwrap();

    let ProcessOutcome::Done(report) = outcome else {
        panic!("expected Done");
    };
    assert_eq!(report.case, "B1");
    assert_eq!(report.stats["upgraded"], true);
    assert!(harness.video.with_file_name("S01E01.de.ass").exists());
    // O1 default: the SRT is kept
    assert!(srt_path.exists());
}

#[tokio::test]
async fn case_b3_keeps_srt_without_upgrade_path() {
    // No providers, no embedded source: the SRT stays and the item completes
    let harness = build_harness(HarnessOptions::default());
    let srt_path = harness.video.with_file_name("S01E01.de.srt");
    std::fs::write(&srt_path, SRT_SOURCE).unwrap();

    let id = wanted_item(&harness, "de", SubtitleType::Full);
    let outcome = harness
        .engine
        .process_item(id, &CancelFlag::new())
        .await
        .unwrap();

    let ProcessOutcome::Done(report) = outcome else {
        panic!("expected Done");
    };
    assert_eq!(report.case, "B3");
    let item = harness.wanted.get(id).unwrap();
    assert_eq!(item.status, WantedStatus::Completed);
}

// --- Forced pipeline (S4) ------------------------------------------------

#[tokio::test]
async fn forced_items_are_download_only() {
    let forced_ass = ASS_SOURCE;
    let mut result = provider_result("de", SubtitleFormat::Ass, "Show S01E01 signs");
    result.forced = true;
    let provider = MockProvider::new("os")
        .with_results(vec![result])
        .with_download(forced_ass.as_bytes().to_vec());
    let backend = MockBackend::new("primary").translating(|l| l.to_string());
    let backend_calls = backend.call_count();

    let harness = build_harness(HarnessOptions {
        providers: vec![Arc::new(provider)],
        backends: vec![backend],
        ..Default::default()
    });

    let id = wanted_item(&harness, "de", SubtitleType::Forced);
    let outcome = harness
        .engine
        .process_item(id, &CancelFlag::new())
        .await
        .unwrap();

    let ProcessOutcome::Done(report) = outcome else {
        panic!("expected Done");
    };
    assert_eq!(report.case, "forced");
    // Saved under the forced path, never translated
    assert!(harness
        .video
        .with_file_name("S01E01.de.forced.ass")
        .exists());
    assert_eq!(backend_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
}

// --- Case C4: whisper fallback -------------------------------------------

#[tokio::test]
async fn case_c4_transcribes_when_no_providers_return() {
    let harness = build_harness(HarnessOptions {
        prober: MockProber::new().with_info(embedded_info(EmbeddedCodec::Other)),
        with_transcriber: true,
        ..Default::default()
    });

    let id = wanted_item(&harness, "de", SubtitleType::Full);
    let outcome = harness
        .engine
        .process_item(id, &CancelFlag::new())
        .await
        .unwrap();
    assert!(matches!(outcome, ProcessOutcome::TranscriptionQueued));
    assert_eq!(
        harness.wanted.get(id).unwrap().status,
        WantedStatus::Transcribing
    );

    // The queued transcription job resumes at the translate-SRT step
    let report = harness
        .engine
        .transcribe_item(id, &CancelFlag::new())
        .await
        .unwrap();
    assert_eq!(report.case, "C4");
    assert_eq!(report.stats["transcribed"], true);

    let out = harness.video.with_file_name("S01E01.de.srt");
    let content = std::fs::read_to_string(&out).unwrap();
    assert!(content.contains("DE:Hello there"));
    assert_eq!(
        harness.wanted.get(id).unwrap().status,
        WantedStatus::Completed
    );
}

// --- Retry and failure semantics ----------------------------------------

#[tokio::test]
async fn no_candidates_requeues_until_attempts_exhausted() {
    let harness = build_harness(HarnessOptions::default());
    let id = wanted_item(&harness, "de", SubtitleType::Full);

    // max_attempts = 2: first round requeues
    let outcome = harness
        .engine
        .process_item(id, &CancelFlag::new())
        .await
        .unwrap();
    assert!(matches!(outcome, ProcessOutcome::Requeued { .. }));
    assert_eq!(harness.wanted.get(id).unwrap().status, WantedStatus::Pending);

    // Second round exhausts and fails terminally
    let result = harness.engine.process_item(id, &CancelFlag::new()).await;
    assert!(matches!(result, Err(PipelineError::NoSource(_))));

    let item = harness.wanted.get(id).unwrap();
    assert_eq!(item.status, WantedStatus::Failed);
    assert!(item.error.unwrap().starts_with("no_source"));
}

#[tokio::test]
async fn translation_failure_is_terminal_with_structured_error() {
    let provider = MockProvider::new("os")
        .with_results(vec![provider_result(
            "en",
            SubtitleFormat::Srt,
            "Show S01E01",
        )])
        .with_download(SRT_SOURCE.as_bytes().to_vec());

    let harness = build_harness(HarnessOptions {
        providers: vec![Arc::new(provider)],
        backends: vec![
            MockBackend::new("primary").failing("HTTP 503"),
            MockBackend::new("secondary").failing("timeout"),
        ],
        ..Default::default()
    });

    let id = wanted_item(&harness, "de", SubtitleType::Full);
    let result = harness.engine.process_item(id, &CancelFlag::new()).await;
    assert!(matches!(result, Err(PipelineError::Translation(_))));

    let item = harness.wanted.get(id).unwrap();
    assert_eq!(item.status, WantedStatus::Failed);
    let error = item.error.unwrap();
    assert!(error.contains("HTTP 503"));
    assert!(error.contains("timeout"));
}

#[tokio::test]
async fn fallback_chain_records_secondary_backend() {
    let provider = MockProvider::new("os")
        .with_results(vec![provider_result(
            "en",
            SubtitleFormat::Srt,
            "Show S01E01",
        )])
        .with_download(SRT_SOURCE.as_bytes().to_vec());

    let harness = build_harness(HarnessOptions {
        providers: vec![Arc::new(provider)],
        backends: vec![
            MockBackend::new("primary").failing("HTTP 503"),
            MockBackend::new("secondary").translating(|l| format!("DE:{}", l)),
        ],
        ..Default::default()
    });

    let id = wanted_item(&harness, "de", SubtitleType::Full);
    let outcome = harness
        .engine
        .process_item(id, &CancelFlag::new())
        .await
        .unwrap();

    let ProcessOutcome::Done(report) = outcome else {
        panic!("expected Done");
    };
    assert_eq!(report.stats["backend_used"], "secondary");
    let attempts = report.stats["attempts"].as_array().unwrap();
    assert_eq!(attempts.len(), 2);
    assert!(attempts[0]["error"].as_str().unwrap().contains("HTTP 503"));
}

#[tokio::test]
async fn claim_race_returns_already_processing() {
    let harness = build_harness(HarnessOptions::default());
    let id = wanted_item(&harness, "de", SubtitleType::Full);
    harness.wanted.claim(id).unwrap();

    let result = harness.engine.process_item(id, &CancelFlag::new()).await;
    assert!(matches!(result, Err(PipelineError::AlreadyProcessing)));
    // The item keeps its original claim untouched
    assert_eq!(
        harness.wanted.get(id).unwrap().status,
        WantedStatus::Searching
    );
}

#[tokio::test]
async fn cancellation_fails_item_with_reason() {
    let provider = MockProvider::new("os")
        .with_results(vec![provider_result(
            "en",
            SubtitleFormat::Srt,
            "Show S01E01",
        )])
        .with_download(SRT_SOURCE.as_bytes().to_vec());
    let harness = build_harness(HarnessOptions {
        providers: vec![Arc::new(provider)],
        ..Default::default()
    });

    let id = wanted_item(&harness, "de", SubtitleType::Full);
    let cancel = CancelFlag::new();
    cancel.cancel();

    let result = harness.engine.process_item(id, &cancel).await;
    assert!(matches!(result, Err(PipelineError::Cancelled)));
    let item = harness.wanted.get(id).unwrap();
    assert_eq!(item.status, WantedStatus::Failed);
    assert_eq!(item.error.as_deref(), Some("cancelled"));
}

#[tokio::test]
async fn case_b2_translates_embedded_ass_with_srt_reference() {
    // Target SRT on disk, no provider ASS: B2 translates the embedded
    // source ASS, and the existing SRT serves as the reference block.
    let backend = MockBackend::new("primary").translating(|l| format!("DE:{}", l));
    let harness = build_harness(HarnessOptions {
        prober: MockProber::new()
            .with_info(embedded_info(EmbeddedCodec::Ass))
            .with_stream_content(2, ASS_SOURCE),
        backends: vec![backend],
        ..Default::default()
    });

    let german_srt = "1\n00:00:01,000 --> 00:00:02,000\nHallo zusammen\n\n";
    let srt_path = harness.video.with_file_name("S01E01.de.srt");
    std::fs::write(&srt_path, german_srt).unwrap();

    let id = wanted_item(&harness, "de", SubtitleType::Full);
    let outcome = harness
        .engine
        .process_item(id, &CancelFlag::new())
        .await
        .unwrap();

    let ProcessOutcome::Done(report) = outcome else {
        panic!("expected Done");
    };
    assert_eq!(report.case, "B2");
    assert_eq!(report.stats["upgraded"], true);
    assert!(harness.video.with_file_name("S01E01.de.ass").exists());
}
