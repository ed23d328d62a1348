// Allow some clippy lints that are too noisy for this codebase
#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::manual_range_contains)]
#![allow(clippy::collapsible_if)]

pub mod auth;
pub mod breaker;
pub mod config;
pub mod events;
pub mod integrations;
pub mod media;
pub mod metrics;
pub mod pipeline;
pub mod providers;
pub mod runtime;
pub mod scanner;
pub mod store;
pub mod subtitle;
pub mod transcribe;
pub mod translate;

/// Testing utilities and mock implementations for E2E tests.
///
/// This module provides mock implementations of all external service traits,
/// allowing comprehensive E2E testing without real infrastructure.
pub mod testing;

pub use auth::{
    create_authenticator, ApiKeyAuthenticator, AuthError, AuthRequest, Authenticator, Identity,
    NoneAuthenticator,
};
pub use breaker::{BreakerConfig, BreakerRegistry, BreakerState, BreakerStatus, CircuitBreaker};
pub use config::{
    load_config, load_config_from_str, validate_config, AcquisitionConfig, ArrInstanceConfig,
    AuthConfig, AuthMethod, BackendInstanceConfig, BackendKind, Config, ConfigError,
    DatabaseConfig, LibraryConfig, MediaServerConfig, MediaServerKind, PathMapConfig,
    ProviderInstanceConfig, ProviderKind, QualityConfig, SanitizedConfig, ScannerConfig,
    ServerConfig, TranslationConfig, TranslationMemoryConfig, WhisperConfig,
};
pub use events::{
    create_event_bus, event_def, is_progress_event, EventDef, EventDispatcher, EventEnvelope,
    EventHandle, EventSubscriber, HookSubscriber, WeakEventHandle, WebhookSubscriber, WsSink,
    DEFAULT_POOL_SIZE, DEFAULT_QUEUE_SIZE, EVENT_CATALOG,
};
pub use integrations::{
    build_media_servers, ArrEpisode, ArrKind, ArrMovie, ArrSeries, IntegrationError,
    InventoryClient, JellyfinServer, MediaServer, MediaServerManager, PlexServer, RadarrClient,
    RefreshKind, RefreshSummary, SonarrClient,
};
pub use media::{
    AudioStreamInfo, EmbeddedCodec, FfmpegProber, MediaError, MediaInfo, MediaProber,
    SubtitleStreamInfo,
};
pub use pipeline::{
    content_hash, write_atomic, AcquisitionEngine, ItemReport, PipelineError, ProcessOutcome,
};
pub use providers::{
    build_providers, classify_forced, compute_score, is_forced_result, ConfigField,
    ConfigFieldKind, DownloadedSubtitle, ForcedSignals, JimakuProvider, OpenSubtitlesProvider,
    ProviderError, ProviderManager, ProviderStats, ScoringEngine, ScoringSnapshot, SearchOutcome,
    SubtitleProvider, SubtitleResult, VideoQuery,
};
pub use runtime::{CancelFlag, JobContext, JobRunner, JobWork, Scheduler};
pub use scanner::{ScanMode, ScanReport, WantedScanner};
pub use store::{
    BlacklistEntry, BlacklistStore, ConfigEntriesStore, Database, EpisodeRow, ExistingSub,
    ForcedPreference, GlossaryEntry, GlossaryScope, GlossaryStore, HistoryAction, HistoryEntry,
    HistoryStore, HookConfig, HookLogEntry, HookStore, Job, JobKind, JobStatus, JobStore,
    LanguageProfile, LibraryStore, MediaKind, MovieRow, NewHistoryEntry, NewHookConfig,
    NewLanguageProfile, NewWantedItem, NewWebhookConfig, PresetStore, ProfileStore, PromptPreset,
    ProviderCacheStore, ScoreType, ScoringStore, SeriesRow, StoreError, SubtitleType,
    TranslationMemoryStore, WantedItem, WantedStatus, WantedStore, WantedSummary, WebhookConfig,
};
pub use subtitle::{
    best_existing_full, canonical_language, classify_styles, detect_format, extract_subtitles,
    find_existing_subtitles, language_matches, quality_sidecar_path, subtitle_path, AssDocument,
    AssEvent, Classifier, FoundSubtitle, SrtCue, SrtFile, StyleClass, SubtitleError,
    SubtitleFormat,
};
pub use transcribe::{TranscribeError, Transcriber, TranscriptionOutcome, WhisperClient};
pub use translate::{
    build_backends, build_translation_prompt, normalize_line, AnthropicBackend,
    BackendCapabilities, ChainEntry, DeepLBackend, DocumentTranslation, FallbackChain,
    LineTranslationResult, OllamaBackend, TranslationBackend, TranslationError,
    TranslationManager, TranslationOutcome, TranslationRequest, TranslationStats,
};
