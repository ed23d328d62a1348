use std::sync::Arc;

use sublarr_core::{
    AcquisitionEngine, Authenticator, BlacklistStore, Config, ConfigEntriesStore, EventHandle,
    GlossaryStore, HistoryStore, HookStore, JobRunner, LibraryStore, MediaServerManager,
    PresetStore, ProfileStore, ProviderCacheStore, ProviderManager, SanitizedConfig, ScoringStore,
    TranslationManager, WantedScanner, WantedStore,
};

use crate::api::WsBroadcaster;

/// Shared application state
pub struct AppState {
    config: Config,
    authenticator: Arc<dyn Authenticator>,
    events: EventHandle,
    wanted: WantedStore,
    history: HistoryStore,
    profiles: ProfileStore,
    library: LibraryStore,
    glossary: GlossaryStore,
    blacklist: BlacklistStore,
    hooks: HookStore,
    scoring: ScoringStore,
    config_entries: ConfigEntriesStore,
    presets: PresetStore,
    provider_cache: ProviderCacheStore,
    providers: Arc<ProviderManager>,
    translator: Arc<TranslationManager>,
    engine: Arc<AcquisitionEngine>,
    scanner: Arc<WantedScanner>,
    runner: Arc<JobRunner>,
    media_servers: Arc<MediaServerManager>,
    ws_broadcaster: Arc<WsBroadcaster>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        authenticator: Arc<dyn Authenticator>,
        events: EventHandle,
        wanted: WantedStore,
        history: HistoryStore,
        profiles: ProfileStore,
        library: LibraryStore,
        glossary: GlossaryStore,
        blacklist: BlacklistStore,
        hooks: HookStore,
        scoring: ScoringStore,
        config_entries: ConfigEntriesStore,
        presets: PresetStore,
        provider_cache: ProviderCacheStore,
        providers: Arc<ProviderManager>,
        translator: Arc<TranslationManager>,
        engine: Arc<AcquisitionEngine>,
        scanner: Arc<WantedScanner>,
        runner: Arc<JobRunner>,
        media_servers: Arc<MediaServerManager>,
        ws_broadcaster: Arc<WsBroadcaster>,
    ) -> Self {
        Self {
            config,
            authenticator,
            events,
            wanted,
            history,
            profiles,
            library,
            glossary,
            blacklist,
            hooks,
            scoring,
            config_entries,
            presets,
            provider_cache,
            providers,
            translator,
            engine,
            scanner,
            runner,
            media_servers,
            ws_broadcaster,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn authenticator(&self) -> &dyn Authenticator {
        self.authenticator.as_ref()
    }

    pub fn events(&self) -> &EventHandle {
        &self.events
    }

    pub fn wanted(&self) -> &WantedStore {
        &self.wanted
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn profiles(&self) -> &ProfileStore {
        &self.profiles
    }

    pub fn library(&self) -> &LibraryStore {
        &self.library
    }

    pub fn glossary(&self) -> &GlossaryStore {
        &self.glossary
    }

    pub fn blacklist(&self) -> &BlacklistStore {
        &self.blacklist
    }

    pub fn hooks(&self) -> &HookStore {
        &self.hooks
    }

    pub fn scoring(&self) -> &ScoringStore {
        &self.scoring
    }

    pub fn config_entries(&self) -> &ConfigEntriesStore {
        &self.config_entries
    }

    pub fn presets(&self) -> &PresetStore {
        &self.presets
    }

    pub fn provider_cache(&self) -> &ProviderCacheStore {
        &self.provider_cache
    }

    pub fn providers(&self) -> &Arc<ProviderManager> {
        &self.providers
    }

    pub fn translator(&self) -> &Arc<TranslationManager> {
        &self.translator
    }

    pub fn engine(&self) -> &Arc<AcquisitionEngine> {
        &self.engine
    }

    pub fn scanner(&self) -> &Arc<WantedScanner> {
        &self.scanner
    }

    pub fn runner(&self) -> &Arc<JobRunner> {
        &self.runner
    }

    pub fn media_servers(&self) -> &Arc<MediaServerManager> {
        &self.media_servers
    }

    pub fn ws_broadcaster(&self) -> &Arc<WsBroadcaster> {
        &self.ws_broadcaster
    }
}
