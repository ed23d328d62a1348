mod api;
mod metrics;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sublarr_core::{
    build_backends, build_media_servers, build_providers, create_authenticator, create_event_bus,
    load_config, validate_config, AcquisitionEngine, Authenticator, BlacklistStore, BreakerConfig,
    BreakerRegistry, ConfigEntriesStore, Database, EventSubscriber, FallbackChain, FfmpegProber,
    GlossaryStore, HistoryStore, HookStore, HookSubscriber, InventoryClient, JobKind, JobRunner,
    JobStore, LibraryStore, MediaServerManager, PresetStore, ProcessOutcome, ProfileStore,
    ProviderCacheStore, ProviderManager, RadarrClient, Scheduler, ScoringEngine, ScoringStore,
    SonarrClient, Transcriber,
};

use api::{create_router, WsBroadcaster};
use state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("SUBLARR_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!("Sublarr {} starting", VERSION);
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;
    info!("Configuration loaded successfully");

    // Database and repositories
    let db = Database::open(std::path::Path::new(&config.database.path))
        .context("Failed to open database")?;
    info!("Database initialized at {}", config.database.path);

    let wanted = sublarr_core::WantedStore::new(db.clone());
    let jobs = JobStore::new(db.clone());
    let history = HistoryStore::new(db.clone());
    let profiles = ProfileStore::new(db.clone());
    let library = LibraryStore::new(db.clone());
    let glossary = GlossaryStore::new(db.clone());
    let blacklist = BlacklistStore::new(db.clone());
    let hooks = HookStore::new(db.clone());
    let scoring = ScoringStore::new(db.clone());
    let config_entries = ConfigEntriesStore::new(db.clone());
    let presets = PresetStore::new(db.clone());
    let provider_cache = ProviderCacheStore::new(db.clone());
    let memory = sublarr_core::TranslationMemoryStore::new(db.clone());

    scoring.seed_defaults().context("Failed to seed scoring defaults")?;

    sublarr_core::metrics::register_core_metrics(prometheus::default_registry()).ok();

    // Authenticator
    let authenticator: Arc<dyn Authenticator> = Arc::from(
        create_authenticator(&config.auth).context("Failed to create authenticator")?,
    );
    info!("Using authenticator: {}", authenticator.method_name());

    // Event bus: WebSocket sink plus shell-hook and webhook subscribers
    let ws_broadcaster = Arc::new(WsBroadcaster::default());
    let hook_subscriber = HookSubscriber::new(hooks.clone());
    let webhook_subscriber = sublarr_core::WebhookSubscriber::new(hooks.clone());
    let subscribers: Vec<Arc<dyn EventSubscriber>> =
        vec![hook_subscriber.clone(), webhook_subscriber];
    let (events, dispatcher) = create_event_bus(
        subscribers,
        Some(ws_broadcaster.clone() as Arc<dyn sublarr_core::WsSink>),
        sublarr_core::DEFAULT_QUEUE_SIZE,
        sublarr_core::DEFAULT_POOL_SIZE,
    );
    hook_subscriber.set_emitter(events.clone());
    let dispatcher_handle = tokio::spawn(dispatcher.run());
    info!("Event bus started");

    // Process-wide breaker registry
    let breakers = Arc::new(BreakerRegistry::new(BreakerConfig::default()));

    // Provider manager
    let provider_manager = Arc::new(ProviderManager::new(
        build_providers(&config.providers),
        provider_cache.clone(),
        blacklist.clone(),
        Arc::new(ScoringEngine::new(scoring.clone())),
        Arc::clone(&breakers),
    ));
    info!(
        providers = provider_manager.provider_names().len(),
        "Provider manager initialized"
    );

    // Translation manager
    let chain = FallbackChain::new(
        build_backends(&config.translation.backends),
        Arc::clone(&breakers),
    );
    let translator = Arc::new(sublarr_core::TranslationManager::new(
        chain,
        memory,
        glossary.clone(),
        presets.clone(),
        config.translation.clone(),
    ));
    info!(
        backends = config.translation.backends.len(),
        "Translation manager initialized"
    );

    // Media servers (notify-all)
    let media_servers = Arc::new(MediaServerManager::new(
        build_media_servers(&config.media_servers),
        Arc::clone(&breakers),
    ));

    // Tooling: ffprobe/ffmpeg and optional Whisper
    let prober = Arc::new(FfmpegProber::new());
    let transcriber: Option<Arc<dyn Transcriber>> = config
        .whisper
        .as_ref()
        .map(|w| Arc::new(sublarr_core::WhisperClient::new(w.clone())) as Arc<dyn Transcriber>);
    if transcriber.is_some() {
        info!("Whisper transcription fallback enabled");
    }

    // Acquisition engine
    let engine = Arc::new(AcquisitionEngine::new(
        wanted.clone(),
        history.clone(),
        profiles.clone(),
        Arc::clone(&provider_manager),
        Arc::clone(&translator),
        prober.clone() as Arc<dyn sublarr_core::MediaProber>,
        transcriber,
        Arc::clone(&media_servers),
        events.clone(),
        config.acquisition.clone(),
    ));

    // Inventory clients and the scanner
    let mut inventories: Vec<Arc<dyn InventoryClient>> = Vec::new();
    for instance in config.sonarr.iter().filter(|i| i.enabled) {
        info!(instance = %instance.name, "Registering Sonarr instance");
        inventories.push(Arc::new(SonarrClient::new(instance)));
    }
    for instance in config.radarr.iter().filter(|i| i.enabled) {
        info!(instance = %instance.name, "Registering Radarr instance");
        inventories.push(Arc::new(RadarrClient::new(instance)));
    }
    let scanner = Arc::new(sublarr_core::WantedScanner::new(
        inventories,
        library.clone(),
        profiles.clone(),
        wanted.clone(),
        config_entries.clone(),
        prober as Arc<dyn sublarr_core::MediaProber>,
        events.clone(),
        config.scanner.clone(),
        config.library.clone(),
    ));

    // Job runtime and schedules
    let max_whisper = config.whisper.as_ref().map(|w| w.max_concurrent).unwrap_or(1);
    let runner = Arc::new(JobRunner::new(jobs, events.clone(), max_whisper));

    let scheduler = Scheduler::new();
    spawn_schedules(&scheduler, &config, &scanner, &runner, &wanted, &provider_cache);
    spawn_acquisition_loop(&scheduler, &engine, &wanted, &runner);

    // App state and router
    let app_state = Arc::new(AppState::new(
        config.clone(),
        authenticator,
        events.clone(),
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
        provider_manager,
        translator,
        engine,
        scanner,
        runner,
        media_servers,
        ws_broadcaster,
    ));
    let app = create_router(app_state)
        .layer(axum::middleware::from_fn(metrics::metrics_middleware));

    // Serve
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Ordered teardown: stop schedules, then close the bus so the
    // dispatcher drains remaining events before exit.
    info!("Server shutting down");
    scheduler.shutdown();
    drop(events);
    let _ = dispatcher_handle.await;
    info!("Event dispatcher stopped");

    Ok(())
}

/// Spawn the scheduled background jobs: wanted scan, upgrade scan,
/// provider-cache purge. All are reentrant-safe through the job store.
fn spawn_schedules(
    scheduler: &Scheduler,
    config: &sublarr_core::Config,
    scanner: &Arc<sublarr_core::WantedScanner>,
    runner: &Arc<JobRunner>,
    wanted: &sublarr_core::WantedStore,
    provider_cache: &ProviderCacheStore,
) {
    // Wanted scan every N hours
    {
        let scanner = Arc::clone(scanner);
        let runner = Arc::clone(runner);
        scheduler.spawn_interval(
            "wanted_scan",
            Duration::from_secs(config.scanner.interval_hours.max(1) * 3600),
            Arc::new(move || {
                let scanner = Arc::clone(&scanner);
                let runner = Arc::clone(&runner);
                Box::pin(async move {
                    match runner.has_active(JobKind::WantedScan) {
                        Ok(true) => {
                            warn!("Skipping scheduled scan, one is already running");
                            return;
                        }
                        Ok(false) => {}
                        Err(e) => {
                            error!("Scan guard check failed: {}", e);
                            return;
                        }
                    }
                    let mode = match scanner.next_scheduled_mode() {
                        Ok(mode) => mode,
                        Err(e) => {
                            error!("Failed to determine scan mode: {}", e);
                            return;
                        }
                    };
                    let scan_scanner = Arc::clone(&scanner);
                    let result = runner.submit(
                        JobKind::WantedScan,
                        None,
                        Some(serde_json::json!({ "trigger": "schedule" })),
                        Box::new(move |ctx| {
                            Box::pin(async move {
                                let report = scan_scanner
                                    .scan(mode, &ctx.job_id, &ctx.cancel)
                                    .await
                                    .map_err(|e| e.to_string())?;
                                serde_json::to_value(&report).map_err(|e| e.to_string())
                            })
                        }),
                    );
                    if let Err(e) = result {
                        error!("Failed to submit scheduled scan: {}", e);
                    }
                })
            }),
        );
    }

    // Daily upgrade scan: push SRT-bearing completed items back to pending
    {
        let wanted = wanted.clone();
        let window = config.acquisition.upgrade_window_days;
        scheduler.spawn_interval(
            "upgrade_scan",
            Duration::from_secs(24 * 3600),
            Arc::new(move || {
                let wanted = wanted.clone();
                Box::pin(async move {
                    match wanted.requeue_upgradeable(window) {
                        Ok(count) if count > 0 => {
                            info!(count, "Requeued SRT targets for upgrade");
                        }
                        Ok(_) => {}
                        Err(e) => error!("Upgrade scan failed: {}", e),
                    }
                })
            }),
        );
    }

    // Daily provider-cache purge
    {
        let provider_cache = provider_cache.clone();
        scheduler.spawn_interval(
            "cache_purge",
            Duration::from_secs(24 * 3600),
            Arc::new(move || {
                let provider_cache = provider_cache.clone();
                Box::pin(async move {
                    match provider_cache.purge_expired() {
                        Ok(removed) if removed > 0 => {
                            info!(removed, "Purged expired provider cache entries");
                        }
                        Ok(_) => {}
                        Err(e) => error!("Cache purge failed: {}", e),
                    }
                })
            }),
        );
    }
}

/// The acquisition loop: periodically drains pending wanted items through
/// the engine. Transcription hand-offs become queued jobs under the whisper
/// semaphore.
fn spawn_acquisition_loop(
    scheduler: &Scheduler,
    engine: &Arc<AcquisitionEngine>,
    wanted: &sublarr_core::WantedStore,
    runner: &Arc<JobRunner>,
) {
    let engine = Arc::clone(engine);
    let wanted = wanted.clone();
    let runner = Arc::clone(runner);

    scheduler.spawn_interval(
        "acquisition",
        Duration::from_secs(30),
        Arc::new(move || {
            let engine = Arc::clone(&engine);
            let wanted = wanted.clone();
            let runner = Arc::clone(&runner);
            Box::pin(async move {
                let pending = match wanted.list(Some(sublarr_core::WantedStatus::Pending), 10, 0) {
                    Ok(pending) => pending,
                    Err(e) => {
                        error!("Failed to list pending items: {}", e);
                        return;
                    }
                };

                for item in pending {
                    let cancel = sublarr_core::CancelFlag::new();
                    match engine.process_item(item.id, &cancel).await {
                        Ok(ProcessOutcome::TranscriptionQueued) => {
                            let engine = Arc::clone(&engine);
                            let item_id = item.id;
                            let result = runner.submit(
                                JobKind::Transcribe,
                                Some(&item.file_path),
                                Some(serde_json::json!({ "item_id": item_id })),
                                Box::new(move |ctx| {
                                    Box::pin(async move {
                                        let report = engine
                                            .transcribe_item(item_id, &ctx.cancel)
                                            .await
                                            .map_err(|e| e.to_string())?;
                                        Ok(report.stats)
                                    })
                                }),
                            );
                            if let Err(e) = result {
                                error!("Failed to queue transcription: {}", e);
                            }
                        }
                        Ok(_) => {}
                        Err(sublarr_core::PipelineError::AlreadyProcessing) => {}
                        Err(e) => {
                            warn!(item = item.id, "Item processing failed: {}", e);
                        }
                    }
                }
            })
        }),
    );
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
