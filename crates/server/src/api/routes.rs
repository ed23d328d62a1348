use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;

use super::{
    handlers, hooks, inbound, jobs, library, middleware::auth_middleware, misc, profiles,
    providers, scoring, wanted, ws,
};
use crate::metrics::metrics_handler;
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Authenticated API surface
    let api_routes = Router::new()
        // Config
        .route("/config", get(handlers::get_config))
        .route("/config", post(handlers::set_config))
        .route("/config/export", get(handlers::export_config))
        .route("/config/import", post(handlers::import_config))
        // Jobs
        .route("/jobs/translate", post(jobs::submit_translate))
        .route("/jobs/batch", post(jobs::submit_batch))
        .route("/jobs", get(jobs::list_jobs))
        .route("/jobs/{id}", get(jobs::get_job))
        .route("/jobs/{id}/cancel", post(jobs::cancel_job))
        // Wanted
        .route("/wanted", get(wanted::list_wanted))
        .route("/wanted/summary", get(wanted::summary))
        .route("/wanted/scan", post(wanted::trigger_scan))
        .route("/wanted/batch-search", post(wanted::batch_search))
        .route("/wanted/batch-extract", post(wanted::batch_extract))
        .route("/wanted/{id}/search", post(wanted::search_item))
        .route("/wanted/{id}/process", post(wanted::process_item))
        .route("/wanted/{id}/extract", post(wanted::extract_item))
        .route("/wanted/{id}", delete(wanted::delete_item))
        // Providers & translation backends
        .route("/providers", get(providers::list_providers))
        .route("/providers/test", post(providers::test_providers))
        .route("/providers/stats", get(providers::provider_stats))
        .route("/providers/cache/clear", post(providers::clear_cache))
        .route("/translation/backends", get(providers::list_backends))
        .route("/translation/test", post(providers::test_backends))
        // Library
        .route("/library/series", get(library::list_series))
        .route("/library/series/{instance}/{id}", get(library::series_detail))
        .route("/library/movies", get(library::list_movies))
        // Language profiles
        .route("/profiles", get(profiles::list_profiles))
        .route("/profiles", post(profiles::create_profile))
        .route("/profiles/{id}", get(profiles::get_profile))
        .route("/profiles/{id}", put(profiles::update_profile))
        .route("/profiles/{id}", delete(profiles::delete_profile))
        .route("/profiles/{id}/assign", post(profiles::assign_profile))
        .route("/profiles/unassign", post(profiles::unassign_profile))
        // Scoring
        .route("/scoring", get(scoring::get_scoring))
        .route("/scoring/weights", put(scoring::set_weight))
        .route("/scoring/modifiers", put(scoring::set_modifier))
        // Glossary / blacklist / history / presets / hook log
        .route("/glossary", get(misc::list_glossary))
        .route("/glossary", post(misc::add_glossary))
        .route("/glossary/{id}", delete(misc::delete_glossary))
        .route("/blacklist", get(misc::list_blacklist))
        .route("/blacklist", post(misc::add_blacklist))
        .route("/blacklist/{id}", delete(misc::delete_blacklist))
        .route("/history", get(misc::list_history))
        .route("/presets", get(misc::list_presets))
        .route("/presets", post(misc::create_preset))
        .route("/presets/{id}", put(misc::update_preset))
        .route("/presets/{id}", delete(misc::delete_preset))
        .route("/logs/hooks", get(misc::list_hook_log))
        // Outbound hooks & webhooks
        .route("/hooks", get(hooks::list_hooks))
        .route("/hooks", post(hooks::create_hook))
        .route("/hooks/{id}", delete(hooks::delete_hook))
        .route("/hooks/{id}/enabled", put(hooks::set_hook_enabled))
        .route("/outbound-webhooks", get(hooks::list_webhooks))
        .route("/outbound-webhooks", post(hooks::create_webhook))
        .route("/outbound-webhooks/{id}", delete(hooks::delete_webhook))
        .route("/outbound-webhooks/{id}/reenable", post(hooks::reenable_webhook))
        .route("/events", get(hooks::event_catalog))
        // Live updates
        .route("/ws", get(ws::ws_handler))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state.clone());

    // Exempt surface: health probe and inbound manager webhooks
    let open_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/webhooks/sonarr", post(inbound::sonarr_webhook))
        .route("/webhooks/radarr", post(inbound::radarr_webhook))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes.merge(open_routes))
        .route("/metrics", get(metrics_handler))
}
