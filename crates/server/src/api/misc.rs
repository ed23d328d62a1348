//! Glossary, blacklist, history, prompt-preset and hook-log handlers.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use sublarr_core::{
    BlacklistEntry, GlossaryEntry, GlossaryScope, HistoryEntry, HookLogEntry, PromptPreset,
};

use crate::state::AppState;

use super::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct PageParams {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl PageParams {
    fn limit(&self) -> u32 {
        self.limit.unwrap_or(100).min(1000)
    }

    fn offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }
}

// --- glossary ----------------------------------------------------------

pub async fn list_glossary(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<GlossaryEntry>>, ApiError> {
    Ok(Json(state.glossary().list()?))
}

#[derive(Debug, Deserialize)]
pub struct AddGlossaryBody {
    pub source_term: String,
    pub target_term: String,
    #[serde(default)]
    pub series_id: Option<i64>,
}

pub async fn add_glossary(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AddGlossaryBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if body.source_term.trim().is_empty() {
        return Err(ApiError::bad_request("source_term cannot be empty"));
    }
    let scope = match body.series_id {
        Some(id) => GlossaryScope::Series(id),
        None => GlossaryScope::Global,
    };
    let id = state
        .glossary()
        .add(&body.source_term, &body.target_term, &scope)?;
    Ok(Json(serde_json::json!({ "id": id })))
}

pub async fn delete_glossary(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.glossary().remove(id)?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

// --- blacklist ---------------------------------------------------------

pub async fn list_blacklist(
    State(state): State<Arc<AppState>>,
    Query(page): Query<PageParams>,
) -> Result<Json<Vec<BlacklistEntry>>, ApiError> {
    Ok(Json(state.blacklist().list(page.limit(), page.offset())?))
}

#[derive(Debug, Deserialize)]
pub struct AddBlacklistBody {
    pub provider: String,
    pub content_hash: String,
    #[serde(default)]
    pub reason: Option<String>,
}

pub async fn add_blacklist(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AddBlacklistBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .blacklist()
        .add(&body.provider, &body.content_hash, body.reason.as_deref())?;
    Ok(Json(serde_json::json!({ "added": body.content_hash })))
}

pub async fn delete_blacklist(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.blacklist().remove(id)?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

// --- history -----------------------------------------------------------

pub async fn list_history(
    State(state): State<Arc<AppState>>,
    Query(page): Query<PageParams>,
) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    Ok(Json(state.history().list(page.limit(), page.offset())?))
}

// --- prompt presets ----------------------------------------------------

pub async fn list_presets(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<PromptPreset>>, ApiError> {
    Ok(Json(state.presets().list()?))
}

#[derive(Debug, Deserialize)]
pub struct PresetBody {
    pub name: String,
    pub system_prompt: String,
}

pub async fn create_preset(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PresetBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = state.presets().create(&body.name, &body.system_prompt)?;
    Ok(Json(serde_json::json!({ "id": id })))
}

pub async fn update_preset(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<PresetBody>,
) -> Result<Json<PromptPreset>, ApiError> {
    state.presets().update(id, &body.name, &body.system_prompt)?;
    Ok(Json(state.presets().get(id)?))
}

pub async fn delete_preset(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.presets().delete(id)?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

// --- hook log ----------------------------------------------------------

pub async fn list_hook_log(
    State(state): State<Arc<AppState>>,
    Query(page): Query<PageParams>,
) -> Result<Json<Vec<HookLogEntry>>, ApiError> {
    Ok(Json(state.hooks().list_log(page.limit(), page.offset())?))
}
