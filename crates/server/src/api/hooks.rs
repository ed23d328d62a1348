//! Outbound hook and webhook configuration handlers.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use sublarr_core::{HookConfig, NewHookConfig, NewWebhookConfig, WebhookConfig};

use crate::state::AppState;

use super::error::ApiError;

pub async fn list_hooks(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<HookConfig>>, ApiError> {
    Ok(Json(state.hooks().list_hooks()?))
}

pub async fn create_hook(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewHookConfig>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if sublarr_core::event_def(&body.event_name).is_none() {
        return Err(ApiError::bad_request(format!(
            "unknown event: {}",
            body.event_name
        )));
    }
    if body.event_name == "hook_executed" {
        return Err(ApiError::bad_request(
            "hooks cannot subscribe to hook_executed",
        ));
    }
    let id = state.hooks().create_hook(&body)?;
    Ok(Json(serde_json::json!({ "id": id })))
}

#[derive(Debug, Deserialize)]
pub struct SetEnabledBody {
    pub enabled: bool,
}

pub async fn set_hook_enabled(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<SetEnabledBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.hooks().set_hook_enabled(id, body.enabled)?;
    Ok(Json(serde_json::json!({ "enabled": body.enabled })))
}

pub async fn delete_hook(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.hooks().delete_hook(id)?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

pub async fn list_webhooks(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<WebhookConfig>>, ApiError> {
    Ok(Json(state.hooks().list_webhooks()?))
}

pub async fn create_webhook(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewWebhookConfig>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if sublarr_core::event_def(&body.event_name).is_none() {
        return Err(ApiError::bad_request(format!(
            "unknown event: {}",
            body.event_name
        )));
    }
    if body.event_name == "hook_executed" {
        return Err(ApiError::bad_request(
            "webhooks cannot subscribe to hook_executed",
        ));
    }
    let id = state.hooks().create_webhook(&body)?;
    Ok(Json(serde_json::json!({ "id": id })))
}

pub async fn delete_webhook(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.hooks().delete_webhook(id)?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

pub async fn reenable_webhook(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.hooks().reenable_webhook(id)?;
    Ok(Json(serde_json::json!({ "reenabled": id })))
}

/// The event catalog, for the UI's subscription forms.
pub async fn event_catalog() -> Json<&'static [sublarr_core::EventDef]> {
    Json(sublarr_core::EVENT_CATALOG)
}
