//! Provider and translation-backend API handlers.

use axum::{extract::State, Json};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use sublarr_core::{BackendCapabilities, ConfigField, ProviderStats};

use crate::state::AppState;

use super::error::ApiError;

#[derive(Serialize)]
pub struct ProviderInfo {
    pub name: String,
    pub native_forced_filter: bool,
    pub config_fields: Vec<ConfigField>,
}

pub async fn list_providers(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ProviderInfo>>, ApiError> {
    let mut providers = Vec::new();
    for name in state.providers().provider_names() {
        let provider = state
            .providers()
            .provider(&name)
            .ok_or_else(|| ApiError::internal("provider vanished"))?;
        providers.push(ProviderInfo {
            name: name.clone(),
            native_forced_filter: provider.supports_native_forced_filter(),
            config_fields: provider.config_fields(),
        });
    }
    Ok(Json(providers))
}

#[derive(Serialize)]
pub struct ProviderTestResult {
    pub name: String,
    pub healthy: bool,
    pub message: String,
}

pub async fn test_providers(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ProviderTestResult>>, ApiError> {
    let results = state
        .providers()
        .test_all()
        .await
        .into_iter()
        .map(|(name, healthy, message)| ProviderTestResult {
            name,
            healthy,
            message,
        })
        .collect();
    Ok(Json(results))
}

pub async fn provider_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HashMap<String, ProviderStats>>, ApiError> {
    Ok(Json(state.providers().stats()))
}

pub async fn clear_cache(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let removed = state.provider_cache().clear()?;
    Ok(Json(serde_json::json!({ "removed": removed })))
}

#[derive(Serialize)]
pub struct BackendInfo {
    pub name: String,
    pub kind: String,
    pub capabilities: BackendCapabilities,
    pub config_fields: Vec<ConfigField>,
}

pub async fn list_backends(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<BackendInfo>>, ApiError> {
    let backends = state
        .translator()
        .chain()
        .backends()
        .map(|backend| BackendInfo {
            name: backend.name().to_string(),
            kind: backend.kind().to_string(),
            capabilities: backend.capabilities(),
            config_fields: backend.config_fields(),
        })
        .collect();
    Ok(Json(backends))
}

#[derive(Serialize)]
pub struct BackendTestResult {
    pub name: String,
    pub healthy: bool,
    pub message: String,
}

pub async fn test_backends(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<BackendTestResult>>, ApiError> {
    let mut results = Vec::new();
    for backend in state.translator().chain().backends() {
        let (healthy, message) = backend.health_check().await;
        results.push(BackendTestResult {
            name: backend.name().to_string(),
            healthy,
            message,
        });
    }
    Ok(Json(results))
}
