//! Health, config and config export/import handlers.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use sublarr_core::SanitizedConfig;

use crate::state::AppState;

use super::error::ApiError;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[derive(Serialize)]
pub struct ConfigResponse {
    #[serde(flatten)]
    pub config: SanitizedConfig,
    /// Runtime key/value overrides.
    pub overrides: HashMap<String, String>,
}

pub async fn get_config(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ConfigResponse>, ApiError> {
    let overrides = mask_sensitive(state.config_entries().all()?);
    Ok(Json(ConfigResponse {
        config: state.sanitized_config(),
        overrides,
    }))
}

#[derive(Deserialize)]
pub struct SetConfigBody {
    pub entries: HashMap<String, String>,
}

pub async fn set_config(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SetConfigBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    for (key, value) in &body.entries {
        if key.starts_with('_') {
            return Err(ApiError::bad_request(format!(
                "key {} is reserved",
                key
            )));
        }
        state.config_entries().set(key, value)?;
        state
            .events()
            .emit("config_updated", serde_json::json!({ "key": key }));
    }
    Ok(Json(serde_json::json!({ "updated": body.entries.len() })))
}

/// Export the stored overrides with secrets masked.
pub async fn export_config(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HashMap<String, String>>, ApiError> {
    Ok(Json(mask_sensitive(state.config_entries().all()?)))
}

#[derive(Deserialize)]
pub struct ImportConfigBody {
    pub entries: HashMap<String, String>,
}

/// Import overrides. Masked values are skipped so a masked export can be
/// re-imported without wiping stored secrets.
pub async fn import_config(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ImportConfigBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut imported = 0;
    for (key, value) in &body.entries {
        if key.starts_with('_') || value == sublarr_core::config::MASKED {
            continue;
        }
        state.config_entries().set(key, value)?;
        imported += 1;
    }
    Ok(Json(serde_json::json!({ "imported": imported })))
}

const SENSITIVE_MARKERS: &[&str] = &["api_key", "token", "secret", "password"];

fn mask_sensitive(mut entries: HashMap<String, String>) -> HashMap<String, String> {
    for (key, value) in entries.iter_mut() {
        let lower = key.to_lowercase();
        if SENSITIVE_MARKERS.iter().any(|m| lower.contains(m)) {
            *value = sublarr_core::config::MASKED.to_string();
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_sensitive() {
        let entries: HashMap<String, String> = [
            ("provider_api_key".to_string(), "secret123".to_string()),
            ("scan_interval".to_string(), "6".to_string()),
            ("plex_token".to_string(), "tok".to_string()),
        ]
        .into();
        let masked = mask_sensitive(entries);
        assert_eq!(masked["provider_api_key"], sublarr_core::config::MASKED);
        assert_eq!(masked["plex_token"], sublarr_core::config::MASKED);
        assert_eq!(masked["scan_interval"], "6");
    }
}
