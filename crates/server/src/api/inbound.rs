//! Inbound webhooks from Sonarr/Radarr-compatible managers.
//!
//! Mounted outside the auth middleware: the managers signal "a new file was
//! downloaded" and an incremental scan picks it up.

use axum::{extract::State, Json};
use serde::Deserialize;
use std::sync::Arc;

use sublarr_core::{JobKind, ScanMode};

use crate::state::AppState;

use super::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ArrWebhookBody {
    #[serde(default, rename = "eventType")]
    pub event_type: Option<String>,
}

/// Event types that should trigger a scan.
fn is_download_event(event_type: Option<&str>) -> bool {
    matches!(
        event_type,
        Some("Download") | Some("EpisodeFileDelete") | Some("MovieFileDelete") | Some("Rename")
    )
}

async fn trigger_incremental_scan(state: &Arc<AppState>) -> Result<serde_json::Value, ApiError> {
    if state.runner().has_active(JobKind::WantedScan)? {
        return Ok(serde_json::json!({ "queued": false, "reason": "scan already running" }));
    }

    let scanner = Arc::clone(state.scanner());
    let job = state.runner().submit(
        JobKind::WantedScan,
        None,
        Some(serde_json::json!({ "trigger": "webhook" })),
        Box::new(move |ctx| {
            Box::pin(async move {
                let report = scanner
                    .scan(ScanMode::Incremental, &ctx.job_id, &ctx.cancel)
                    .await
                    .map_err(|e| e.to_string())?;
                serde_json::to_value(&report).map_err(|e| e.to_string())
            })
        }),
    )?;
    Ok(serde_json::json!({ "queued": true, "job_id": job.id }))
}

pub async fn sonarr_webhook(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ArrWebhookBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !is_download_event(body.event_type.as_deref()) {
        return Ok(Json(serde_json::json!({ "queued": false, "reason": "ignored event" })));
    }
    Ok(Json(trigger_incremental_scan(&state).await?))
}

pub async fn radarr_webhook(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ArrWebhookBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !is_download_event(body.event_type.as_deref()) {
        return Ok(Json(serde_json::json!({ "queued": false, "reason": "ignored event" })));
    }
    Ok(Json(trigger_incremental_scan(&state).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_events_trigger() {
        assert!(is_download_event(Some("Download")));
        assert!(is_download_event(Some("Rename")));
        assert!(!is_download_event(Some("Test")));
        assert!(!is_download_event(Some("Health")));
        assert!(!is_download_event(None));
    }
}
