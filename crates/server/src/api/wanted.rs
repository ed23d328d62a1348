//! Wanted-item API handlers.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use sublarr_core::{
    Job, JobKind, ProcessOutcome, ScanMode, WantedItem, WantedStatus, WantedSummary,
};

use crate::state::AppState;

use super::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ListWantedParams {
    pub status: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

pub async fn list_wanted(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListWantedParams>,
) -> Result<Json<Vec<WantedItem>>, ApiError> {
    let status = match params.status.as_deref() {
        Some(raw) => Some(WantedStatus::parse(raw)),
        None => None,
    };
    let items = state.wanted().list(
        status,
        params.limit.unwrap_or(100).min(1000),
        params.offset.unwrap_or(0),
    )?;
    Ok(Json(items))
}

pub async fn summary(
    State(state): State<Arc<AppState>>,
) -> Result<Json<WantedSummary>, ApiError> {
    Ok(Json(state.wanted().summary()?))
}

#[derive(Debug, Deserialize)]
pub struct ScanParams {
    /// "full" or "incremental" (default).
    pub mode: Option<String>,
}

pub async fn trigger_scan(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ScanParams>,
) -> Result<Json<Job>, ApiError> {
    if state.runner().has_active(JobKind::WantedScan)? {
        return Err(ApiError::conflict("a scan is already running"));
    }

    let mode = match params.mode.as_deref() {
        Some("full") => ScanMode::Full,
        _ => ScanMode::Incremental,
    };
    let scanner = Arc::clone(state.scanner());
    let engine = Arc::clone(state.engine());
    let auto_translate = state.config().scanner.auto_translate;

    let job = state.runner().submit(
        JobKind::WantedScan,
        None,
        Some(serde_json::json!({ "mode": format!("{:?}", mode).to_lowercase() })),
        Box::new(move |ctx| {
            Box::pin(async move {
                let report = scanner
                    .scan(mode, &ctx.job_id, &ctx.cancel)
                    .await
                    .map_err(|e| e.to_string())?;

                // Auto-extract chain for newly created items with embedded
                // source subtitles.
                for item_id in &report.auto_extract_candidates {
                    if ctx.cancel.is_cancelled() {
                        break;
                    }
                    if auto_translate {
                        if let Err(e) = engine.process_item(*item_id, &ctx.cancel).await {
                            tracing::warn!(item = item_id, "Auto-translate failed: {}", e);
                        }
                    } else if let Err(e) = engine.extract_embedded_source(*item_id).await {
                        tracing::warn!(item = item_id, "Auto-extract failed: {}", e);
                    }
                }

                serde_json::to_value(&report).map_err(|e| e.to_string())
            })
        }),
    )?;
    Ok(Json(job))
}

/// Process a single item through the acquisition engine (async job).
pub async fn process_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Job>, ApiError> {
    // Fail fast on unknown ids before queueing
    state.wanted().get(id)?;

    let engine = Arc::clone(state.engine());
    let job = state.runner().submit(
        JobKind::ProviderSearch,
        None,
        Some(serde_json::json!({ "item_id": id })),
        Box::new(move |ctx| {
            Box::pin(async move {
                match engine.process_item(id, &ctx.cancel).await {
                    Ok(ProcessOutcome::Done(report)) => Ok(serde_json::json!({
                        "case": report.case,
                        "subtitle_path": report.subtitle_path.map(|p| p.to_string_lossy().to_string()),
                        "stats": report.stats,
                    })),
                    Ok(ProcessOutcome::Requeued { attempts }) => Ok(serde_json::json!({
                        "requeued": true,
                        "attempts": attempts,
                    })),
                    Ok(ProcessOutcome::TranscriptionQueued) => {
                        // Chain the transcription immediately
                        let report = engine
                            .transcribe_item(id, &ctx.cancel)
                            .await
                            .map_err(|e| e.to_string())?;
                        Ok(serde_json::json!({
                            "case": report.case,
                            "stats": report.stats,
                        }))
                    }
                    Err(e) => Err(e.to_string()),
                }
            })
        }),
    )?;
    Ok(Json(job))
}

/// Search-only action: run the provider search for an item and return the
/// ranked candidates without changing the item.
pub async fn search_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<sublarr_core::SearchOutcome>, ApiError> {
    let item = state.wanted().get(id)?;
    let query = sublarr_core::VideoQuery {
        title: item.title.clone(),
        season: item.season,
        episode: item.episode,
        absolute_episode: item.absolute_episode,
        year: item.year,
        source_language: item.source_language.clone(),
        target_language: item.target_language.clone(),
        forced_only: item.subtitle_type == sublarr_core::SubtitleType::Forced,
        is_episode: item.is_episode,
    };
    let outcome = state.providers().search(&query).await?;
    Ok(Json(outcome))
}

/// Extract the embedded source subtitle for an item without translating.
pub async fn extract_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let path = state.engine().extract_embedded_source(id).await?;
    Ok(Json(serde_json::json!({
        "extracted": path.to_string_lossy(),
    })))
}

#[derive(Debug, Deserialize)]
pub struct BatchBody {
    #[serde(default)]
    pub item_ids: Vec<i64>,
    #[serde(default)]
    pub series_ids: Vec<i64>,
}

impl BatchBody {
    fn resolve(&self, state: &AppState) -> Result<Vec<i64>, ApiError> {
        let mut ids = self.item_ids.clone();
        if !self.series_ids.is_empty() {
            for item in state.wanted().list(None, 10_000, 0)? {
                if let Some(series_id) = item.series_id {
                    if self.series_ids.contains(&series_id) && !ids.contains(&item.id) {
                        ids.push(item.id);
                    }
                }
            }
        }
        if ids.is_empty() {
            return Err(ApiError::bad_request("no items selected"));
        }
        Ok(ids)
    }
}

pub async fn batch_search(
    State(state): State<Arc<AppState>>,
    Json(body): Json<BatchBody>,
) -> Result<Json<Job>, ApiError> {
    let ids = body.resolve(&state)?;
    let total = ids.len();
    let engine = Arc::clone(state.engine());

    let job = state.runner().submit(
        JobKind::Batch,
        None,
        Some(serde_json::json!({ "items": total })),
        Box::new(move |ctx| {
            Box::pin(async move {
                let mut processed = 0usize;
                let mut failed = 0usize;
                for (index, id) in ids.iter().enumerate() {
                    if ctx.cancel.is_cancelled() {
                        return Err("cancelled".to_string());
                    }
                    ctx.events().emit(
                        "wanted_batch_progress",
                        serde_json::json!({
                            "job_id": ctx.job_id,
                            "current": index,
                            "total": total,
                        }),
                    );
                    match engine.process_item(*id, &ctx.cancel).await {
                        Ok(_) => processed += 1,
                        Err(sublarr_core::PipelineError::AlreadyProcessing) => {}
                        Err(_) => failed += 1,
                    }
                }
                Ok(serde_json::json!({
                    "total": total,
                    "processed": processed,
                    "failed": failed,
                }))
            })
        }),
    )?;
    Ok(Json(job))
}

pub async fn batch_extract(
    State(state): State<Arc<AppState>>,
    Json(body): Json<BatchBody>,
) -> Result<Json<Job>, ApiError> {
    let ids = body.resolve(&state)?;
    let total = ids.len();
    let engine = Arc::clone(state.engine());

    let job = state.runner().submit(
        JobKind::Batch,
        None,
        Some(serde_json::json!({ "items": total, "action": "extract" })),
        Box::new(move |ctx| {
            Box::pin(async move {
                let mut extracted = 0usize;
                let mut failed = 0usize;
                for id in ids {
                    if ctx.cancel.is_cancelled() {
                        return Err("cancelled".to_string());
                    }
                    match engine.extract_embedded_source(id).await {
                        Ok(_) => extracted += 1,
                        Err(_) => failed += 1,
                    }
                }
                Ok(serde_json::json!({
                    "total": total,
                    "extracted": extracted,
                    "failed": failed,
                }))
            })
        }),
    )?;
    Ok(Json(job))
}

pub async fn delete_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.wanted().delete(id)?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}
