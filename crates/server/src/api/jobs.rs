//! Job API handlers: direct translate jobs (sync/async), batch translate,
//! status queries and cancellation.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use sublarr_core::{detect_format, Job, JobKind, SubtitleFormat};

use crate::state::AppState;

use super::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct TranslateBody {
    pub subtitle_path: String,
    pub source_language: String,
    pub target_language: String,
    /// Output path; derived from the input when omitted.
    #[serde(default)]
    pub output_path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TranslateParams {
    /// Wait for the result instead of returning a queued job.
    #[serde(default)]
    pub sync: bool,
}

fn translate_work(
    state: Arc<AppState>,
    body: TranslateBody,
) -> sublarr_core::JobWork {
    Box::new(move |ctx| {
        Box::pin(async move {
            let content = tokio::fs::read_to_string(&body.subtitle_path)
                .await
                .map_err(|e| format!("file_error: {}", e))?;
            let format =
                detect_format(&content).ok_or_else(|| "file_error: unknown subtitle format".to_string())?;

            ctx.progress("translating", 0.1, &body.subtitle_path);
            let translation = if format.is_styled() {
                state
                    .translator()
                    .translate_ass(
                        &content,
                        &body.source_language,
                        &body.target_language,
                        &[],
                        None,
                        None,
                        None,
                    )
                    .await
            } else {
                state
                    .translator()
                    .translate_srt(
                        &content,
                        &body.source_language,
                        &body.target_language,
                        &[],
                        None,
                        None,
                        None,
                    )
                    .await
            }
            .map_err(|e| format!("database_error: {}", e))?;

            if !translation.result.success {
                return Err(format!(
                    "translation_error: {}",
                    translation.result.error.unwrap_or_default()
                ));
            }

            let out_format = if format.is_styled() {
                SubtitleFormat::Ass
            } else {
                SubtitleFormat::Srt
            };
            let output_path = body.output_path.clone().unwrap_or_else(|| {
                sublarr_core::subtitle_path(
                    std::path::Path::new(&body.subtitle_path),
                    &body.target_language,
                    false,
                    out_format,
                )
                .to_string_lossy()
                .to_string()
            });
            sublarr_core::write_atomic(std::path::Path::new(&output_path), &translation.content)
                .await
                .map_err(|e| format!("file_error: {}", e))?;

            ctx.progress("done", 1.0, &output_path);
            Ok(serde_json::json!({
                "output_path": output_path,
                "backend_used": translation.result.backend_used,
                "translated_lines": translation.translated_line_count,
                "memory_hits": translation.result.memory_hits,
                "quality": translation.result.stats,
            }))
        })
    })
}

pub async fn submit_translate(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TranslateParams>,
    Json(body): Json<TranslateBody>,
) -> Result<Json<Job>, ApiError> {
    let file_path = body.subtitle_path.clone();
    let request = serde_json::to_value(serde_json::json!({
        "subtitle_path": body.subtitle_path,
        "source_language": body.source_language,
        "target_language": body.target_language,
    }))
    .ok();

    let runner = Arc::clone(state.runner());
    let work = translate_work(Arc::clone(&state), body);

    let job = if params.sync {
        runner
            .run_now(JobKind::Translate, Some(&file_path), request, work)
            .await?
    } else {
        runner.submit(JobKind::Translate, Some(&file_path), request, work)?
    };
    Ok(Json(job))
}

#[derive(Debug, Deserialize)]
pub struct BatchTranslateBody {
    pub items: Vec<TranslateBody>,
}

pub async fn submit_batch(
    State(state): State<Arc<AppState>>,
    Json(body): Json<BatchTranslateBody>,
) -> Result<Json<Job>, ApiError> {
    if body.items.is_empty() {
        return Err(ApiError::bad_request("batch is empty"));
    }
    let total = body.items.len();
    let runner = Arc::clone(state.runner());

    let job = runner.submit(
        JobKind::Batch,
        None,
        Some(serde_json::json!({ "items": total })),
        Box::new(move |ctx| {
            Box::pin(async move {
                let mut succeeded = 0usize;
                let mut failed = Vec::new();
                for (index, item) in body.items.into_iter().enumerate() {
                    if ctx.cancel.is_cancelled() {
                        return Err("cancelled".to_string());
                    }
                    ctx.events().emit(
                        "batch_progress",
                        serde_json::json!({
                            "job_id": ctx.job_id,
                            "current": index,
                            "total": total,
                        }),
                    );
                    let path = item.subtitle_path.clone();
                    let work = translate_work(Arc::clone(&state), item);
                    match work(ctx.clone()).await {
                        Ok(_) => succeeded += 1,
                        Err(e) => failed.push(serde_json::json!({ "path": path, "error": e })),
                    }
                }
                Ok(serde_json::json!({
                    "total": total,
                    "succeeded": succeeded,
                    "failed": failed,
                }))
            })
        }),
    )?;
    Ok(Json(job))
}

#[derive(Debug, Deserialize)]
pub struct ListJobsParams {
    pub kind: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListJobsParams>,
) -> Result<Json<Vec<Job>>, ApiError> {
    let kind = match params.kind.as_deref() {
        Some(raw) => Some(
            JobKind::parse(raw).ok_or_else(|| ApiError::bad_request(format!("unknown kind: {}", raw)))?,
        ),
        None => None,
    };
    let jobs = state.runner().store().list(
        kind,
        params.limit.unwrap_or(100).min(1000),
        params.offset.unwrap_or(0),
    )?;
    Ok(Json(jobs))
}

pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    Ok(Json(state.runner().store().get(&id)?))
}

pub async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if state.runner().cancel(&id) {
        Ok(Json(serde_json::json!({ "cancelled": true })))
    } else {
        Err(ApiError::not_found(format!("no running job {}", id)))
    }
}
