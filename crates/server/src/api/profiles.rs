//! Language profile API handlers.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use sublarr_core::{LanguageProfile, MediaKind, NewLanguageProfile};

use crate::state::AppState;

use super::error::ApiError;

pub async fn list_profiles(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<LanguageProfile>>, ApiError> {
    Ok(Json(state.profiles().list()?))
}

pub async fn create_profile(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewLanguageProfile>,
) -> Result<Json<LanguageProfile>, ApiError> {
    if body.target_languages.is_empty() {
        return Err(ApiError::bad_request("target_languages cannot be empty"));
    }
    Ok(Json(state.profiles().create(&body)?))
}

pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<LanguageProfile>, ApiError> {
    Ok(Json(state.profiles().get(id)?))
}

pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<NewLanguageProfile>,
) -> Result<Json<LanguageProfile>, ApiError> {
    state.profiles().update(id, &body)?;
    Ok(Json(state.profiles().get(id)?))
}

pub async fn delete_profile(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.profiles().delete(id)?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

#[derive(Debug, Deserialize)]
pub struct AssignBody {
    pub kind: MediaKind,
    pub instance: String,
    pub external_id: i64,
}

pub async fn assign_profile(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<AssignBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    // 404 on unknown profile
    state.profiles().get(id)?;
    state
        .profiles()
        .assign(body.kind, &body.instance, body.external_id, id)?;
    Ok(Json(serde_json::json!({ "assigned": true })))
}

pub async fn unassign_profile(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AssignBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .profiles()
        .unassign(body.kind, &body.instance, body.external_id)?;
    Ok(Json(serde_json::json!({ "unassigned": true })))
}
