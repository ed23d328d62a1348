//! Scoring configuration API handlers.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use sublarr_core::ScoreType;

use crate::state::AppState;

use super::error::ApiError;

#[derive(Serialize)]
pub struct ScoringResponse {
    pub episode: Vec<(String, i64)>,
    pub movie: Vec<(String, i64)>,
    pub provider_modifiers: Vec<(String, i64)>,
}

pub async fn get_scoring(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ScoringResponse>, ApiError> {
    Ok(Json(ScoringResponse {
        episode: state.scoring().weights(ScoreType::Episode)?,
        movie: state.scoring().weights(ScoreType::Movie)?,
        provider_modifiers: state.scoring().modifiers()?,
    }))
}

#[derive(Debug, Deserialize)]
pub struct SetWeightBody {
    pub score_type: ScoreType,
    pub weight_key: String,
    pub weight_value: i64,
}

pub async fn set_weight(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SetWeightBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .scoring()
        .set_weight(body.score_type, &body.weight_key, body.weight_value)?;
    Ok(Json(serde_json::json!({ "updated": body.weight_key })))
}

#[derive(Debug, Deserialize)]
pub struct SetModifierBody {
    pub provider_name: String,
    pub modifier: i64,
}

pub async fn set_modifier(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SetModifierBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .scoring()
        .set_modifier(&body.provider_name, body.modifier)?;
    Ok(Json(serde_json::json!({ "updated": body.provider_name })))
}
