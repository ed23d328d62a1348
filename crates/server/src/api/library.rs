//! Library API handlers: cached series/movies with subtitle status.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use sublarr_core::{
    find_existing_subtitles, EpisodeRow, MovieRow, SeriesRow, SubtitleFormat,
};

use crate::state::AppState;

use super::error::ApiError;

pub async fn list_series(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<SeriesRow>>, ApiError> {
    Ok(Json(state.library().list_series()?))
}

pub async fn list_movies(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<MovieRow>>, ApiError> {
    Ok(Json(state.library().list_movies()?))
}

#[derive(Serialize)]
pub struct EpisodeDetail {
    #[serde(flatten)]
    pub episode: EpisodeRow,
    pub subtitles: Vec<SubtitleStatus>,
}

#[derive(Serialize)]
pub struct SubtitleStatus {
    pub language: String,
    pub format: SubtitleFormat,
    pub forced: bool,
    pub path: String,
}

#[derive(Serialize)]
pub struct SeriesDetail {
    pub series: SeriesRow,
    pub episodes: Vec<EpisodeDetail>,
}

pub async fn series_detail(
    State(state): State<Arc<AppState>>,
    Path((instance, id)): Path<(String, i64)>,
) -> Result<Json<SeriesDetail>, ApiError> {
    let series = state
        .library()
        .list_series()?
        .into_iter()
        .find(|s| s.instance == instance && s.id == id)
        .ok_or_else(|| ApiError::not_found(format!("series {}/{}", instance, id)))?;

    let target_languages = &state.config().library.target_languages;
    let episodes = state
        .library()
        .list_episodes(&instance, id)?
        .into_iter()
        .map(|episode| {
            let video = std::path::Path::new(&episode.file_path);
            let mut subtitles = Vec::new();
            for language in target_languages {
                for found in find_existing_subtitles(video, language) {
                    subtitles.push(SubtitleStatus {
                        language: language.clone(),
                        format: found.format,
                        forced: found.forced,
                        path: found.path.to_string_lossy().to_string(),
                    });
                }
            }
            EpisodeDetail {
                episode,
                subtitles,
            }
        })
        .collect();

    Ok(Json(SeriesDetail { series, episodes }))
}
