//! Acquisition pipeline: the cases A–D decision engine.
//!
//! For each wanted item the engine picks the cheapest correct path: skip an
//! item whose target already exists, upgrade an SRT to ASS, download from a
//! provider, translate from an embedded or downloaded source, or hand off to
//! transcription. Output files are written with temp-file-plus-rename and
//! media servers are notified only after the rename.

mod engine;
mod fsio;

pub use engine::*;
pub use fsio::*;

use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Item is already being processed")]
    AlreadyProcessing,

    #[error("no_source: {0}")]
    NoSource(String),

    #[error("no_target: {0}")]
    NoTarget(String),

    #[error("translation_error: {0}")]
    Translation(String),

    #[error("file_error: {0}")]
    File(String),

    #[error("transcription_error: {0}")]
    Transcription(String),

    #[error("cancelled")]
    Cancelled,

    #[error("database_error: {0}")]
    Store(#[from] StoreError),
}
