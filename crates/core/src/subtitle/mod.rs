//! Subtitle file toolkit.
//!
//! Format detection by content sniffing, SRT and ASS parsing, dialog vs
//! signs style classification, archive extraction and output path layout.

mod archive;
mod ass;
mod classify;
mod format;
mod paths;
mod srt;

pub use archive::*;
pub use ass::*;
pub use classify::*;
pub use format::*;
pub use paths::*;
pub use srt::*;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SubtitleError {
    #[error("Unrecognized subtitle format")]
    UnknownFormat,

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Unsafe archive entry: {0}")]
    UnsafePath(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
