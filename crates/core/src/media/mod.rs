//! Media probing and embedded stream extraction.
//!
//! Wraps `ffprobe` (JSON stream metadata) and `ffmpeg` (subtitle/audio
//! extraction) as subprocesses. Both are treated as opaque tools with fixed
//! input/output contracts.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;

use crate::subtitle::canonical_language;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("ffprobe failed: {0}")]
    Probe(String),

    #[error("ffmpeg failed: {0}")]
    Extract(String),

    #[error("Tool timed out after {0:?}")]
    Timeout(Duration),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Stream {0} is not a text subtitle")]
    NotText(usize),
}

/// Text subtitle codec of an embedded stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddedCodec {
    Ass,
    Srt,
    /// Image-based or otherwise non-extractable.
    Other,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SubtitleStreamInfo {
    /// Absolute stream index for `-map 0:<index>`.
    pub index: usize,
    pub codec: EmbeddedCodec,
    pub language: Option<String>,
    pub title: Option<String>,
    pub forced_disposition: bool,
    pub default_disposition: bool,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct AudioStreamInfo {
    pub index: usize,
    pub language: Option<String>,
    pub default_disposition: bool,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct MediaInfo {
    pub subtitle_streams: Vec<SubtitleStreamInfo>,
    pub audio_streams: Vec<AudioStreamInfo>,
}

impl MediaInfo {
    /// First embedded text subtitle in the given language, ASS preferred.
    pub fn best_subtitle_stream(&self, language: &str) -> Option<&SubtitleStreamInfo> {
        let lang = canonical_language(language);
        let mut candidates: Vec<&SubtitleStreamInfo> = self
            .subtitle_streams
            .iter()
            .filter(|s| s.codec != EmbeddedCodec::Other)
            .filter(|s| {
                s.language
                    .as_deref()
                    .map(|l| canonical_language(l) == lang)
                    .unwrap_or(false)
            })
            .collect();
        candidates.sort_by_key(|s| match s.codec {
            EmbeddedCodec::Ass => 0,
            EmbeddedCodec::Srt => 1,
            EmbeddedCodec::Other => 2,
        });
        candidates.into_iter().next()
    }

    /// Audio track to feed the transcriber: prefer the requested language,
    /// then the default disposition, then the first track.
    pub fn audio_track_for(&self, language: &str) -> Option<&AudioStreamInfo> {
        let lang = canonical_language(language);
        self.audio_streams
            .iter()
            .find(|a| {
                a.language
                    .as_deref()
                    .map(|l| canonical_language(l) == lang)
                    .unwrap_or(false)
            })
            .or_else(|| self.audio_streams.iter().find(|a| a.default_disposition))
            .or_else(|| self.audio_streams.first())
    }
}

/// Probe and extraction contract, mockable in tests.
#[async_trait]
pub trait MediaProber: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<MediaInfo, MediaError>;

    /// Extract an embedded text subtitle stream to `dest`.
    async fn extract_subtitle(
        &self,
        path: &Path,
        stream_index: usize,
        dest: &Path,
    ) -> Result<(), MediaError>;

    /// Extract an audio track as 16 kHz mono WAV for transcription.
    async fn extract_audio(
        &self,
        path: &Path,
        stream_index: usize,
        dest: &Path,
    ) -> Result<(), MediaError>;
}

// --- ffprobe JSON shapes ---------------------------------------------------

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    index: usize,
    codec_type: String,
    #[serde(default)]
    codec_name: Option<String>,
    #[serde(default)]
    disposition: FfprobeDisposition,
    #[serde(default)]
    tags: FfprobeTags,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeDisposition {
    #[serde(default)]
    default: i32,
    #[serde(default)]
    forced: i32,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeTags {
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

/// ffprobe/ffmpeg subprocess implementation.
pub struct FfmpegProber {
    ffprobe_bin: String,
    ffmpeg_bin: String,
    probe_timeout: Duration,
    extract_timeout: Duration,
}

impl FfmpegProber {
    pub fn new() -> Self {
        Self {
            ffprobe_bin: "ffprobe".to_string(),
            ffmpeg_bin: "ffmpeg".to_string(),
            probe_timeout: Duration::from_secs(30),
            extract_timeout: Duration::from_secs(300),
        }
    }

    pub fn with_binaries(mut self, ffprobe: &str, ffmpeg: &str) -> Self {
        self.ffprobe_bin = ffprobe.to_string();
        self.ffmpeg_bin = ffmpeg.to_string();
        self
    }

    fn parse_probe_output(json: &str) -> Result<MediaInfo, MediaError> {
        let output: FfprobeOutput =
            serde_json::from_str(json).map_err(|e| MediaError::Probe(e.to_string()))?;

        let mut info = MediaInfo::default();
        for stream in output.streams {
            match stream.codec_type.as_str() {
                "subtitle" => {
                    let codec = match stream.codec_name.as_deref() {
                        Some("ass") | Some("ssa") => EmbeddedCodec::Ass,
                        Some("subrip") | Some("srt") | Some("mov_text") => EmbeddedCodec::Srt,
                        _ => EmbeddedCodec::Other,
                    };
                    info.subtitle_streams.push(SubtitleStreamInfo {
                        index: stream.index,
                        codec,
                        language: stream.tags.language,
                        title: stream.tags.title,
                        forced_disposition: stream.disposition.forced == 1,
                        default_disposition: stream.disposition.default == 1,
                    });
                }
                "audio" => {
                    info.audio_streams.push(AudioStreamInfo {
                        index: stream.index,
                        language: stream.tags.language,
                        default_disposition: stream.disposition.default == 1,
                    });
                }
                _ => {}
            }
        }
        Ok(info)
    }

    async fn run_tool(
        &self,
        bin: &str,
        args: &[String],
        tool_timeout: Duration,
    ) -> Result<std::process::Output, MediaError> {
        let result = timeout(
            tool_timeout,
            Command::new(bin)
                .args(args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output(),
        )
        .await;

        match result {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(MediaError::Probe(format!("{}: {}", bin, e))),
            Err(_) => Err(MediaError::Timeout(tool_timeout)),
        }
    }
}

impl Default for FfmpegProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaProber for FfmpegProber {
    async fn probe(&self, path: &Path) -> Result<MediaInfo, MediaError> {
        if !path.exists() {
            return Err(MediaError::NotFound(path.display().to_string()));
        }

        let args = vec![
            "-v".to_string(),
            "quiet".to_string(),
            "-print_format".to_string(),
            "json".to_string(),
            "-show_streams".to_string(),
            path.to_string_lossy().to_string(),
        ];
        let output = self
            .run_tool(&self.ffprobe_bin, &args, self.probe_timeout)
            .await?;

        if !output.status.success() {
            return Err(MediaError::Probe(format!(
                "exit {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
                    .chars()
                    .take(200)
                    .collect::<String>()
            )));
        }

        Self::parse_probe_output(&String::from_utf8_lossy(&output.stdout))
    }

    async fn extract_subtitle(
        &self,
        path: &Path,
        stream_index: usize,
        dest: &Path,
    ) -> Result<(), MediaError> {
        let args = vec![
            "-y".to_string(),
            "-i".to_string(),
            path.to_string_lossy().to_string(),
            "-map".to_string(),
            format!("0:{}", stream_index),
            "-c:s".to_string(),
            "copy".to_string(),
            dest.to_string_lossy().to_string(),
        ];
        let output = self
            .run_tool(&self.ffmpeg_bin, &args, self.extract_timeout)
            .await?;

        if !output.status.success() {
            return Err(MediaError::Extract(format!(
                "exit {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
                    .chars()
                    .take(200)
                    .collect::<String>()
            )));
        }
        Ok(())
    }

    async fn extract_audio(
        &self,
        path: &Path,
        stream_index: usize,
        dest: &Path,
    ) -> Result<(), MediaError> {
        let args = vec![
            "-y".to_string(),
            "-i".to_string(),
            path.to_string_lossy().to_string(),
            "-map".to_string(),
            format!("0:{}", stream_index),
            "-ar".to_string(),
            "16000".to_string(),
            "-ac".to_string(),
            "1".to_string(),
            "-c:a".to_string(),
            "pcm_s16le".to_string(),
            dest.to_string_lossy().to_string(),
        ];
        let output = self
            .run_tool(&self.ffmpeg_bin, &args, self.extract_timeout)
            .await?;

        if !output.status.success() {
            return Err(MediaError::Extract(format!(
                "exit {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
                    .chars()
                    .take(200)
                    .collect::<String>()
            )));
        }
        Ok(())
    }
}

/// Temp path for an extracted embedded subtitle.
pub fn extraction_temp_path(video: &Path, stream_index: usize, ext: &str) -> PathBuf {
    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    std::env::temp_dir().join(format!("sublarr-extract-{}-{}.{}", stem, stream_index, ext))
}
