//! Subtitle path layout and language tag handling.
//!
//! Artifacts live next to the video: `{stem}.{lang}.{ext}` for full
//! subtitles, `{stem}.{lang}.forced.{ext}` for forced ones, and
//! `{stem}.{lang}.{ext}.quality.json` for the quality sidecar.

use std::path::{Path, PathBuf};

use super::SubtitleFormat;

/// (ISO-639-1, ISO-639-2/B, ISO-639-2/T) triples for the languages the
/// matcher canonicalizes. The 639-1 form is the canonical tag.
const LANGUAGE_TABLE: &[(&str, &str, &str)] = &[
    ("en", "eng", "eng"),
    ("de", "ger", "deu"),
    ("ja", "jpn", "jpn"),
    ("fr", "fre", "fra"),
    ("es", "spa", "spa"),
    ("it", "ita", "ita"),
    ("pt", "por", "por"),
    ("ru", "rus", "rus"),
    ("zh", "chi", "zho"),
    ("ko", "kor", "kor"),
    ("nl", "dut", "nld"),
    ("pl", "pol", "pol"),
    ("ar", "ara", "ara"),
    ("sv", "swe", "swe"),
    ("no", "nor", "nor"),
    ("da", "dan", "dan"),
    ("fi", "fin", "fin"),
    ("cs", "cze", "ces"),
    ("hu", "hun", "hun"),
    ("tr", "tur", "tur"),
];

/// Canonicalize a language tag to its ISO-639-1 form.
///
/// Accepts 639-1 ("de"), 639-2 bibliographic ("ger") and terminological
/// ("deu") forms, plus region subtags ("de-DE", "pt_BR" keeps "pt").
/// Unknown tags pass through lowercased.
pub fn canonical_language(tag: &str) -> String {
    let lower = tag.trim().to_lowercase().replace('_', "-");
    let base = lower.split('-').next().unwrap_or(&lower);

    for (iso1, iso2b, iso2t) in LANGUAGE_TABLE {
        if base == *iso1 || base == *iso2b || base == *iso2t {
            return iso1.to_string();
        }
    }
    base.to_string()
}

/// Does `tag` denote the same language as canonical `lang`?
pub fn language_matches(tag: &str, lang: &str) -> bool {
    canonical_language(tag) == canonical_language(lang)
}

/// Derive the output path for a subtitle next to its video.
pub fn subtitle_path(
    video: &Path,
    language: &str,
    forced: bool,
    format: SubtitleFormat,
) -> PathBuf {
    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let lang = canonical_language(language);
    let name = if forced {
        format!("{}.{}.forced.{}", stem, lang, format.extension())
    } else {
        format!("{}.{}.{}", stem, lang, format.extension())
    };
    video.with_file_name(name)
}

/// Quality sidecar path for a subtitle file.
pub fn quality_sidecar_path(subtitle: &Path) -> PathBuf {
    let mut name = subtitle
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    name.push_str(".quality.json");
    subtitle.with_file_name(name)
}

/// A subtitle found next to a video.
#[derive(Debug, Clone, PartialEq)]
pub struct FoundSubtitle {
    pub path: PathBuf,
    pub format: SubtitleFormat,
    pub forced: bool,
}

/// Scan the video's directory for existing subtitles in the given language.
///
/// Recognizes `{stem}.{lang}.{ext}` and `{stem}.{lang}.forced.{ext}` where
/// `{lang}` is any ISO form of the requested language. Prevents wanted items
/// from being re-scheduled for subtitles that are already on disk.
pub fn find_existing_subtitles(video: &Path, language: &str) -> Vec<FoundSubtitle> {
    let Some(dir) = video.parent() else {
        return Vec::new();
    };
    let Some(stem) = video.file_stem().map(|s| s.to_string_lossy().to_string()) else {
        return Vec::new();
    };
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut found = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
            continue;
        };
        let Some(rest) = name.strip_prefix(&format!("{}.", stem)) else {
            continue;
        };

        // rest is "{lang}.{ext}" or "{lang}.forced.{ext}"
        let parts: Vec<&str> = rest.split('.').collect();
        let (lang_part, forced, ext) = match parts.as_slice() {
            [lang, ext] => (*lang, false, *ext),
            [lang, "forced", ext] => (*lang, true, *ext),
            _ => continue,
        };

        let Some(format) = SubtitleFormat::from_extension(ext) else {
            continue;
        };
        if !language_matches(lang_part, language) {
            continue;
        }

        found.push(FoundSubtitle {
            path,
            format,
            forced,
        });
    }
    found
}

/// The best existing full (non-forced) subtitle, preferring ASS over SRT.
pub fn best_existing_full(video: &Path, language: &str) -> Option<FoundSubtitle> {
    let mut found: Vec<FoundSubtitle> = find_existing_subtitles(video, language)
        .into_iter()
        .filter(|f| !f.forced)
        .collect();
    found.sort_by_key(|f| match f.format {
        SubtitleFormat::Ass | SubtitleFormat::Ssa => 0,
        SubtitleFormat::Srt => 1,
        SubtitleFormat::Vtt => 2,
    });
    found.into_iter().next()
}
