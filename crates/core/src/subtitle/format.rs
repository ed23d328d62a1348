//! Subtitle format detection by content sniffing.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtitleFormat {
    Ass,
    Ssa,
    Srt,
    Vtt,
}

impl SubtitleFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Ass => "ass",
            Self::Ssa => "ssa",
            Self::Srt => "srt",
            Self::Vtt => "vtt",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "ass" => Some(Self::Ass),
            "ssa" => Some(Self::Ssa),
            "srt" => Some(Self::Srt),
            "vtt" => Some(Self::Vtt),
            _ => None,
        }
    }

    /// Styled formats carry positioning and font information.
    pub fn is_styled(&self) -> bool {
        matches!(self, Self::Ass | Self::Ssa)
    }
}

/// Detect the format from content, ignoring the file extension.
///
/// Returns None when the content matches no known format.
pub fn detect_format(content: &str) -> Option<SubtitleFormat> {
    let content = content.trim_start_matches('\u{feff}');
    let head: String = content.lines().take(50).collect::<Vec<_>>().join("\n");

    if head.contains("[Script Info]") || head.contains("[V4+ Styles]") {
        // SSA declares ScriptType v4.00, ASS v4.00+
        if head.contains("ScriptType: v4.00+")
            || head.contains("[V4+ Styles]")
            || head.to_lowercase().contains("scripttype: v4.00+")
        {
            return Some(SubtitleFormat::Ass);
        }
        if head.contains("[V4 Styles]") || head.to_lowercase().contains("scripttype: v4.00") {
            return Some(SubtitleFormat::Ssa);
        }
        return Some(SubtitleFormat::Ass);
    }

    if head.starts_with("WEBVTT") {
        return Some(SubtitleFormat::Vtt);
    }

    // SRT timing line: 00:00:01,000 --> 00:00:02,000
    if content.lines().take(200).any(is_srt_timing_line) {
        return Some(SubtitleFormat::Srt);
    }

    None
}

fn is_srt_timing_line(line: &str) -> bool {
    let line = line.trim();
    let Some((start, end)) = line.split_once("-->") else {
        return false;
    };
    is_srt_timestamp(start.trim()) && is_srt_timestamp(end.trim().split(' ').next().unwrap_or(""))
}

fn is_srt_timestamp(s: &str) -> bool {
    // HH:MM:SS,mmm
    let bytes = s.as_bytes();
    if bytes.len() != 12 {
        return false;
    }
    bytes[2] == b':'
        && bytes[5] == b':'
        && bytes[8] == b','
        && s.chars()
            .enumerate()
            .all(|(i, c)| matches!(i, 2 | 5 | 8) || c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_ass() {
        let content = "[Script Info]\nScriptType: v4.00+\n\n[V4+ Styles]\n";
        assert_eq!(detect_format(content), Some(SubtitleFormat::Ass));
    }

    #[test]
    fn test_detect_ssa() {
        let content = "[Script Info]\nScriptType: v4.00\n\n[V4 Styles]\n";
        assert_eq!(detect_format(content), Some(SubtitleFormat::Ssa));
    }

    #[test]
    fn test_detect_srt() {
        let content = "1\n00:00:01,000 --> 00:00:02,500\nHello\n\n";
        assert_eq!(detect_format(content), Some(SubtitleFormat::Srt));
    }

    #[test]
    fn test_detect_srt_with_wrong_extension_semantics() {
        // Content wins over whatever the file is named
        let content = "42\n01:02:03,400 --> 01:02:05,000\nLine\n";
        assert_eq!(detect_format(content), Some(SubtitleFormat::Srt));
    }

    #[test]
    fn test_detect_vtt() {
        let content = "WEBVTT\n\n00:01.000 --> 00:02.000\nHi\n";
        assert_eq!(detect_format(content), Some(SubtitleFormat::Vtt));
    }

    #[test]
    fn test_detect_with_bom() {
        let content = "\u{feff}[Script Info]\nTitle: x\n";
        assert_eq!(detect_format(content), Some(SubtitleFormat::Ass));
    }

    #[test]
    fn test_detect_unknown() {
        assert_eq!(detect_format("just some text"), None);
        assert_eq!(detect_format(""), None);
    }

    #[test]
    fn test_extension_roundtrip() {
        assert_eq!(SubtitleFormat::from_extension("ASS"), Some(SubtitleFormat::Ass));
        assert_eq!(SubtitleFormat::Ass.extension(), "ass");
        assert_eq!(SubtitleFormat::from_extension("txt"), None);
    }
}
