//! Forced/signs classification for search results and subtitle files.
//!
//! Several weak signals vote through the shared multi-signal classifier:
//! stream disposition, filename markers, stream/release titles, and (for ASS
//! content) an all-signs style distribution. Line count alone never decides.

use crate::subtitle::{
    classify_styles, forced_detection_rule, AssDocument, Classifier, StyleClass,
};

use super::types::SubtitleResult;

/// Signals extracted outside the file content.
#[derive(Debug, Clone, Default)]
pub struct ForcedSignals {
    /// ffprobe `disposition.forced` flag.
    pub disposition_forced: bool,
    /// Filename contains `.forced.` or `.signs.`.
    pub filename_marker: bool,
    /// Stream or release title mentions forced/signs.
    pub title_marker: bool,
    /// Parsed ASS content, for the style-distribution signal.
    pub ass_content: Option<String>,
}

impl ForcedSignals {
    pub fn from_result(result: &SubtitleResult) -> Self {
        let release = result
            .release_info
            .as_deref()
            .unwrap_or("")
            .to_lowercase();
        let url = result.download_url.to_lowercase();
        Self {
            disposition_forced: false,
            filename_marker: url.contains(".forced.")
                || url.contains(".signs.")
                || release.contains(".forced.")
                || release.contains(".signs."),
            title_marker: release.contains("forced")
                || release.contains("signs")
                || release.contains("sign "),
            ass_content: None,
        }
    }

    pub fn with_content(mut self, content: &str) -> Self {
        self.ass_content = Some(content.to_string());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForcedLabel {
    Forced,
    Full,
}

/// Classify a subtitle as forced using the aggregation rule from the shared
/// classifier: at least two agreeing signals, or one at confidence >= 0.9.
pub fn classify_forced(signals: &ForcedSignals) -> Option<(ForcedLabel, f64)> {
    let mut classifier = Classifier::new(forced_detection_rule());

    if signals.disposition_forced {
        classifier.add(ForcedLabel::Forced, 0.9, "disposition");
    }
    if signals.filename_marker {
        classifier.add(ForcedLabel::Forced, 0.8, "filename");
    }
    if signals.title_marker {
        classifier.add(ForcedLabel::Forced, 0.7, "title");
    }
    if let Some(content) = &signals.ass_content {
        if let Some(confidence) = all_signs_confidence(content) {
            classifier.add(ForcedLabel::Forced, confidence, "style_distribution");
        }
    }

    classifier
        .classify(&ForcedLabel::Forced)
        .map(|c| (c.label, c.confidence))
}

/// Convenience: is this search result a forced subtitle?
pub fn is_forced_result(result: &SubtitleResult) -> bool {
    if result.forced {
        // Provider said so natively
        return true;
    }
    classify_forced(&ForcedSignals::from_result(result)).is_some()
}

/// Confidence that an ASS file contains only signs/songs styles.
///
/// Returns None when the content does not parse as ASS or has no events;
/// a no-signal outcome, so line count alone can never tip the classifier.
fn all_signs_confidence(content: &str) -> Option<f64> {
    let doc = AssDocument::parse(content).ok()?;
    let events: Vec<(String, String)> = doc
        .dialogue_events()
        .map(|e| (e.style.clone(), e.text.clone()))
        .collect();
    if events.is_empty() {
        return None;
    }

    let classes = classify_styles(&events);
    let signs_events = events
        .iter()
        .filter(|(style, _)| classes.get(style) == Some(&StyleClass::Signs))
        .count();
    let fraction = signs_events as f64 / events.len() as f64;

    if fraction >= 0.95 {
        Some(0.85)
    } else if fraction >= 0.8 {
        Some(0.6)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subtitle::SubtitleFormat;

    fn result(url: &str, release: &str) -> SubtitleResult {
        SubtitleResult {
            provider_name: "os".to_string(),
            language: "de".to_string(),
            format: SubtitleFormat::Ass,
            download_url: url.to_string(),
            score: 0,
            forced: false,
            machine_translated: false,
            mt_confidence: 0,
            uploader_trust: 0,
            hash: None,
            release_info: Some(release.to_string()),
        }
    }

    #[test]
    fn test_two_signals_classify_forced() {
        // filename + title markers agree
        let r = result(
            "http://x/show.s01e01.de.forced.ass",
            "Show S01E01 forced subs",
        );
        assert!(is_forced_result(&r));
    }

    #[test]
    fn test_single_weak_signal_is_not_forced() {
        // Only the title mentions signs
        let r = result("http://x/12345", "Show S01E01 signs and songs");
        assert!(!is_forced_result(&r));
    }

    #[test]
    fn test_disposition_plus_filename() {
        let signals = ForcedSignals {
            disposition_forced: true,
            filename_marker: true,
            title_marker: false,
            ass_content: None,
        };
        let (label, confidence) = classify_forced(&signals).unwrap();
        assert_eq!(label, ForcedLabel::Forced);
        assert!(confidence >= 0.8);
    }

    #[test]
    fn test_disposition_alone_is_decisive() {
        // disposition carries 0.9 which meets the solo threshold
        let signals = ForcedSignals {
            disposition_forced: true,
            ..Default::default()
        };
        assert!(classify_forced(&signals).is_some());
    }

    #[test]
    fn test_native_flag_short_circuits() {
        let mut r = result("http://x/1", "nothing special");
        r.forced = true;
        assert!(is_forced_result(&r));
    }

    #[test]
    fn test_all_signs_content_contributes() {
        let content = "[Script Info]\nScriptType: v4.00+\n\n[Events]\nFormat: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\nDialogue: 0,0:00:01.00,0:00:02.00,Signs,,0,0,0,,{\\pos(1,1)}SIGN A\nDialogue: 0,0:00:03.00,0:00:04.00,Signs,,0,0,0,,{\\pos(2,2)}SIGN B\n";
        let confidence = all_signs_confidence(content).unwrap();
        assert!(confidence >= 0.8);

        // Content signal plus a title marker crosses the 2-signal rule
        let signals = ForcedSignals {
            title_marker: true,
            ass_content: Some(content.to_string()),
            ..Default::default()
        };
        assert!(classify_forced(&signals).is_some());
    }

    #[test]
    fn test_dialog_heavy_content_is_no_signal() {
        let content = "[Script Info]\nScriptType: v4.00+\n\n[Events]\nFormat: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\nDialogue: 0,0:00:01.00,0:00:02.00,Default,,0,0,0,,Plain line one\nDialogue: 0,0:00:03.00,0:00:04.00,Default,,0,0,0,,Plain line two\n";
        assert!(all_signs_confidence(content).is_none());
    }
}
