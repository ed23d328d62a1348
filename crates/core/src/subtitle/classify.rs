//! Multi-signal classification.
//!
//! Forced-subtitle detection and machine-translation detection share the same
//! shape: several weak signals vote, and an aggregation rule decides. The
//! generic `Classifier` carries the signals; the ASS style classifier below
//! feeds it together with probe and filename signals.

use std::collections::HashMap;

/// One detector's vote.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal<T> {
    pub label: T,
    pub confidence: f64,
    pub source: &'static str,
}

/// Aggregation rules over agreeing signals.
#[derive(Debug, Clone, Copy)]
pub enum AggregationRule {
    /// At least `k` signals agree, or a single signal reaches `solo_confidence`.
    KOfNOrSolo { k: usize, solo_confidence: f64 },
    /// Combined (noisy-or) confidence reaches the threshold.
    Threshold(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification<T> {
    pub label: T,
    pub confidence: f64,
    pub agreeing_signals: usize,
}

/// Aggregates `Signal`s for one candidate label space.
#[derive(Debug, Clone)]
pub struct Classifier<T> {
    signals: Vec<Signal<T>>,
    rule: AggregationRule,
}

impl<T: Clone + PartialEq + std::hash::Hash + Eq> Classifier<T> {
    pub fn new(rule: AggregationRule) -> Self {
        Self {
            signals: Vec::new(),
            rule,
        }
    }

    pub fn add(&mut self, label: T, confidence: f64, source: &'static str) {
        self.signals.push(Signal {
            label,
            confidence: confidence.clamp(0.0, 1.0),
            source,
        });
    }

    /// Evaluate whether `label` wins under the configured rule.
    ///
    /// The reported confidence is the noisy-or combination of the agreeing
    /// signals (never below the strongest single signal).
    pub fn classify(&self, label: &T) -> Option<Classification<T>> {
        let agreeing: Vec<&Signal<T>> =
            self.signals.iter().filter(|s| &s.label == label).collect();
        if agreeing.is_empty() {
            return None;
        }

        let max_confidence = agreeing
            .iter()
            .map(|s| s.confidence)
            .fold(0.0f64, f64::max);
        let noisy_or = 1.0
            - agreeing
                .iter()
                .map(|s| 1.0 - s.confidence)
                .product::<f64>();
        let confidence = noisy_or.max(max_confidence);

        let accepted = match self.rule {
            AggregationRule::KOfNOrSolo { k, solo_confidence } => {
                agreeing.len() >= k || max_confidence >= solo_confidence
            }
            AggregationRule::Threshold(min) => confidence >= min,
        };

        if accepted {
            Some(Classification {
                label: label.clone(),
                confidence,
                agreeing_signals: agreeing.len(),
            })
        } else {
            None
        }
    }

    pub fn signals(&self) -> &[Signal<T>] {
        &self.signals
    }
}

/// The rule forced detection uses: two agreeing signals, or one at >= 0.9.
pub fn forced_detection_rule() -> AggregationRule {
    AggregationRule::KOfNOrSolo {
        k: 2,
        solo_confidence: 0.9,
    }
}

// ---------------------------------------------------------------------------
// ASS style classification (dialog vs signs/songs)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StyleClass {
    Dialog,
    Signs,
}

/// Style name fragments that strongly suggest signs/songs.
const SIGNS_NAME_PATTERNS: &[&str] = &[
    "sign", "song", "karaoke", "kara", "title", "credit", "op", "ed", "insert", "lyric", "staff",
];

/// Style name fragments that strongly suggest dialogue.
const DIALOG_NAME_PATTERNS: &[&str] = &["default", "main", "dialog", "dialogue", "alt", "flashback", "italics"];

/// Does the event text carry a positioning override?
pub fn has_positioning(text: &str) -> bool {
    ["\\pos(", "\\move(", "\\org(", "\\clip(", "\\iclip("]
        .iter()
        .any(|tag| text.contains(tag))
}

/// Does the event text carry a drawing command (\p1 and friends)?
pub fn has_drawing(text: &str) -> bool {
    let bytes = text.as_bytes();
    let mut i = 0;
    while let Some(pos) = text[i..].find("\\p") {
        let start = i + pos + 2;
        if start < bytes.len() && bytes[start].is_ascii_digit() && bytes[start] != b'0' {
            // \p1..\p9 opens drawing mode; \pos etc. are excluded because the
            // next byte is not a digit.
            return true;
        }
        i = start;
        if i >= text.len() {
            break;
        }
    }
    false
}

/// Classify each style by the distribution of its events.
///
/// A style whose events are >80% free of positioning and drawing overrides
/// is dialog. Ties (no events, or exactly at the boundary) are broken by the
/// curated name patterns; unknown empty styles default to signs so they are
/// left untouched by translation.
pub fn classify_styles(
    events: &[(String, String)], // (style name, text)
) -> HashMap<String, StyleClass> {
    let mut per_style: HashMap<&str, (usize, usize)> = HashMap::new(); // (plain, total)
    for (style, text) in events {
        let entry = per_style.entry(style.as_str()).or_insert((0, 0));
        entry.1 += 1;
        if !has_positioning(text) && !has_drawing(text) {
            entry.0 += 1;
        }
    }

    let mut result = HashMap::new();
    for (style, (plain, total)) in per_style {
        let class = if total == 0 {
            classify_by_name(style).unwrap_or(StyleClass::Signs)
        } else {
            let plain_fraction = plain as f64 / total as f64;
            if plain_fraction > 0.8 {
                StyleClass::Dialog
            } else if plain_fraction < 0.8 {
                // Mostly positioned/drawn events
                match classify_by_name(style) {
                    Some(StyleClass::Dialog) if plain_fraction > 0.5 => StyleClass::Dialog,
                    _ => StyleClass::Signs,
                }
            } else {
                classify_by_name(style).unwrap_or(StyleClass::Signs)
            }
        };
        result.insert(style.to_string(), class);
    }
    result
}

fn classify_by_name(style: &str) -> Option<StyleClass> {
    let lower = style.to_lowercase();
    if SIGNS_NAME_PATTERNS.iter().any(|p| lower.contains(p)) {
        return Some(StyleClass::Signs);
    }
    if DIALOG_NAME_PATTERNS.iter().any(|p| lower.contains(p)) {
        return Some(StyleClass::Dialog);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_agreeing_signals_classify_forced() {
        let mut classifier = Classifier::new(forced_detection_rule());
        classifier.add("forced", 0.7, "filename");
        classifier.add("forced", 0.7, "disposition");

        let result = classifier.classify(&"forced").unwrap();
        assert_eq!(result.agreeing_signals, 2);
        // P9: two agreeing high-confidence signals give >= 0.8
        assert!(result.confidence >= 0.8);
    }

    #[test]
    fn test_single_strong_signal_classifies() {
        let mut classifier = Classifier::new(forced_detection_rule());
        classifier.add("forced", 0.95, "disposition");
        assert!(classifier.classify(&"forced").is_some());
    }

    #[test]
    fn test_single_weak_signal_does_not_classify() {
        let mut classifier = Classifier::new(forced_detection_rule());
        classifier.add("forced", 0.6, "filename");
        assert!(classifier.classify(&"forced").is_none());
    }

    #[test]
    fn test_no_signals_no_classification() {
        let classifier: Classifier<&str> = Classifier::new(forced_detection_rule());
        assert!(classifier.classify(&"forced").is_none());
    }

    #[test]
    fn test_threshold_rule() {
        let mut classifier = Classifier::new(AggregationRule::Threshold(0.8));
        classifier.add("mt", 0.5, "a");
        classifier.add("mt", 0.5, "b");
        // noisy-or: 1 - 0.25 = 0.75 < 0.8
        assert!(classifier.classify(&"mt").is_none());
        classifier.add("mt", 0.5, "c");
        // 1 - 0.125 = 0.875
        assert!(classifier.classify(&"mt").is_some());
    }

    #[test]
    fn test_has_positioning() {
        assert!(has_positioning("{\\pos(960,540)}SIGN"));
        assert!(has_positioning("{\\move(0,0,100,100)}x"));
        assert!(!has_positioning("Plain dialogue line"));
        assert!(!has_positioning("{\\i1}italic{\\i0}"));
    }

    #[test]
    fn test_has_drawing() {
        assert!(has_drawing("{\\p1}m 0 0 l 100 0{\\p0}"));
        assert!(!has_drawing("{\\pos(1,2)}text"));
        assert!(!has_drawing("plain"));
    }

    #[test]
    fn test_classify_styles_by_distribution() {
        let mut events = Vec::new();
        for i in 0..20 {
            let text = if i == 0 {
                "{\\pos(1,1)}rare positioned line".to_string()
            } else {
                "plain dialogue".to_string()
            };
            events.push(("Main".to_string(), text));
        }
        for _ in 0..10 {
            events.push((
                "TypeSet".to_string(),
                "{\\pos(960,540)}STATION".to_string(),
            ));
        }

        let classes = classify_styles(&events);
        assert_eq!(classes["Main"], StyleClass::Dialog);
        assert_eq!(classes["TypeSet"], StyleClass::Signs);
    }

    #[test]
    fn test_classify_styles_name_tiebreak() {
        // 50-80% plain: name patterns decide
        let mut events = Vec::new();
        for i in 0..10 {
            let text = if i < 7 {
                "plain".to_string()
            } else {
                "{\\pos(1,1)}x".to_string()
            };
            events.push(("Default".to_string(), text.clone()));
            events.push(("KaraokeFx".to_string(), text));
        }
        let classes = classify_styles(&events);
        assert_eq!(classes["Default"], StyleClass::Dialog);
        assert_eq!(classes["KaraokeFx"], StyleClass::Signs);
    }

    #[test]
    fn test_unknown_heavy_positioning_is_signs() {
        let events = vec![
            ("Mystery".to_string(), "{\\pos(1,1)}a".to_string()),
            ("Mystery".to_string(), "{\\pos(1,1)}b".to_string()),
            ("Mystery".to_string(), "plain".to_string()),
        ];
        let classes = classify_styles(&events);
        assert_eq!(classes["Mystery"], StyleClass::Signs);
    }
}
