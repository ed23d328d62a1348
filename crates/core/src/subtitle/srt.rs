//! SRT (SubRip) parsing and serialization.

use std::time::Duration;

use regex_lite::Regex;

use super::SubtitleError;

#[derive(Debug, Clone, PartialEq)]
pub struct SrtCue {
    pub index: usize,
    pub start: Duration,
    pub end: Duration,
    pub text: String,
}

#[derive(Debug, Clone, Default)]
pub struct SrtFile {
    pub cues: Vec<SrtCue>,
}

impl SrtFile {
    pub fn parse(content: &str) -> Result<Self, SubtitleError> {
        let content = content.trim_start_matches('\u{feff}').replace("\r\n", "\n");
        let timing = Regex::new(
            r"(\d{2}):(\d{2}):(\d{2}),(\d{3}) --> (\d{2}):(\d{2}):(\d{2}),(\d{3})",
        )
        .expect("static regex");

        let mut cues = Vec::new();
        for block in content.split("\n\n") {
            let block = block.trim();
            if block.is_empty() {
                continue;
            }
            let lines: Vec<&str> = block.lines().collect();
            if lines.len() < 2 {
                continue;
            }

            // Index line is optional in the wild; timing may be first
            let (timing_line, text_start) = if timing.is_match(lines[0]) {
                (lines[0], 1)
            } else if lines.len() >= 2 && timing.is_match(lines[1]) {
                (lines[1], 2)
            } else {
                continue;
            };

            let caps = timing
                .captures(timing_line)
                .ok_or_else(|| SubtitleError::Parse("bad timing line".to_string()))?;
            let start = capture_time(&caps, 1)?;
            let end = capture_time(&caps, 5)?;
            let text = lines[text_start..].join("\n");
            if text.is_empty() {
                continue;
            }

            cues.push(SrtCue {
                index: cues.len() + 1,
                start,
                end,
                text,
            });
        }

        if cues.is_empty() {
            return Err(SubtitleError::Parse("no cues found".to_string()));
        }
        Ok(Self { cues })
    }

    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for (i, cue) in self.cues.iter().enumerate() {
            out.push_str(&format!("{}\n", i + 1));
            out.push_str(&format!(
                "{} --> {}\n",
                format_timestamp(cue.start),
                format_timestamp(cue.end)
            ));
            out.push_str(&cue.text);
            out.push_str("\n\n");
        }
        out
    }

    /// The cue texts, one entry per cue (inner newlines preserved).
    pub fn texts(&self) -> Vec<&str> {
        self.cues.iter().map(|c| c.text.as_str()).collect()
    }

    /// Replace every cue's text; the count must match.
    pub fn replace_texts(&mut self, texts: &[String]) -> Result<(), SubtitleError> {
        if texts.len() != self.cues.len() {
            return Err(SubtitleError::Parse(format!(
                "text count {} does not match cue count {}",
                texts.len(),
                self.cues.len()
            )));
        }
        for (cue, text) in self.cues.iter_mut().zip(texts) {
            cue.text = text.clone();
        }
        Ok(())
    }
}

fn capture_time(caps: &regex_lite::Captures, start_group: usize) -> Result<Duration, SubtitleError> {
    let part = |i: usize| -> Result<u64, SubtitleError> {
        caps.get(start_group + i)
            .ok_or_else(|| SubtitleError::Parse("missing time group".to_string()))?
            .as_str()
            .parse()
            .map_err(|e| SubtitleError::Parse(format!("bad time value: {}", e)))
    };
    let hours = part(0)?;
    let minutes = part(1)?;
    let seconds = part(2)?;
    let millis = part(3)?;
    Ok(Duration::from_millis(
        ((hours * 60 + minutes) * 60 + seconds) * 1000 + millis,
    ))
}

fn format_timestamp(d: Duration) -> String {
    let total_ms = d.as_millis();
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let seconds = (total_ms % 60_000) / 1000;
    let millis = total_ms % 1000;
    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, seconds, millis)
}
