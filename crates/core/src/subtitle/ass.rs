//! ASS (Advanced SubStation Alpha) document model.
//!
//! Parsing is line-preserving: the document keeps every original line and
//! only rebuilds the ones whose text is explicitly replaced. Re-emitting an
//! untouched document reproduces the input byte for byte; the only sanctioned
//! mutation beyond event text is adding or updating the `Language:` field in
//! `[Script Info]`.

use super::SubtitleError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Dialogue,
    Comment,
}

/// A parsed event line, referencing its raw line by index.
#[derive(Debug, Clone)]
pub struct AssEvent {
    pub line_index: usize,
    pub kind: EventKind,
    pub style: String,
    pub text: String,
}

/// A style declaration from `[V4+ Styles]`.
#[derive(Debug, Clone)]
pub struct AssStyle {
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct AssDocument {
    lines: Vec<String>,
    newline: &'static str,
    trailing_newline: bool,
    bom: bool,
    events: Vec<AssEvent>,
    styles: Vec<AssStyle>,
    /// Line range of the `[Script Info]` section body (exclusive end).
    script_info_range: Option<(usize, usize)>,
    /// Column count of the `[Events]` Format line (Text is the last column).
    event_columns: usize,
}

impl AssDocument {
    pub fn parse(content: &str) -> Result<Self, SubtitleError> {
        let bom = content.starts_with('\u{feff}');
        let body = content.trim_start_matches('\u{feff}');
        let newline = if body.contains("\r\n") { "\r\n" } else { "\n" };
        let trailing_newline = body.ends_with('\n');

        let lines: Vec<String> = body
            .split('\n')
            .map(|l| l.strip_suffix('\r').unwrap_or(l).to_string())
            .collect();
        // split('\n') yields a trailing empty element when the file ends
        // with a newline; drop it, the flag restores it on emit.
        let lines = if trailing_newline && lines.last().map(|l| l.is_empty()).unwrap_or(false) {
            lines[..lines.len() - 1].to_vec()
        } else {
            lines
        };

        let mut events = Vec::new();
        let mut styles = Vec::new();
        let mut script_info_range = None;
        let mut event_columns = 10; // standard ASS column count
        let mut section = String::new();
        let mut section_start = 0usize;

        for (idx, line) in lines.iter().enumerate() {
            let trimmed = line.trim();
            if trimmed.starts_with('[') && trimmed.ends_with(']') {
                if section.eq_ignore_ascii_case("[script info]") {
                    script_info_range = Some((section_start, idx));
                }
                section = trimmed.to_lowercase();
                section_start = idx + 1;
                continue;
            }

            match section.as_str() {
                "[v4+ styles]" | "[v4 styles]" => {
                    if let Some(rest) = strip_key(trimmed, "Style:") {
                        let name = rest.split(',').next().unwrap_or("").trim().to_string();
                        if !name.is_empty() {
                            styles.push(AssStyle { name });
                        }
                    }
                }
                "[events]" => {
                    if let Some(rest) = strip_key(trimmed, "Format:") {
                        event_columns = rest.split(',').count();
                    } else if let Some(rest) = strip_key(line, "Dialogue:") {
                        if let Some(event) =
                            parse_event(idx, EventKind::Dialogue, rest, event_columns)
                        {
                            events.push(event);
                        }
                    } else if let Some(rest) = strip_key(line, "Comment:") {
                        if let Some(event) =
                            parse_event(idx, EventKind::Comment, rest, event_columns)
                        {
                            events.push(event);
                        }
                    }
                }
                _ => {}
            }
        }
        if section.eq_ignore_ascii_case("[script info]") {
            script_info_range = Some((section_start, lines.len()));
        }

        if script_info_range.is_none() && events.is_empty() {
            return Err(SubtitleError::Parse(
                "not an ASS document (no Script Info, no events)".to_string(),
            ));
        }

        Ok(Self {
            lines,
            newline,
            trailing_newline,
            bom,
            events,
            styles,
            script_info_range,
            event_columns,
        })
    }

    pub fn events(&self) -> &[AssEvent] {
        &self.events
    }

    pub fn styles(&self) -> &[AssStyle] {
        &self.styles
    }

    /// Dialogue events only (Comments are never translated).
    pub fn dialogue_events(&self) -> impl Iterator<Item = &AssEvent> {
        self.events
            .iter()
            .filter(|e| e.kind == EventKind::Dialogue)
    }

    /// Replace the text field of the event at `line_index`, preserving every
    /// other field byte for byte.
    pub fn set_event_text(&mut self, line_index: usize, new_text: &str) -> Result<(), SubtitleError> {
        let event = self
            .events
            .iter_mut()
            .find(|e| e.line_index == line_index)
            .ok_or_else(|| SubtitleError::Parse(format!("no event at line {}", line_index)))?;

        let line = &self.lines[line_index];
        let prefix_len = event_text_offset(line, self.event_columns)
            .ok_or_else(|| SubtitleError::Parse("malformed event line".to_string()))?;

        let mut rebuilt = line[..prefix_len].to_string();
        rebuilt.push_str(new_text);
        self.lines[line_index] = rebuilt;
        event.text = new_text.to_string();
        Ok(())
    }

    /// Current `Language:` value from `[Script Info]`, if present.
    pub fn language(&self) -> Option<&str> {
        let (start, end) = self.script_info_range?;
        self.lines[start..end]
            .iter()
            .find_map(|l| strip_key(l.trim(), "Language:"))
    }

    /// Set (or add) the `Language:` field in `[Script Info]`.
    pub fn set_language(&mut self, tag: &str) {
        let new_line = format!("Language: {}", tag);
        if let Some((start, end)) = self.script_info_range {
            for idx in start..end {
                if strip_key(self.lines[idx].trim(), "Language:").is_some() {
                    self.lines[idx] = new_line;
                    return;
                }
            }
            // Insert after the last non-empty line of the section
            let mut insert_at = end;
            while insert_at > start && self.lines[insert_at - 1].trim().is_empty() {
                insert_at -= 1;
            }
            self.lines.insert(insert_at, new_line);
            self.reindex_after_insert(insert_at);
        } else {
            // No Script Info section: create one at the top
            let mut header = vec!["[Script Info]".to_string(), new_line, String::new()];
            let shift = header.len();
            header.extend(self.lines.drain(..));
            self.lines = header;
            self.script_info_range = Some((1, 2));
            for event in &mut self.events {
                event.line_index += shift;
            }
        }
    }

    fn reindex_after_insert(&mut self, inserted_at: usize) {
        for event in &mut self.events {
            if event.line_index >= inserted_at {
                event.line_index += 1;
            }
        }
        if let Some((start, end)) = self.script_info_range {
            let start = if start > inserted_at { start + 1 } else { start };
            self.script_info_range = Some((start, end.max(inserted_at) + 1));
        }
    }

    pub fn serialize(&self) -> String {
        let mut out = String::new();
        if self.bom {
            out.push('\u{feff}');
        }
        out.push_str(&self.lines.join(self.newline));
        if self.trailing_newline {
            out.push_str(self.newline);
        }
        out
    }
}

fn strip_key<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(key)?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}

fn parse_event(
    line_index: usize,
    kind: EventKind,
    fields: &str,
    columns: usize,
) -> Option<AssEvent> {
    let parts: Vec<&str> = fields.splitn(columns, ',').collect();
    if parts.len() < columns {
        return None;
    }
    // Standard format: Layer, Start, End, Style, Name, MarginL, MarginR,
    // MarginV, Effect, Text. Style is the 4th column, Text the last.
    let style = parts.get(3)?.trim().to_string();
    let text = parts.last()?.to_string();
    Some(AssEvent {
        line_index,
        kind,
        style,
        text,
    })
}

/// Byte offset where the text field begins in a raw event line.
fn event_text_offset(line: &str, columns: usize) -> Option<usize> {
    let colon = line.find(':')?;
    let mut commas = 0;
    for (i, b) in line.bytes().enumerate().skip(colon + 1) {
        if b == b',' {
            commas += 1;
            if commas == columns - 1 {
                return Some(i + 1);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "[Script Info]\n\
Title: Sample\n\
ScriptType: v4.00+\n\
PlayResX: 1920\n\
\n\
[V4+ Styles]\n\
Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, OutlineColour, BackColour, Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, Angle, BorderStyle, Outline, Shadow, Alignment, MarginL, MarginR, MarginV, Encoding\n\
Style: Default,Arial,48,&H00FFFFFF,&H000000FF,&H00000000,&H00000000,0,0,0,0,100,100,0,0,1,2,0,2,10,10,10,1\n\
Style: Signs,Arial,40,&H00FFFFFF,&H000000FF,&H00000000,&H00000000,0,0,0,0,100,100,0,0,1,2,0,8,10,10,10,1\n\
\n\
[Events]\n\
Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\n\
Dialogue: 0,0:00:01.00,0:00:03.00,Default,,0,0,0,,Hello, world!\n\
Dialogue: 0,0:00:04.00,0:00:06.00,Signs,,0,0,0,,{\\pos(960,540)}STATION SIGN\n\
Comment: 0,0:00:00.00,0:00:00.00,Default,,0,0,0,,translator note\n";

    #[test]
    fn test_parse_structure() {
        let doc = AssDocument::parse(SAMPLE).unwrap();
        assert_eq!(doc.styles().len(), 2);
        assert_eq!(doc.styles()[0].name, "Default");
        assert_eq!(doc.events().len(), 3);
        assert_eq!(doc.dialogue_events().count(), 2);

        let first = &doc.events()[0];
        assert_eq!(first.style, "Default");
        // Commas inside the text field are preserved
        assert_eq!(first.text, "Hello, world!");
    }

    #[test]
    fn test_roundtrip_is_byte_identical() {
        let doc = AssDocument::parse(SAMPLE).unwrap();
        assert_eq!(doc.serialize(), SAMPLE);
    }

    #[test]
    fn test_roundtrip_crlf() {
        let crlf = SAMPLE.replace('\n', "\r\n");
        let doc = AssDocument::parse(&crlf).unwrap();
        assert_eq!(doc.serialize(), crlf);
    }

    #[test]
    fn test_roundtrip_with_bom() {
        let with_bom = format!("\u{feff}{}", SAMPLE);
        let doc = AssDocument::parse(&with_bom).unwrap();
        assert_eq!(doc.serialize(), with_bom);
    }

    #[test]
    fn test_set_language_adds_field_only() {
        let mut doc = AssDocument::parse(SAMPLE).unwrap();
        assert_eq!(doc.language(), None);
        doc.set_language("de");
        assert_eq!(doc.language(), Some("de"));

        let expected = SAMPLE.replace(
            "PlayResX: 1920\n",
            "PlayResX: 1920\nLanguage: de\n",
        );
        assert_eq!(doc.serialize(), expected);
    }

    #[test]
    fn test_set_language_replaces_existing() {
        let with_lang = SAMPLE.replace("PlayResX: 1920\n", "PlayResX: 1920\nLanguage: en\n");
        let mut doc = AssDocument::parse(&with_lang).unwrap();
        assert_eq!(doc.language(), Some("en"));
        doc.set_language("de");
        assert_eq!(doc.language(), Some("de"));
        // Only the field value changed
        assert_eq!(
            doc.serialize(),
            with_lang.replace("Language: en", "Language: de")
        );
    }

    #[test]
    fn test_set_event_text_preserves_prefix() {
        let mut doc = AssDocument::parse(SAMPLE).unwrap();
        let idx = doc.dialogue_events().next().unwrap().line_index;
        doc.set_event_text(idx, "Hallo, Welt!").unwrap();

        let out = doc.serialize();
        assert!(out.contains("Dialogue: 0,0:00:01.00,0:00:03.00,Default,,0,0,0,,Hallo, Welt!"));
        // Other events untouched
        assert!(out.contains("{\\pos(960,540)}STATION SIGN"));
    }

    #[test]
    fn test_set_event_text_after_language_insert() {
        // Inserting the Language field shifts line indices; event updates
        // must still target the right lines.
        let mut doc = AssDocument::parse(SAMPLE).unwrap();
        doc.set_language("de");
        let idx = doc.dialogue_events().next().unwrap().line_index;
        doc.set_event_text(idx, "Hallo!").unwrap();
        let out = doc.serialize();
        assert!(out.contains(",Default,,0,0,0,,Hallo!"));
        assert!(out.contains("Language: de"));
    }

    #[test]
    fn test_override_tags_survive_in_text() {
        let doc = AssDocument::parse(SAMPLE).unwrap();
        let signs = doc
            .events()
            .iter()
            .find(|e| e.style == "Signs")
            .unwrap();
        assert!(signs.text.starts_with("{\\pos(960,540)}"));
    }

    #[test]
    fn test_parse_rejects_non_ass() {
        assert!(AssDocument::parse("1\n00:00:01,000 --> 00:00:02,000\nx\n").is_err());
    }

    #[test]
    fn test_set_language_without_script_info() {
        let content = "[Events]\nFormat: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\nDialogue: 0,0:00:01.00,0:00:02.00,Default,,0,0,0,,Hi\n";
        let mut doc = AssDocument::parse(content).unwrap();
        doc.set_language("de");
        let out = doc.serialize();
        assert!(out.starts_with("[Script Info]\nLanguage: de\n"));
        // The event line still parses and can be edited
        let idx = doc.dialogue_events().next().unwrap().line_index;
        doc.set_event_text(idx, "Hallo").unwrap();
        assert!(doc.serialize().contains(",,Hallo"));
    }
}
