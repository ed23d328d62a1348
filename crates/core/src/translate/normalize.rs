//! Source-line normalization for the translation memory.
//!
//! Memory keys are normalized, never raw: override tags stripped, line
//! breaks flattened, whitespace collapsed, lowercased.

/// Normalize a subtitle line for memory lookup/storage.
pub fn normalize_line(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_override = false;

    for c in text.chars() {
        match c {
            '{' => in_override = true,
            '}' => in_override = false,
            _ if in_override => {}
            _ => out.push(c),
        }
    }

    // ASS soft/hard breaks and hard spaces become plain spaces
    let out = out.replace("\\N", " ").replace("\\n", " ").replace("\\h", " ");

    out.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lines containing override tags are unsafe for plain-text memory
/// substitution (the stored target has no tags to restore).
pub fn is_memory_safe(text: &str) -> bool {
    !text.contains('{')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_override_tags() {
        assert_eq!(normalize_line("{\\i1}Hello{\\i0} there"), "hello there");
        assert_eq!(normalize_line("{\\pos(1,2)}SIGN"), "sign");
    }

    #[test]
    fn test_collapses_whitespace_and_breaks() {
        assert_eq!(normalize_line("Hello\\Nthere   friend"), "hello there friend");
        assert_eq!(normalize_line("  a \\h b  "), "a b");
    }

    #[test]
    fn test_lowercases() {
        assert_eq!(normalize_line("HELLO There"), "hello there");
    }

    #[test]
    fn test_plain_text_unchanged_semantically() {
        assert_eq!(normalize_line("hello there"), "hello there");
    }

    #[test]
    fn test_memory_safety() {
        assert!(is_memory_safe("plain line"));
        assert!(!is_memory_safe("{\\i1}styled{\\i0}"));
    }
}
