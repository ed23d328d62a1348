//! LLM prompt construction for batch translation.
//!
//! The contract with the model is strict: exactly one output line per input
//! line, no numbering, no commentary. Glossary terms go in a header block;
//! an optional SRT reference is embedded as unnumbered context with explicit
//! instructions not to align against it.

use super::types::TranslationRequest;

/// Default system prompt for translation backends.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a professional subtitle translator. \
You preserve meaning, tone and register, keep honorifics where natural, and never \
add explanations to your output.";

/// Build the full user prompt for a batch translation.
pub fn build_translation_prompt(request: &TranslationRequest) -> String {
    let mut prompt = String::new();

    prompt.push_str(&format!(
        "Translate the following {count} subtitle lines from {src} to {tgt}.\n\
         Rules:\n\
         - Return EXACTLY {count} lines: one translation per input line, in order.\n\
         - No numbering, no prefixes, no commentary, no blank lines.\n\
         - Preserve inline ASS override tags like {{\\i1}} and \\N exactly as they appear.\n",
        count = request.lines.len(),
        src = request.source_language,
        tgt = request.target_language,
    ));

    if !request.glossary.is_empty() {
        prompt.push_str("\nGlossary (always use these translations):\n");
        for (source, target) in &request.glossary {
            prompt.push_str(&format!("- {} => {}\n", source, target));
        }
    }

    if let Some(reference) = &request.srt_reference {
        if !reference.is_empty() {
            prompt.push_str(
                "\nReference subtitles in the target language (same scene, different cut):\n\
                 Use the reference ONLY as vocabulary and tone guidance; translate each \
                 line independently; improve phrasing when the reference is awkward. The \
                 reference is NOT aligned with the input lines.\n---\n",
            );
            for line in reference {
                prompt.push_str(line);
                prompt.push('\n');
            }
            prompt.push_str("---\n");
        }
    }

    prompt.push_str("\nInput lines:\n");
    for line in &request.lines {
        prompt.push_str(line);
        prompt.push('\n');
    }

    prompt
}

/// Build the evaluation prompt: score each translation 0–100.
pub fn build_evaluation_prompt(
    source: &[String],
    translated: &[String],
    source_language: &str,
    target_language: &str,
) -> String {
    let mut prompt = format!(
        "Rate the quality of each {tgt} translation of the {src} source line on a \
         0-100 scale (100 = perfect). Return EXACTLY {count} lines, each containing \
         only an integer.\n\n",
        src = source_language,
        tgt = target_language,
        count = source.len(),
    );
    for (src, tgt) in source.iter().zip(translated) {
        prompt.push_str(&format!("SOURCE: {}\nTRANSLATION: {}\n\n", src, tgt));
    }
    prompt
}

/// Parse a model response into exactly `expected` lines.
pub fn parse_response_lines(text: &str, expected: usize) -> Option<Vec<String>> {
    let lines: Vec<String> = text
        .lines()
        .map(|l| l.trim_end().to_string())
        .filter(|l| !l.trim().is_empty())
        .collect();
    if lines.len() == expected {
        Some(lines)
    } else {
        None
    }
}

/// Select the proportional slice of reference lines for a batch.
///
/// The batch covers `[batch_start, batch_start + batch_len)` of
/// `total_lines` dialogue lines; the window maps that range onto the
/// reference with a ±20% buffer. Full references are avoided for token cost.
pub fn reference_window(
    reference: &[String],
    batch_start: usize,
    batch_len: usize,
    total_lines: usize,
) -> Vec<String> {
    if reference.is_empty() || total_lines == 0 {
        return Vec::new();
    }

    let ref_len = reference.len() as f64;
    let start_fraction = batch_start as f64 / total_lines as f64;
    let end_fraction = (batch_start + batch_len) as f64 / total_lines as f64;

    let buffer = 0.2;
    let window_start = ((start_fraction - buffer).max(0.0) * ref_len).floor() as usize;
    let window_end = ((end_fraction + buffer).min(1.0) * ref_len).ceil() as usize;

    reference[window_start..window_end.min(reference.len())].to_vec()
}
