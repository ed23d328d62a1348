//! Provider artifact extraction.
//!
//! Providers serve subtitles as bare files, ZIP archives or gzip streams.
//! Extraction is recursive (archives inside archives) with a fixed depth
//! limit, and rejects entries whose paths escape the extraction root.

use std::io::Read;
use std::path::Path;

use super::{detect_format, SubtitleError, SubtitleFormat};

/// Maximum nesting depth for archives inside archives.
const MAX_DEPTH: usize = 3;

/// A file pulled out of an artifact.
#[derive(Debug, Clone)]
pub struct ExtractedFile {
    pub name: String,
    pub content: String,
    pub format: SubtitleFormat,
}

/// Extract every subtitle file from raw provider bytes.
///
/// Bare subtitle content passes straight through; ZIP and gzip payloads are
/// unpacked recursively.
pub fn extract_subtitles(data: &[u8], name_hint: &str) -> Result<Vec<ExtractedFile>, SubtitleError> {
    extract_inner(data, name_hint, 0)
}

fn extract_inner(
    data: &[u8],
    name_hint: &str,
    depth: usize,
) -> Result<Vec<ExtractedFile>, SubtitleError> {
    if depth > MAX_DEPTH {
        return Err(SubtitleError::Archive("archive nesting too deep".to_string()));
    }

    if data.starts_with(b"PK\x03\x04") {
        return extract_zip(data, depth);
    }
    if data.starts_with(&[0x1f, 0x8b]) {
        return extract_gzip(data, name_hint, depth);
    }
    if data.starts_with(b"Rar!") || data.starts_with(&[0xfd, b'7', b'z', b'X', b'Z']) {
        return Err(SubtitleError::Archive(format!(
            "unsupported archive format for {}",
            name_hint
        )));
    }

    // Bare subtitle file
    let content = decode_text(data);
    match detect_format(&content) {
        Some(format) => Ok(vec![ExtractedFile {
            name: name_hint.to_string(),
            content,
            format,
        }]),
        None => Ok(Vec::new()),
    }
}

fn extract_zip(data: &[u8], depth: usize) -> Result<Vec<ExtractedFile>, SubtitleError> {
    let cursor = std::io::Cursor::new(data);
    let mut archive = zip::ZipArchive::new(cursor)
        .map_err(|e| SubtitleError::Archive(format!("bad zip: {}", e)))?;

    let mut extracted = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| SubtitleError::Archive(format!("bad zip entry: {}", e)))?;
        if entry.is_dir() {
            continue;
        }

        let raw_name = entry.name().to_string();
        reject_traversal(&raw_name)?;

        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut bytes)
            .map_err(|e| SubtitleError::Archive(format!("read {}: {}", raw_name, e)))?;

        extracted.extend(extract_inner(&bytes, &raw_name, depth + 1)?);
    }
    Ok(extracted)
}

fn extract_gzip(
    data: &[u8],
    name_hint: &str,
    depth: usize,
) -> Result<Vec<ExtractedFile>, SubtitleError> {
    let mut decoder = flate2::read::GzDecoder::new(data);
    let mut bytes = Vec::new();
    decoder
        .read_to_end(&mut bytes)
        .map_err(|e| SubtitleError::Archive(format!("bad gzip: {}", e)))?;

    let inner_name = name_hint
        .strip_suffix(".gz")
        .unwrap_or(name_hint)
        .to_string();
    extract_inner(&bytes, &inner_name, depth + 1)
}

fn reject_traversal(name: &str) -> Result<(), SubtitleError> {
    let path = Path::new(name);
    if path.is_absolute()
        || name.contains("..")
        || name.starts_with('/')
        || name.starts_with('\\')
        || (name.len() >= 2 && name.as_bytes()[1] == b':')
    {
        return Err(SubtitleError::UnsafePath(name.to_string()));
    }
    Ok(())
}

/// Decode bytes as UTF-8, stripping a BOM and replacing invalid sequences.
fn decode_text(data: &[u8]) -> String {
    let data = data.strip_prefix(&[0xef, 0xbb, 0xbf][..]).unwrap_or(data);
    String::from_utf8_lossy(data).to_string()
}
