//! Atomic subtitle writes.
//!
//! Output lands in a temp file in the destination directory, is fsynced,
//! then renamed over the final path so concurrent readers never observe a
//! partial file.

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;

/// Write `content` to `path` atomically. Returns the content's SHA-256 hex.
pub async fn write_atomic(path: &Path, content: &str) -> std::io::Result<String> {
    let dir = path.parent().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no parent")
    })?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "subtitle".to_string());
    let temp_path = dir.join(format!(".{}.tmp-{}", file_name, uuid::Uuid::new_v4()));

    let result = async {
        let mut file = tokio::fs::File::create(&temp_path).await?;
        file.write_all(content.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&temp_path, path).await
    }
    .await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(&temp_path).await;
    }
    result?;

    Ok(content_hash(content))
}

/// SHA-256 hex digest of subtitle content.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
