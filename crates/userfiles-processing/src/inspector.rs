//! Content inspection - size, sniffed MIME type, dimensions and content hash
//!
//! The client-declared content type is never consulted; the MIME type comes
//! from the leading bytes of the file.

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use userfiles_core::models::UploadCandidate;

const HASH_CHUNK_SIZE: usize = 64 * 1024;
const SNIFF_LEN: usize = 8 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum InspectError {
    #[error("File unreadable: {path}: {reason}")]
    Unreadable { path: String, reason: String },
}

impl InspectError {
    fn unreadable(path: &Path, reason: impl ToString) -> Self {
        InspectError::Unreadable {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Produces an [`UploadCandidate`] from a temporary file
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentInspector;

impl ContentInspector {
    pub fn new() -> Self {
        Self
    }

    pub async fn inspect(
        &self,
        temp_path: &Path,
        original_name: &str,
    ) -> Result<UploadCandidate, InspectError> {
        let meta = tokio::fs::metadata(temp_path)
            .await
            .map_err(|e| InspectError::unreadable(temp_path, e))?;
        if !meta.is_file() {
            return Err(InspectError::unreadable(temp_path, "not a regular file"));
        }

        let (hash, size, head) = hash_file(temp_path).await?;
        let mime = sniff_mime(&head, size);
        let (name, ext) = split_name(original_name);

        let (width, height) = if mime.starts_with("image/") {
            image_dimensions(temp_path).await
        } else {
            (0, 0)
        };

        tracing::debug!(
            path = %temp_path.display(),
            size_bytes = size,
            mime = %mime,
            ext = %ext,
            width,
            height,
            "Upload inspected"
        );

        Ok(UploadCandidate {
            temp_path: temp_path.to_path_buf(),
            size,
            mime,
            properties: serde_json::json!({ "w": width, "h": height, "f": ext }),
            ext,
            name,
            width,
            height,
            hash,
        })
    }
}

/// Stream the file through SHA-256, keeping the first bytes for sniffing.
async fn hash_file(path: &Path) -> Result<(String, u64, Vec<u8>), InspectError> {
    let mut file = File::open(path)
        .await
        .map_err(|e| InspectError::unreadable(path, e))?;

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_CHUNK_SIZE];
    let mut head = Vec::with_capacity(SNIFF_LEN);
    let mut size: u64 = 0;

    loop {
        let n = file
            .read(&mut buf)
            .await
            .map_err(|e| InspectError::unreadable(path, e))?;
        if n == 0 {
            break;
        }
        if head.len() < SNIFF_LEN {
            let take = (SNIFF_LEN - head.len()).min(n);
            head.extend_from_slice(&buf[..take]);
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }

    Ok((hex::encode(hasher.finalize()), size, head))
}

/// MIME type from magic bytes, falling back to a text/binary heuristic.
pub fn sniff_mime(head: &[u8], size: u64) -> String {
    if let Some(kind) = infer::get(head) {
        return kind.mime_type().to_string();
    }
    if size == 0 {
        return "application/x-empty".to_string();
    }
    let looks_textual = match std::str::from_utf8(head) {
        Ok(_) => true,
        // a multibyte char cut off by the sniff window
        Err(e) => e.error_len().is_none(),
    };
    if looks_textual && !head.contains(&0) {
        "text/plain".to_string()
    } else {
        "application/octet-stream".to_string()
    }
}

/// Split a client filename into (base name, lower-cased extension).
///
/// Directory components are dropped. Without a '.', the extension is empty.
pub fn split_name(original_name: &str) -> (String, String) {
    let file_name = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original_name)
        .trim();
    match file_name.rfind('.') {
        Some(idx) => (
            file_name[..idx].to_string(),
            file_name[idx + 1..].to_lowercase(),
        ),
        None => (file_name.to_string(), String::new()),
    }
}

#[cfg(feature = "image")]
async fn image_dimensions(path: &Path) -> (u32, u32) {
    let owned = path.to_path_buf();
    let measured = tokio::task::spawn_blocking(move || {
        image::ImageReader::open(&owned)?
            .with_guessed_format()?
            .into_dimensions()
            .map_err(std::io::Error::other)
    })
    .await;

    match measured {
        Ok(Ok(dims)) => dims,
        Ok(Err(e)) => {
            tracing::debug!(error = %e, path = %path.display(), "Could not read image dimensions");
            (0, 0)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Dimension read task failed");
            (0, 0)
        }
    }
}

#[cfg(not(feature = "image"))]
async fn image_dimensions(_path: &Path) -> (u32, u32) {
    (0, 0)
}
