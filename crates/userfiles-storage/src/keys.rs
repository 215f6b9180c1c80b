//! Shared key handling for storage backends.
//!
//! Key format: `{container}{filename}`, where a non-empty container ends with `/`.

use crate::traits::{StorageError, StorageResult};

/// Join a container path and a filename into a storage key.
pub fn join_key(path: &str, filename: &str) -> String {
    let path = path.trim_start_matches('/');
    if path.is_empty() || path.ends_with('/') {
        format!("{}{}", path, filename)
    } else {
        format!("{}/{}", path, filename)
    }
}

/// Reject keys that could escape the storage root.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("Storage key is empty".to_string()));
    }
    if key.contains("..") || key.starts_with('/') || key.contains('\\') {
        return Err(StorageError::InvalidKey(
            "Storage key contains invalid characters".to_string(),
        ));
    }
    Ok(())
}

/// Every prefix of a container path, shortest first: `a/b/` yields `a/`, `a/b/`.
pub fn container_prefixes(path: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        current.push_str(segment);
        current.push('/');
        out.push(current.clone());
    }
    out
}
