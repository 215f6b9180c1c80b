//! Error types module
//!
//! `UploadError` enumerates every way an upload can end without success. Each
//! variant self-describes how it should be presented through [`ErrorMetadata`]:
//! a stable, localizable message key, a status hint, recoverability and the log
//! level operators should see it at. Raw backend error text only ever appears in
//! the `Display` output (for logs), never in [`ErrorMetadata::client_message`].

use std::collections::BTreeMap;

use uuid::Uuid;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for recoverable or non-fatal issues
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata for error responses - defines how an error should be presented
pub trait ErrorMetadata {
    /// HTTP-style status hint for the surrounding request layer
    fn http_status_code(&self) -> u16;

    /// Stable, localizable message key (e.g. "userfiles_err_file_size")
    fn message_key(&self) -> &'static str;

    /// Whether retrying the same request may succeed
    fn is_recoverable(&self) -> bool;

    /// Client-facing message (never contains backend error text)
    fn client_message(&self) -> String;

    /// Structured values for message localization (e.g. the offending filename)
    fn placeholders(&self) -> BTreeMap<String, String>;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum UploadError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Record not found: {0}")]
    RecordNotFound(Uuid),

    #[error("Source {source_id} could not be initialized: {reason}")]
    SourceInitFailed { source_id: i64, reason: String },

    #[error("No file uploaded: {0}")]
    FileMissing(String),

    #[error("File unreadable: {path}: {reason}")]
    FileUnreadable { path: String, reason: String },

    #[error("File too large: {size} bytes (max: {max} bytes)")]
    FileTooLarge { size: u64, max: u64 },

    #[error("File type not allowed: '{extension}' (allowed: {allowed:?})")]
    FileTypeNotAllowed {
        extension: String,
        allowed: Vec<String>,
    },

    #[error("Invalid placement: {0}")]
    InvalidPlacement(String),

    #[error("Duplicate file: {file}")]
    DuplicateFile { file: String },

    #[error("Failed to create container {path}: {reason}")]
    ContainerCreateFailed { path: String, reason: String },

    #[error("Failed to store {key}: {reason}")]
    StorageWriteFailed { key: String, reason: String },

    #[error("Stored {key} but failed to persist its record: {reason}")]
    OrphanedStorageWrite { key: String, reason: String },

    #[error("Derivative {variant} generation failed: {reason}")]
    DerivativeGenerationFailed { variant: String, reason: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Static metadata for each variant: (http_status, message_key, recoverable, log_level).
fn upload_error_static_metadata(err: &UploadError) -> (u16, &'static str, bool, LogLevel) {
    match err {
        UploadError::PermissionDenied(_) => (
            403,
            "userfiles_err_permission_denied",
            false,
            LogLevel::Debug,
        ),
        UploadError::RecordNotFound(_) => (404, "userfiles_err_nfs", false, LogLevel::Debug),
        UploadError::SourceInitFailed { .. } => (
            500,
            "userfiles_err_source_initialize",
            true,
            LogLevel::Error,
        ),
        UploadError::FileMissing(_) => (400, "userfiles_err_file_ns", false, LogLevel::Debug),
        UploadError::FileUnreadable { .. } => {
            (400, "userfiles_err_file_unreadable", false, LogLevel::Warn)
        }
        UploadError::FileTooLarge { .. } => (413, "userfiles_err_file_size", false, LogLevel::Debug),
        UploadError::FileTypeNotAllowed { .. } => {
            (415, "userfiles_err_file_type", false, LogLevel::Debug)
        }
        UploadError::InvalidPlacement(_) => {
            (400, "userfiles_err_placement", false, LogLevel::Debug)
        }
        UploadError::DuplicateFile { .. } => {
            (409, "userfiles_err_file_exists", false, LogLevel::Debug)
        }
        UploadError::ContainerCreateFailed { .. } => (
            500,
            "userfiles_err_container_create",
            true,
            LogLevel::Error,
        ),
        UploadError::StorageWriteFailed { .. } => {
            (500, "userfiles_err_file_create", true, LogLevel::Error)
        }
        UploadError::OrphanedStorageWrite { .. } => {
            (500, "userfiles_err_file_orphaned", false, LogLevel::Error)
        }
        UploadError::DerivativeGenerationFailed { .. } => {
            (500, "userfiles_err_derivative", true, LogLevel::Warn)
        }
        UploadError::Internal(_) => (500, "userfiles_err_unknown", true, LogLevel::Error),
    }
}

impl UploadError {
    /// Get the error kind name for logs and diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            UploadError::PermissionDenied(_) => "PermissionDenied",
            UploadError::RecordNotFound(_) => "RecordNotFound",
            UploadError::SourceInitFailed { .. } => "SourceInitFailed",
            UploadError::FileMissing(_) => "FileMissing",
            UploadError::FileUnreadable { .. } => "FileUnreadable",
            UploadError::FileTooLarge { .. } => "FileTooLarge",
            UploadError::FileTypeNotAllowed { .. } => "FileTypeNotAllowed",
            UploadError::InvalidPlacement(_) => "InvalidPlacement",
            UploadError::DuplicateFile { .. } => "DuplicateFile",
            UploadError::ContainerCreateFailed { .. } => "ContainerCreateFailed",
            UploadError::StorageWriteFailed { .. } => "StorageWriteFailed",
            UploadError::OrphanedStorageWrite { .. } => "OrphanedStorageWrite",
            UploadError::DerivativeGenerationFailed { .. } => "DerivativeGenerationFailed",
            UploadError::Internal(_) => "Internal",
        }
    }
}

impl ErrorMetadata for UploadError {
    fn http_status_code(&self) -> u16 {
        upload_error_static_metadata(self).0
    }

    fn message_key(&self) -> &'static str {
        upload_error_static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        upload_error_static_metadata(self).2
    }

    fn log_level(&self) -> LogLevel {
        upload_error_static_metadata(self).3
    }

    fn client_message(&self) -> String {
        match self {
            UploadError::PermissionDenied(_) => "You are not allowed to upload files".to_string(),
            UploadError::RecordNotFound(id) => format!("File {} not found", id),
            UploadError::SourceInitFailed { .. } => {
                "The upload destination is not available".to_string()
            }
            UploadError::FileMissing(_) => "No file was uploaded".to_string(),
            UploadError::FileUnreadable { .. } => "The uploaded file could not be read".to_string(),
            UploadError::FileTooLarge { max, .. } => {
                format!("File exceeds the maximum allowed size of {} bytes", max)
            }
            UploadError::FileTypeNotAllowed { extension, .. } => {
                format!("Files of type '{}' are not allowed", extension)
            }
            UploadError::InvalidPlacement(msg) => msg.clone(),
            UploadError::DuplicateFile { file } => format!("File '{}' already exists", file),
            UploadError::ContainerCreateFailed { .. } | UploadError::StorageWriteFailed { .. } => {
                "Failed to save the file".to_string()
            }
            UploadError::OrphanedStorageWrite { .. } => {
                "The file was saved but could not be registered".to_string()
            }
            UploadError::DerivativeGenerationFailed { variant, .. } => {
                format!("Failed to generate thumbnail {}", variant)
            }
            UploadError::Internal(_) => "Internal server error".to_string(),
        }
    }

    fn placeholders(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        match self {
            UploadError::RecordNotFound(id) => {
                out.insert("id".to_string(), id.to_string());
            }
            UploadError::FileTooLarge { size, max } => {
                out.insert("size".to_string(), size.to_string());
                out.insert("max".to_string(), max.to_string());
            }
            UploadError::FileTypeNotAllowed { extension, allowed } => {
                out.insert("type".to_string(), extension.clone());
                out.insert("allowed".to_string(), allowed.join(","));
            }
            UploadError::DuplicateFile { file } => {
                out.insert("file".to_string(), file.clone());
            }
            UploadError::DerivativeGenerationFailed { variant, .. } => {
                out.insert("variant".to_string(), variant.clone());
            }
            _ => {}
        }
        out
    }
}
