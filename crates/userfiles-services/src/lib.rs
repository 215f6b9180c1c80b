//! Userfiles Services Layer
//!
//! This crate hosts the upload orchestration: it sequences inspection,
//! validation, naming, duplicate detection, storage, persistence and the
//! derivative cascade, and owns the failure policy between them.

pub mod cascade;
pub mod duplicate;
pub mod orchestrator;
pub mod registry;
pub mod response;
pub mod temp;

pub use cascade::{CascadeReport, ThumbnailCascade};
pub use duplicate::DuplicateChecker;
pub use orchestrator::{UploadOrchestrator, UploadOutcome, UploadRequest, UploadState, UploadedFile};
pub use registry::SourceRegistry;
pub use response::UploadResponse;
pub use temp::TempFileGuard;
pub use userfiles_storage::{create_storage, LocalStorage, Storage, StorageBackend, StorageError};
