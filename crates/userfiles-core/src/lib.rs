//! Userfiles Core Library
//!
//! This crate provides the domain models, error kinds, configuration and shared
//! helpers used by every stage of the upload ingestion pipeline.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod storage_types;
pub mod utils;

// Re-export commonly used types
pub use config::{
    BackendConfig, Config, NamingStrategy, SourceConfig, ThumbnailSpec, UploadPolicy,
};
pub use error::{ErrorMetadata, LogLevel, UploadError};
pub use storage_types::StorageBackend;
pub use utils::explode_and_clean;
