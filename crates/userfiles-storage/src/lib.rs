//! Userfiles Storage Library
//!
//! This crate provides the storage capability used by the upload pipeline: the
//! `Storage` trait and its local filesystem and S3 implementations.
//!
//! # Storage key format
//!
//! A key is the concatenation of a container path and a filename:
//! `{list}/{class}/{parent}/{filename}`. Containers always end with `/`.
//!
//! Keys must not contain `..`, a backslash or a leading `/`. Key handling is
//! centralized in the `keys` module so all backends stay consistent.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use factory::create_storage;
pub use keys::{join_key, validate_key};
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
#[cfg(feature = "storage-s3")]
pub use s3::{BatchEntry, S3Storage, UploadBatch};
pub use traits::{Storage, StorageError, StorageResult, StoredObject};
pub use userfiles_core::StorageBackend;
