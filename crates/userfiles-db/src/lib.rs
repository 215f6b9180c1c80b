//! Userfiles persistence
//!
//! The `FileRepository` trait is the record store the pipeline writes to.
//! `PostgresFileRepository` backs it with sqlx; `MemoryFileRepository` holds
//! records in-process with the same uniqueness rule.

pub mod db;
pub mod error;
pub mod memory;
pub mod repository;

pub use db::{PostgresFileRepository, MIGRATOR};
pub use error::{RepositoryError, RepositoryResult};
pub use memory::MemoryFileRepository;
pub use repository::FileRepository;
