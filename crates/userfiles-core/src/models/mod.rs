//! Data models for the upload pipeline
//!
//! Persistent records live in `file`, ephemeral per-request values in `upload`,
//! and duplicate lookup criteria in `duplicate`.

mod duplicate;
mod file;
mod upload;

pub use duplicate::*;
pub use file::*;
pub use upload::*;
