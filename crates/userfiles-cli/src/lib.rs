use std::path::{Path, PathBuf};

use anyhow::Context;
use userfiles_core::models::Actor;
use uuid::Uuid;

/// Initialize tracing for CLI binaries. Logs go to stderr so stdout stays JSON.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Acting identity for a command-line upload. Without `--user` or `--session`
/// a one-off session id is generated.
pub fn actor_from_args(user: Option<Uuid>, session: Option<String>) -> Actor {
    let session = session.unwrap_or_else(|| Uuid::new_v4().simple().to_string());
    let actor = match user {
        Some(id) => Actor::user(id, session),
        None => Actor::anonymous(session),
    };
    actor.uploader()
}

/// Copy `source` to a temp file the pipeline may consume and delete.
pub fn stage_upload(source: &Path) -> anyhow::Result<PathBuf> {
    let staged = tempfile::Builder::new()
        .prefix("userfiles-")
        .suffix(".upload")
        .tempfile()
        .context("Failed to create temp file")?;
    std::fs::copy(source, staged.path())
        .with_context(|| format!("Failed to read {}", source.display()))?;
    staged
        .into_temp_path()
        .keep()
        .context("Failed to keep staged upload")
}

/// Client name of an upload: `--name` or the file name of the input path
pub fn original_name(path: &Path, name: Option<String>) -> String {
    name.unwrap_or_else(|| {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    })
}
