use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::constants::{
    DEFAULT_CLASS, DEFAULT_CONTEXT, DEFAULT_LIST, DEFAULT_PARENT, UPLOAD_PERMISSION,
};

/// Inspected upload, produced once per request and consumed by validation and naming.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadCandidate {
    pub temp_path: PathBuf,
    pub size: u64,
    pub mime: String,
    /// Lower-cased text after the final '.', empty when there is none
    pub ext: String,
    /// Client name without its extension
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Hex SHA-256 of the full byte stream
    pub hash: String,
    pub properties: JsonValue,
}

impl UploadCandidate {
    pub fn is_image(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// Owner scope for duplicate detection. The two modes never mix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Owner {
    User(Uuid),
    Anonymous(String),
}

impl Owner {
    /// Stable key stored alongside the record (`user:<uuid>` / `session:<id>`)
    pub fn key(&self) -> String {
        match self {
            Owner::User(id) => format!("user:{}", id),
            Owner::Anonymous(session) => format!("session:{}", session),
        }
    }

    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Owner::User(id) => Some(*id),
            Owner::Anonymous(_) => None,
        }
    }
}

/// The authenticated (or anonymous) caller, passed in explicitly.
#[derive(Debug, Clone, Default)]
pub struct Actor {
    pub user_id: Option<Uuid>,
    pub session_id: String,
    pub permissions: HashSet<String>,
}

impl Actor {
    pub fn user(user_id: Uuid, session_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id),
            session_id: session_id.into(),
            permissions: HashSet::new(),
        }
    }

    pub fn anonymous(session_id: impl Into<String>) -> Self {
        Self {
            user_id: None,
            session_id: session_id.into(),
            permissions: HashSet::new(),
        }
    }

    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.insert(permission.into());
        self
    }

    /// Shorthand for an actor allowed to upload
    pub fn uploader(self) -> Self {
        self.with_permission(UPLOAD_PERMISSION)
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    pub fn owner(&self) -> Owner {
        match self.user_id {
            Some(id) => Owner::User(id),
            None => Owner::Anonymous(self.session_id.clone()),
        }
    }
}

/// Resolved placement of an upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub source: i64,
    pub parent: i64,
    pub class: String,
    pub list: String,
    pub context: String,
}

impl Placement {
    pub fn with_defaults(source: i64) -> Self {
        Self {
            source,
            parent: DEFAULT_PARENT,
            class: DEFAULT_CLASS.to_string(),
            list: DEFAULT_LIST.to_string(),
            context: DEFAULT_CONTEXT.to_string(),
        }
    }
}
