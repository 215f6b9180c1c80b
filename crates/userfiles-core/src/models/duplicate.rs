use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::upload::Owner;
use crate::utils::explode_and_clean;

/// Record fields a duplicate lookup can compare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DuplicateField {
    Source,
    Parent,
    Class,
    List,
    Hash,
    Context,
    Path,
    File,
    Ext,
    Mime,
    Name,
    Size,
}

impl DuplicateField {
    /// Unknown field names yield `None` and are ignored by callers
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "source" => Some(Self::Source),
            "parent" => Some(Self::Parent),
            "class" => Some(Self::Class),
            "list" => Some(Self::List),
            "hash" => Some(Self::Hash),
            "context" => Some(Self::Context),
            "path" => Some(Self::Path),
            "file" => Some(Self::File),
            "ext" | "type" => Some(Self::Ext),
            "mime" => Some(Self::Mime),
            "name" => Some(Self::Name),
            "size" => Some(Self::Size),
            _ => None,
        }
    }

    /// Parse a configured field list, dropping unknown, empty and repeated entries
    pub fn parse_list(fields: &[String]) -> Vec<Self> {
        let mut out = Vec::new();
        for field in explode_and_clean(&fields.join(","), ',')
            .iter()
            .filter_map(|f| Self::parse(f))
        {
            if !out.contains(&field) {
                out.push(field);
            }
        }
        out
    }

    /// Column name in `user_files`
    pub fn column(&self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Parent => "parent",
            Self::Class => "class",
            Self::List => "list",
            Self::Hash => "hash",
            Self::Context => "context",
            Self::Path => "path",
            Self::File => "file",
            Self::Ext => "ext",
            Self::Mime => "mime",
            Self::Name => "name",
            Self::Size => "size",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Int(i64),
    Text(String),
}

/// Criteria for an existing-record lookup, always scoped to one owner
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateQuery {
    pub criteria: Vec<(DuplicateField, FieldValue)>,
    pub owner: Owner,
    /// Record to leave out (the crop target itself)
    pub exclude_id: Option<Uuid>,
}

impl DuplicateQuery {
    /// Stable digest of the owner and the compared values, stored in
    /// `user_files.slot_key` and uniquely indexed. Two uploads share a key
    /// exactly when this query would count one as a duplicate of the other.
    pub fn slot_key(&self) -> String {
        let mut criteria: Vec<&(DuplicateField, FieldValue)> = self.criteria.iter().collect();
        criteria.sort_by_key(|(field, _)| field.column());

        let mut hasher = Sha256::new();
        let owner = self.owner.key();
        hasher.update(format!("owner:{}:{};", owner.len(), owner));
        for (field, value) in criteria {
            let value = match value {
                FieldValue::Int(v) => format!("i{}", v),
                FieldValue::Text(v) => format!("t{}", v),
            };
            hasher.update(format!("{}:{}:{};", field.column(), value.len(), value));
        }
        hex::encode(hasher.finalize())
    }
}
