//! Name templating
//!
//! Storage paths are the lower-cased `list/class/parent/` of a placement.
//! Filenames come from a template over a closed set of `{token}`s, expanded in
//! a single pass: values are never re-scanned and unknown tokens stay verbatim.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};

use base64::{engine::general_purpose, Engine as _};
use rand::Rng;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use userfiles_core::constants::EMPTY_ID_PLACEHOLDER;
use userfiles_core::models::Placement;
use userfiles_core::{NamingStrategy, ThumbnailSpec};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NamingError {
    #[error("Missing naming parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid path segment for {field}: '{value}'")]
    InvalidSegment { field: &'static str, value: String },

    #[error("Template produced an invalid filename: '{0}'")]
    InvalidFilename(String),
}

/// The placeholders a filename template may use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Token {
    Name,
    Id,
    Class,
    List,
    Session,
    CreatedBy,
    Source,
    Context,
    W,
    H,
    Q,
    Zc,
    Bg,
    Ext,
    Rand,
}

impl Token {
    pub const ALL: [Token; 15] = [
        Token::Name,
        Token::Id,
        Token::Class,
        Token::List,
        Token::Session,
        Token::CreatedBy,
        Token::Source,
        Token::Context,
        Token::W,
        Token::H,
        Token::Q,
        Token::Zc,
        Token::Bg,
        Token::Ext,
        Token::Rand,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Token::Name => "name",
            Token::Id => "id",
            Token::Class => "class",
            Token::List => "list",
            Token::Session => "session",
            Token::CreatedBy => "createdby",
            Token::Source => "source",
            Token::Context => "context",
            Token::W => "w",
            Token::H => "h",
            Token::Q => "q",
            Token::Zc => "zc",
            Token::Bg => "bg",
            Token::Ext => "ext",
            Token::Rand => "rand",
        }
    }

    pub fn parse(key: &str) -> Option<Token> {
        Token::ALL.iter().copied().find(|t| t.as_str() == key)
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{{{}}}", self.as_str())
    }
}

/// Resize parameters exposed as `{w} {h} {q} {zc} {bg}`; empty unless resizing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResizeParams {
    pub w: Option<u32>,
    pub h: Option<u32>,
    pub q: Option<u8>,
    pub zc: Option<bool>,
    pub bg: Option<String>,
}

impl ResizeParams {
    pub fn from_spec(spec: &ThumbnailSpec) -> Self {
        Self {
            w: Some(spec.w),
            h: Some(spec.h),
            q: Some(spec.q),
            zc: Some(spec.zc),
            bg: spec.bg.clone(),
        }
    }
}

fn opt_to_string<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(ToString::to_string).unwrap_or_default()
}

/// Everything a filename may be derived from. Owner identity is explicit.
#[derive(Debug, Clone)]
pub struct NamingInput<'a> {
    pub hash: &'a str,
    pub base_name: &'a str,
    pub ext: &'a str,
    pub placement: &'a Placement,
    pub session: &'a str,
    pub created_by: Option<Uuid>,
    /// Existing record id when re-saving, `None` for new uploads
    pub record_id: Option<Uuid>,
    pub resize: ResizeParams,
}

/// Flat key/value map used for single-pass `{key}` expansion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Placeholders {
    values: BTreeMap<String, String>,
}

impl Placeholders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_map(self) -> BTreeMap<String, String> {
        self.values
    }

    /// Flatten nested JSON into dotted keys under `prefix`.
    ///
    /// `{"a": {"b": 1}, "c": [true]}` yields `a.b = 1` and `c.0 = true`.
    pub fn from_json(value: &JsonValue, prefix: &str) -> Self {
        let mut out = Self::new();
        out.flatten(value, prefix);
        out
    }

    fn flatten(&mut self, value: &JsonValue, prefix: &str) {
        let child_key = |key: &str| {
            if prefix.is_empty() {
                key.to_string()
            } else {
                format!("{}.{}", prefix, key)
            }
        };
        match value {
            JsonValue::Object(map) => {
                for (key, child) in map {
                    self.flatten(child, &child_key(key));
                }
            }
            JsonValue::Array(items) => {
                for (idx, child) in items.iter().enumerate() {
                    self.flatten(child, &child_key(&idx.to_string()));
                }
            }
            JsonValue::String(s) => self.insert(prefix, s.clone()),
            JsonValue::Null => self.insert(prefix, String::new()),
            other => self.insert(prefix, other.to_string()),
        }
    }

    /// Replace each known `{key}` once, scanning left to right.
    pub fn expand(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            match after.find(['{', '}']) {
                Some(end) if after.as_bytes()[end] == b'}' => {
                    let key = &after[..end];
                    match self.values.get(key) {
                        Some(value) => out.push_str(value),
                        None => {
                            out.push('{');
                            out.push_str(key);
                            out.push('}');
                        }
                    }
                    rest = &after[end + 1..];
                }
                _ => {
                    out.push('{');
                    rest = after;
                }
            }
        }

        out.push_str(rest);
        out
    }
}

/// Slug of a client name: lower-case, alphanumerics and `_` kept, every other
/// run of characters collapsed into one `-`, trimmed of `-`.
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.to_lowercase().chars() {
        if c.is_alphanumeric() || c == '_' {
            out.push(c);
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}

/// Short non-cryptographic token for `{rand}`: base64 of two random bytes,
/// `+ / =` mapped to `z`, lower-cased.
pub fn random_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 2] = rng.random();
    general_purpose::STANDARD
        .encode(bytes)
        .chars()
        .map(|c| match c {
            '+' | '/' | '=' => 'z',
            other => other,
        })
        .collect::<String>()
        .to_lowercase()
}

fn check_segment(field: &'static str, value: &str) -> Result<(), NamingError> {
    let trimmed = value.trim();
    if trimmed.is_empty()
        || trimmed.contains('/')
        || trimmed.contains('\\')
        || trimmed.contains("..")
    {
        return Err(NamingError::InvalidSegment {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Expands paths and filenames for one destination
#[derive(Debug, Clone, Copy)]
pub struct NameTemplater {
    strategy: NamingStrategy,
}

impl NameTemplater {
    pub fn new(strategy: NamingStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> NamingStrategy {
        self.strategy
    }

    /// Storage directory of a placement: lower-cased `list/class/parent/`
    pub fn compose_path(&self, placement: &Placement) -> Result<String, NamingError> {
        check_segment("list", &placement.list)?;
        check_segment("class", &placement.class)?;
        Ok(format!(
            "{}/{}/{}/",
            placement.list.trim(),
            placement.class.trim(),
            placement.parent
        )
        .to_lowercase())
    }

    /// Value of one token for the given input
    pub fn resolve(&self, token: Token, input: &NamingInput<'_>) -> String {
        match token {
            Token::Name => match self.strategy {
                NamingStrategy::Hash => input.hash.to_string(),
                NamingStrategy::Friendly => {
                    let slug = slugify(input.base_name);
                    if slug.is_empty() {
                        input.hash.to_string()
                    } else {
                        slug
                    }
                }
            },
            Token::Id => input
                .record_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| EMPTY_ID_PLACEHOLDER.to_string()),
            Token::Class => input.placement.class.clone(),
            Token::List => input.placement.list.clone(),
            Token::Session => input.session.to_string(),
            Token::CreatedBy => input
                .created_by
                .map(|id| id.to_string())
                .unwrap_or_else(|| EMPTY_ID_PLACEHOLDER.to_string()),
            Token::Source => input.placement.source.to_string(),
            Token::Context => input.placement.context.clone(),
            Token::W => opt_to_string(&input.resize.w),
            Token::H => opt_to_string(&input.resize.h),
            Token::Q => opt_to_string(&input.resize.q),
            Token::Zc => input
                .resize
                .zc
                .map(|zc| if zc { "1" } else { "0" }.to_string())
                .unwrap_or_default(),
            Token::Bg => opt_to_string(&input.resize.bg),
            Token::Ext => input.ext.to_string(),
            Token::Rand => random_token(),
        }
    }

    /// Placeholder values for every token
    pub fn placeholders(&self, input: &NamingInput<'_>) -> Placeholders {
        let mut out = Placeholders::new();
        for token in Token::ALL {
            out.insert(token.as_str(), self.resolve(token, input));
        }
        out
    }

    /// Expand a filename template. The result is lower-cased.
    pub fn expand(&self, template: &str, input: &NamingInput<'_>) -> Result<String, NamingError> {
        if template.trim().is_empty() {
            return Err(NamingError::MissingParameter("template"));
        }
        if input.hash.is_empty() {
            return Err(NamingError::MissingParameter("hash"));
        }

        let filename = self.placeholders(input).expand(template).to_lowercase();

        if filename.trim().is_empty()
            || filename.contains('/')
            || filename.contains('\\')
            || filename.contains("..")
        {
            return Err(NamingError::InvalidFilename(filename));
        }
        Ok(filename)
    }
}
