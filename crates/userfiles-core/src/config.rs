//! Configuration module
//!
//! Destinations ("sources") and pipeline-wide settings. The env-defined source
//! is always present; additional sources can be declared in a JSON file named
//! by `SOURCES_FILE`, using the same serde shape as [`SourceConfig`].

use std::collections::HashSet;
use std::env;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_DUPLICATE_SEARCH_FIELDS, DEFAULT_FILE_NAME_TEMPLATE, DEFAULT_SOURCE_ID,
    DEFAULT_THUMBNAIL_NAME_TEMPLATE,
};
use crate::storage_types::StorageBackend;
use crate::utils::explode_and_clean;

const DB_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_THUMBNAIL_QUALITY: u8 = 90;

/// Backend settings of a destination
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    Local {
        path: String,
        base_url: String,
    },
    S3 {
        bucket: String,
        region: String,
        #[serde(default)]
        endpoint: Option<String>,
    },
}

impl BackendConfig {
    pub fn backend(&self) -> StorageBackend {
        match self {
            BackendConfig::Local { .. } => StorageBackend::Local,
            BackendConfig::S3 { .. } => StorageBackend::S3,
        }
    }

    fn validate(&self) -> Result<(), anyhow::Error> {
        match self {
            BackendConfig::Local { path, base_url } => {
                if path.trim().is_empty() {
                    return Err(anyhow::anyhow!("local backend requires a storage path"));
                }
                if base_url.trim().is_empty() {
                    return Err(anyhow::anyhow!("local backend requires a base URL"));
                }
            }
            BackendConfig::S3 { bucket, region, .. } => {
                if bucket.trim().is_empty() {
                    return Err(anyhow::anyhow!("s3 backend requires a bucket"));
                }
                if region.trim().is_empty() {
                    return Err(anyhow::anyhow!("s3 backend requires a region"));
                }
            }
        }
        Ok(())
    }
}

/// How `{name}` is resolved in filename templates
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamingStrategy {
    /// Content hash
    #[default]
    Hash,
    /// Slug of the client-supplied base name
    Friendly,
}

impl FromStr for NamingStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hash" => Ok(NamingStrategy::Hash),
            "friendly" => Ok(NamingStrategy::Friendly),
            _ => Err(anyhow::anyhow!("Invalid naming strategy: {}", s)),
        }
    }
}

impl Display for NamingStrategy {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            NamingStrategy::Hash => write!(f, "hash"),
            NamingStrategy::Friendly => write!(f, "friendly"),
        }
    }
}

/// Size and type limits of a destination
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadPolicy {
    /// Maximum size in bytes, 0 = unlimited
    #[serde(default)]
    pub max_upload_size: u64,
    /// Allowed extensions; empty rejects everything
    #[serde(default)]
    pub allowed_file_types: Vec<String>,
}

impl UploadPolicy {
    pub fn new(max_upload_size: u64, allowed_file_types: &str) -> Self {
        Self {
            max_upload_size,
            allowed_file_types: explode_and_clean(&allowed_file_types.to_lowercase(), ','),
        }
    }

    /// Lower-case, trim and dedup the allow-list
    pub fn normalized(mut self) -> Self {
        let joined = self.allowed_file_types.join(",").to_lowercase();
        self.allowed_file_types = explode_and_clean(&joined, ',');
        self
    }
}

/// One derivative (thumbnail) to generate for image uploads
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThumbnailSpec {
    pub w: u32,
    pub h: u32,
    #[serde(default = "default_quality")]
    pub q: u8,
    /// Crop to fill the exact box instead of fitting inside it
    #[serde(default)]
    pub zc: bool,
    /// Hex background used to flatten transparency
    #[serde(default)]
    pub bg: Option<String>,
    /// Output format (jpg, png, webp)
    #[serde(default)]
    pub f: Option<String>,
}

fn default_quality() -> u8 {
    DEFAULT_THUMBNAIL_QUALITY
}

impl ThumbnailSpec {
    pub fn new(w: u32, h: u32) -> Self {
        Self {
            w,
            h,
            q: DEFAULT_THUMBNAIL_QUALITY,
            zc: false,
            bg: None,
            f: None,
        }
    }

    /// Variant label stored on derivative records
    pub fn variant(&self) -> String {
        format!("{}x{}", self.w, self.h)
    }
}

impl FromStr for ThumbnailSpec {
    type Err = anyhow::Error;

    /// Parses `w=120&h=90&q=90&zc=1&bg=ffffff&f=jpg`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut spec = ThumbnailSpec::new(0, 0);
        for pair in s.split('&').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow::anyhow!("Invalid thumbnail parameter: {}", pair))?;
            let value = value.trim();
            match key.trim() {
                "w" => spec.w = value.parse()?,
                "h" => spec.h = value.parse()?,
                "q" => spec.q = value.parse()?,
                "zc" => spec.zc = matches!(value, "1" | "true"),
                "bg" => spec.bg = Some(value.trim_start_matches('#').to_lowercase()),
                "f" => spec.f = Some(value.to_lowercase()),
                other => return Err(anyhow::anyhow!("Unknown thumbnail parameter: {}", other)),
            }
        }
        if spec.w == 0 || spec.h == 0 {
            return Err(anyhow::anyhow!("Thumbnail spec needs w and h: {}", s));
        }
        if spec.q == 0 || spec.q > 100 {
            return Err(anyhow::anyhow!("Thumbnail quality must be 1-100: {}", s));
        }
        Ok(spec)
    }
}

/// A configured destination
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    pub backend: BackendConfig,
    #[serde(default)]
    pub policy: UploadPolicy,
    #[serde(default)]
    pub naming: NamingStrategy,
    #[serde(default = "default_file_name_template")]
    pub file_name_template: String,
    #[serde(default = "default_thumbnail_name_template")]
    pub thumbnail_name_template: String,
    #[serde(default)]
    pub thumbnails: Vec<ThumbnailSpec>,
}

fn default_file_name_template() -> String {
    DEFAULT_FILE_NAME_TEMPLATE.to_string()
}

fn default_thumbnail_name_template() -> String {
    DEFAULT_THUMBNAIL_NAME_TEMPLATE.to_string()
}

impl SourceConfig {
    pub fn new(id: i64, backend: BackendConfig) -> Self {
        Self {
            id,
            name: format!("source-{}", id),
            backend,
            policy: UploadPolicy::default(),
            naming: NamingStrategy::default(),
            file_name_template: default_file_name_template(),
            thumbnail_name_template: default_thumbnail_name_template(),
            thumbnails: Vec::new(),
        }
    }
}

/// Pipeline configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub default_source_id: i64,
    pub sources: Vec<SourceConfig>,
    pub duplicate_search_fields: Vec<String>,
    pub defer_thumbnails: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup
    pub fn from_lookup<F>(var: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let default_source_id = var("DEFAULT_SOURCE_ID")
            .unwrap_or_else(|| DEFAULT_SOURCE_ID.to_string())
            .parse()
            .unwrap_or(DEFAULT_SOURCE_ID);

        let backend_kind: StorageBackend = var("STORAGE_BACKEND")
            .unwrap_or_else(|| "local".to_string())
            .parse()?;

        let backend = match backend_kind {
            StorageBackend::Local => BackendConfig::Local {
                path: var("LOCAL_STORAGE_PATH").unwrap_or_default(),
                base_url: var("LOCAL_STORAGE_BASE_URL").unwrap_or_default(),
            },
            StorageBackend::S3 => BackendConfig::S3 {
                bucket: var("S3_BUCKET").unwrap_or_default(),
                region: var("S3_REGION")
                    .or_else(|| var("AWS_REGION"))
                    .unwrap_or_default(),
                endpoint: var("S3_ENDPOINT").filter(|e| !e.trim().is_empty()),
            },
        };

        let max_upload_size = var("MAX_UPLOAD_SIZE")
            .unwrap_or_else(|| "0".to_string())
            .parse::<u64>()
            .unwrap_or(0);

        let naming = match var("IMAGE_NAME_TYPE") {
            Some(value) => value.parse()?,
            None => NamingStrategy::default(),
        };

        let thumbnails = var("THUMBNAILS")
            .map(|value| {
                explode_and_clean(&value, ';')
                    .iter()
                    .map(|spec| spec.parse::<ThumbnailSpec>())
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?
            .unwrap_or_default();

        let env_source = SourceConfig {
            id: default_source_id,
            name: "default".to_string(),
            backend,
            policy: UploadPolicy::new(
                max_upload_size,
                &var("ALLOWED_FILE_TYPES").unwrap_or_default(),
            ),
            naming,
            file_name_template: var("FILE_NAME_TEMPLATE")
                .unwrap_or_else(default_file_name_template),
            thumbnail_name_template: var("THUMBNAIL_NAME_TEMPLATE")
                .unwrap_or_else(default_thumbnail_name_template),
            thumbnails,
        };

        let mut sources = vec![env_source];
        if let Some(path) = var("SOURCES_FILE").filter(|p| !p.trim().is_empty()) {
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| anyhow::anyhow!("Failed to read SOURCES_FILE {}: {}", path, e))?;
            sources.extend(Self::parse_sources(&raw)?);
        }

        let config = Config {
            database_url: var("DATABASE_URL"),
            db_max_connections: var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|| DB_MAX_CONNECTIONS.to_string())
                .parse()
                .unwrap_or(DB_MAX_CONNECTIONS),
            default_source_id,
            sources,
            duplicate_search_fields: explode_and_clean(
                &var("DUPLICATE_SEARCH_FIELDS")
                    .unwrap_or_else(|| DEFAULT_DUPLICATE_SEARCH_FIELDS.to_string())
                    .to_lowercase(),
                ',',
            ),
            defer_thumbnails: var("DEFER_THUMBNAILS")
                .unwrap_or_else(|| "false".to_string())
                .parse()
                .unwrap_or(false),
        };

        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON array of sources, normalizing their allow-lists
    pub fn parse_sources(raw: &str) -> Result<Vec<SourceConfig>, anyhow::Error> {
        let sources: Vec<SourceConfig> = serde_json::from_str(raw)
            .map_err(|e| anyhow::anyhow!("Invalid sources file: {}", e))?;
        Ok(sources
            .into_iter()
            .map(|mut source| {
                source.policy = source.policy.normalized();
                source
            })
            .collect())
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        let mut seen = HashSet::new();
        for source in &self.sources {
            if !seen.insert(source.id) {
                return Err(anyhow::anyhow!("Duplicate source id {}", source.id));
            }
            source
                .backend
                .validate()
                .map_err(|e| anyhow::anyhow!("Source {}: {}", source.id, e))?;
            for spec in &source.thumbnails {
                if spec.w == 0 || spec.h == 0 {
                    return Err(anyhow::anyhow!(
                        "Source {}: thumbnail dimensions must be positive",
                        source.id
                    ));
                }
            }
        }

        if self.source(self.default_source_id).is_none() {
            return Err(anyhow::anyhow!(
                "DEFAULT_SOURCE_ID {} does not name a configured source",
                self.default_source_id
            ));
        }

        Ok(())
    }

    pub fn source(&self, id: i64) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.id == id)
    }
}
