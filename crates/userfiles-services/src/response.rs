//! Response envelope handed back to the request layer

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use userfiles_core::constants::MSG_FILE_UPLOADED;
use userfiles_core::models::StoredFile;
use userfiles_core::{ErrorMetadata, UploadError};
use userfiles_processing::Placeholders;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    /// Message key, never raw backend text
    pub message: String,
    pub data: JsonValue,
    /// Flattened values for localizing `message`
    #[serde(default)]
    pub placeholders: BTreeMap<String, String>,
}

impl UploadResponse {
    pub fn success(record: &StoredFile, derivatives: &[StoredFile]) -> Self {
        let derivatives: Vec<JsonValue> = derivatives
            .iter()
            .map(|d| {
                serde_json::json!({
                    "id": d.id,
                    "variant": d.variant,
                    "url": d.url,
                })
            })
            .collect();

        let data = serde_json::json!({
            "id": record.id,
            "url": record.url,
            "file": record.file,
            "path": record.path,
            "hash": record.hash,
            "size": record.size,
            "mime": record.mime,
            "ext": record.ext,
            "width": record.width,
            "height": record.height,
            "source": record.source,
            "derivatives": derivatives,
        });
        let placeholders = Placeholders::from_json(&data, "").into_map();

        Self {
            success: true,
            message: MSG_FILE_UPLOADED.to_string(),
            data,
            placeholders,
        }
    }

    pub fn failure(error: &UploadError) -> Self {
        Self {
            success: false,
            message: error.message_key().to_string(),
            data: JsonValue::Object(Default::default()),
            placeholders: error.placeholders(),
        }
    }
}
