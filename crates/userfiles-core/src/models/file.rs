use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[cfg(feature = "sqlx")]
use sqlx::FromRow;

use super::duplicate::{DuplicateField, FieldValue};
use super::upload::Owner;

/// Persistent file record. Derivatives point at their parent via `derived_from`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(FromRow))]
pub struct StoredFile {
    pub id: Uuid,
    pub source: i64,
    pub parent: i64,
    pub class: String,
    pub list: String,
    pub context: String,
    pub derived_from: Option<Uuid>,
    pub variant: Option<String>,
    pub name: String,
    pub ext: String,
    pub mime: String,
    pub size: i64,
    pub width: i32,
    pub height: i32,
    pub hash: String,
    /// Directory part of the storage key, always ending with '/'
    pub path: String,
    pub file: String,
    pub url: String,
    pub properties: JsonValue,
    pub session: String,
    pub created_by: Option<Uuid>,
    pub owner_key: String,
    /// Uniqueness key over the configured duplicate fields and owner.
    /// `None` for derivatives.
    pub slot_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl StoredFile {
    pub fn storage_key(&self) -> String {
        format!("{}{}", self.path, self.file)
    }

    pub fn is_derivative(&self) -> bool {
        self.derived_from.is_some()
    }

    /// Value of a comparable field, used by duplicate lookups
    pub fn field_value(&self, field: DuplicateField) -> FieldValue {
        match field {
            DuplicateField::Source => FieldValue::Int(self.source),
            DuplicateField::Parent => FieldValue::Int(self.parent),
            DuplicateField::Size => FieldValue::Int(self.size),
            DuplicateField::Class => FieldValue::Text(self.class.clone()),
            DuplicateField::List => FieldValue::Text(self.list.clone()),
            DuplicateField::Hash => FieldValue::Text(self.hash.clone()),
            DuplicateField::Context => FieldValue::Text(self.context.clone()),
            DuplicateField::Path => FieldValue::Text(self.path.clone()),
            DuplicateField::File => FieldValue::Text(self.file.clone()),
            DuplicateField::Ext => FieldValue::Text(self.ext.clone()),
            DuplicateField::Mime => FieldValue::Text(self.mime.clone()),
            DuplicateField::Name => FieldValue::Text(self.name.clone()),
        }
    }
}

/// Values for a record about to be created
#[derive(Debug, Clone, PartialEq)]
pub struct NewStoredFile {
    pub source: i64,
    pub parent: i64,
    pub class: String,
    pub list: String,
    pub context: String,
    pub derived_from: Option<Uuid>,
    pub variant: Option<String>,
    pub name: String,
    pub ext: String,
    pub mime: String,
    pub size: i64,
    pub width: i32,
    pub height: i32,
    pub hash: String,
    pub path: String,
    pub file: String,
    pub url: String,
    pub properties: JsonValue,
    pub session: String,
    pub owner: Owner,
    pub slot_key: Option<String>,
}

impl NewStoredFile {
    pub fn owner_key(&self) -> String {
        self.owner.key()
    }

    pub fn created_by(&self) -> Option<Uuid> {
        self.owner.user_id()
    }

    pub fn storage_key(&self) -> String {
        format!("{}{}", self.path, self.file)
    }

    pub fn field_value(&self, field: DuplicateField) -> FieldValue {
        match field {
            DuplicateField::Source => FieldValue::Int(self.source),
            DuplicateField::Parent => FieldValue::Int(self.parent),
            DuplicateField::Size => FieldValue::Int(self.size),
            DuplicateField::Class => FieldValue::Text(self.class.clone()),
            DuplicateField::List => FieldValue::Text(self.list.clone()),
            DuplicateField::Hash => FieldValue::Text(self.hash.clone()),
            DuplicateField::Context => FieldValue::Text(self.context.clone()),
            DuplicateField::Path => FieldValue::Text(self.path.clone()),
            DuplicateField::File => FieldValue::Text(self.file.clone()),
            DuplicateField::Ext => FieldValue::Text(self.ext.clone()),
            DuplicateField::Mime => FieldValue::Text(self.mime.clone()),
            DuplicateField::Name => FieldValue::Text(self.name.clone()),
        }
    }

    /// Materialize into a record with the given identity and timestamp
    pub fn into_record(self, id: Uuid, now: DateTime<Utc>) -> StoredFile {
        let owner_key = self.owner_key();
        let created_by = self.created_by();
        StoredFile {
            id,
            source: self.source,
            parent: self.parent,
            class: self.class,
            list: self.list,
            context: self.context,
            derived_from: self.derived_from,
            variant: self.variant,
            name: self.name,
            ext: self.ext,
            mime: self.mime,
            size: self.size,
            width: self.width,
            height: self.height,
            hash: self.hash,
            path: self.path,
            file: self.file,
            url: self.url,
            properties: self.properties,
            session: self.session,
            created_by,
            owner_key,
            slot_key: self.slot_key,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

/// New content for an existing record (crop / replace)
#[derive(Debug, Clone, PartialEq)]
pub struct ContentUpdate {
    pub name: String,
    pub ext: String,
    pub mime: String,
    pub size: i64,
    pub width: i32,
    pub height: i32,
    pub hash: String,
    pub path: String,
    pub file: String,
    pub url: String,
    pub properties: JsonValue,
    pub slot_key: Option<String>,
}

impl ContentUpdate {
    pub fn apply(self, record: &mut StoredFile, now: DateTime<Utc>) {
        record.name = self.name;
        record.ext = self.ext;
        record.mime = self.mime;
        record.size = self.size;
        record.width = self.width;
        record.height = self.height;
        record.hash = self.hash;
        record.path = self.path;
        record.file = self.file;
        record.url = self.url;
        record.properties = self.properties;
        record.slot_key = self.slot_key;
        record.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_file(owner: Owner) -> NewStoredFile {
        NewStoredFile {
            source: 1,
            parent: 0,
            class: "modResource".to_string(),
            list: "default".to_string(),
            context: "web".to_string(),
            derived_from: None,
            variant: None,
            name: "notes".to_string(),
            ext: "txt".to_string(),
            mime: "text/plain".to_string(),
            size: 10,
            width: 0,
            height: 0,
            hash: "abc".to_string(),
            path: "default/modresource/0/".to_string(),
            file: "abc.txt".to_string(),
            url: "http://localhost/default/modresource/0/abc.txt".to_string(),
            properties: serde_json::json!({"w": 0, "h": 0, "f": "txt"}),
            session: "s1".to_string(),
            owner,
            slot_key: Some("k1".to_string()),
        }
    }

    #[test]
    fn test_into_record_carries_owner() {
        let user = Uuid::new_v4();
        let record = new_file(Owner::User(user)).into_record(Uuid::new_v4(), Utc::now());
        assert_eq!(record.created_by, Some(user));
        assert_eq!(record.owner_key, format!("user:{}", user));
        assert_eq!(record.storage_key(), "default/modresource/0/abc.txt");
        assert!(!record.is_derivative());
        assert_eq!(record.slot_key.as_deref(), Some("k1"));

        let anon = new_file(Owner::Anonymous("s1".to_string()))
            .into_record(Uuid::new_v4(), Utc::now());
        assert_eq!(anon.created_by, None);
        assert_eq!(anon.owner_key, "session:s1");
    }

    #[test]
    fn test_field_value() {
        let record = new_file(Owner::Anonymous("s".to_string()))
            .into_record(Uuid::new_v4(), Utc::now());
        assert_eq!(record.field_value(DuplicateField::Parent), FieldValue::Int(0));
        assert_eq!(
            record.field_value(DuplicateField::Hash),
            FieldValue::Text("abc".to_string())
        );
    }
}
