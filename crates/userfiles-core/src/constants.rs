//! Defaults applied to placement parameters and configuration.

/// Permission an actor must hold to upload.
pub const UPLOAD_PERMISSION: &str = "userfiles_file_upload";

pub const DEFAULT_PARENT: i64 = 0;
pub const DEFAULT_CLASS: &str = "modResource";
pub const DEFAULT_LIST: &str = "default";
pub const DEFAULT_CONTEXT: &str = "web";
pub const DEFAULT_SOURCE_ID: i64 = 1;

pub const DEFAULT_FILE_NAME_TEMPLATE: &str = "{name}.{ext}";
pub const DEFAULT_THUMBNAIL_NAME_TEMPLATE: &str = "{name}.{w}x{h}.{ext}";
pub const DEFAULT_DUPLICATE_SEARCH_FIELDS: &str = "parent,class,list,hash,source";

/// Value substituted for `{createdby}` and `{id}` when there is nothing to reference.
pub const EMPTY_ID_PLACEHOLDER: &str = "0";

/// Success message key of the response envelope.
pub const MSG_FILE_UPLOADED: &str = "userfiles_file_uploaded";
