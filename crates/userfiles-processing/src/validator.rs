use userfiles_core::models::UploadCandidate;
use userfiles_core::{explode_and_clean, UploadPolicy};

/// Policy violations, evaluated size first
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("File too large: {size} bytes (max: {max} bytes)")]
    FileTooLarge { size: u64, max: u64 },

    #[error("Invalid file extension: '{extension}' (allowed: {allowed:?})")]
    InvalidExtension {
        extension: String,
        allowed: Vec<String>,
    },
}

/// Destination policy validator
///
/// Pure: no I/O and no side effects. An empty allow-list rejects every
/// extension; a maximum size of 0 means unlimited.
#[derive(Debug, Clone)]
pub struct PolicyValidator {
    max_upload_size: u64,
    allowed_file_types: Vec<String>,
}

impl PolicyValidator {
    pub fn new(max_upload_size: u64, allowed_file_types: Vec<String>) -> Self {
        let joined = allowed_file_types.join(",").to_lowercase();
        Self {
            max_upload_size,
            allowed_file_types: explode_and_clean(&joined, ','),
        }
    }

    pub fn from_policy(policy: &UploadPolicy) -> Self {
        Self::new(policy.max_upload_size, policy.allowed_file_types.clone())
    }

    /// Validate file size
    pub fn validate_file_size(&self, size: u64) -> Result<(), ValidationError> {
        if self.max_upload_size > 0 && size > self.max_upload_size {
            return Err(ValidationError::FileTooLarge {
                size,
                max: self.max_upload_size,
            });
        }
        Ok(())
    }

    /// Validate file extension (case-insensitive)
    pub fn validate_extension(&self, extension: &str) -> Result<(), ValidationError> {
        let extension = extension.trim().to_lowercase();
        if extension.is_empty() || !self.allowed_file_types.contains(&extension) {
            return Err(ValidationError::InvalidExtension {
                extension,
                allowed: self.allowed_file_types.clone(),
            });
        }
        Ok(())
    }

    pub fn validate_all(&self, candidate: &UploadCandidate) -> Result<(), ValidationError> {
        self.validate_file_size(candidate.size)?;
        self.validate_extension(&candidate.ext)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn test_validator() -> PolicyValidator {
        PolicyValidator::new(
            1024,
            vec!["JPG".to_string(), " png ".to_string(), "txt".to_string(), "jpg".to_string()],
        )
    }

    fn candidate(size: u64, ext: &str) -> UploadCandidate {
        UploadCandidate {
            temp_path: PathBuf::from("/tmp/upload"),
            size,
            mime: "text/plain".to_string(),
            ext: ext.to_string(),
            name: "file".to_string(),
            width: 0,
            height: 0,
            hash: "h".to_string(),
            properties: serde_json::json!({}),
        }
    }

    #[test]
    fn test_validate_file_size_boundary() {
        let validator = test_validator();
        assert!(validator.validate_file_size(1024).is_ok());
        assert_eq!(
            validator.validate_file_size(1025),
            Err(ValidationError::FileTooLarge {
                size: 1025,
                max: 1024
            })
        );
    }

    #[test]
    fn test_validate_file_size_unlimited() {
        let validator = PolicyValidator::new(0, vec!["txt".to_string()]);
        assert!(validator.validate_file_size(u64::MAX).is_ok());
    }

    #[test]
    fn test_validate_extension_case_insensitive() {
        let validator = test_validator();
        assert!(validator.validate_extension("jpg").is_ok());
        assert!(validator.validate_extension("PNG").is_ok());
        assert!(validator.validate_extension("exe").is_err());
        assert!(validator.validate_extension("").is_err());
    }

    #[test]
    fn test_empty_allow_list_rejects_all() {
        let validator = PolicyValidator::new(0, Vec::new());
        assert!(validator.validate_extension("txt").is_err());
    }

    #[test]
    fn test_validate_all_checks_size_first() {
        let validator = test_validator();
        assert!(validator.validate_all(&candidate(10, "txt")).is_ok());
        assert!(matches!(
            validator.validate_all(&candidate(2048, "exe")),
            Err(ValidationError::FileTooLarge { .. })
        ));
        assert!(matches!(
            validator.validate_all(&candidate(10, "exe")),
            Err(ValidationError::InvalidExtension { .. })
        ));
    }
}
