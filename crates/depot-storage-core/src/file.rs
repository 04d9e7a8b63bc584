use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Storage tier for a binary object.
///
/// Backends map tiers to different physical treatment: `Preview` objects
/// sit on the hot path (inline/cached), `Archive` objects take the cheaper
/// long-term placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileStorage {
    Preview,
    Archive,
}

impl Default for FileStorage {
    fn default() -> Self {
        Self::Preview
    }
}

impl FileStorage {
    /// The tier's key-prefix form, used by path/key layouts.
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStorage::Preview => "preview",
            FileStorage::Archive => "archive",
        }
    }
}

/// Descriptor attached to a binary object.
///
/// Stored together with the payload as one lifecycle unit: after a
/// successful upload, `head_file` must report `size`/`mime` consistent
/// with this descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Display name.
    pub filename: String,
    /// Byte length of the payload.
    pub size: u64,
    /// Content type.
    pub mime: String,
    /// Storage tier.
    pub storage: FileStorage,
    /// Whether the object is accessible without authorization.
    pub public: bool,
    /// ISO-8601 timestamp; empty means "unset" until the backend assigns one.
    #[serde(default)]
    pub date: String,
    /// Open-ended, unordered key/value tags.
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl FileMetadata {
    /// Pre-flight validation, run before any network call.
    pub fn validate(&self) -> Result<(), StorageError> {
        if self.filename.is_empty() {
            return Err(StorageError::Validation("filename must not be empty".into()));
        }
        if self.mime.is_empty() {
            return Err(StorageError::Validation("mime must not be empty".into()));
        }
        if !self.date.is_empty() && chrono::DateTime::parse_from_rfc3339(&self.date).is_err() {
            return Err(StorageError::Validation(format!(
                "date is not a valid ISO-8601 timestamp: {}",
                self.date
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> FileMetadata {
        FileMetadata {
            filename: "filename".to_string(),
            size: 1024,
            mime: "application/javascript".to_string(),
            storage: FileStorage::Preview,
            public: false,
            date: String::new(),
            tags: HashMap::new(),
        }
    }

    #[test]
    fn test_valid_metadata() {
        assert!(metadata().validate().is_ok());
    }

    #[test]
    fn test_empty_date_is_unset() {
        let meta = metadata();
        assert!(meta.date.is_empty());
        assert!(meta.validate().is_ok());
    }

    #[test]
    fn test_bad_date_rejected() {
        let meta = FileMetadata {
            date: "yesterday".to_string(),
            ..metadata()
        };
        assert!(matches!(
            meta.validate(),
            Err(StorageError::Validation(_))
        ));
    }

    #[test]
    fn test_empty_filename_rejected() {
        let meta = FileMetadata {
            filename: String::new(),
            ..metadata()
        };
        assert!(meta.validate().is_err());
    }

    #[test]
    fn test_tier_serde_form() {
        let json = serde_json::to_string(&FileStorage::Preview).unwrap();
        assert_eq!(json, "\"PREVIEW\"");
        assert_eq!(FileStorage::Preview.as_str(), "preview");
    }
}
