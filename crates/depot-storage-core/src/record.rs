use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StorageError;

/// An arbitrary structured document stored in a namespace.
///
/// The uuid is caller-supplied, unique within its namespace, and immutable
/// once created. All other fields are open-ended JSON and round-trip
/// verbatim through every backend: what `create` stores, `retrieve` returns
/// unchanged. Updates replace the whole document; there is no partial-field
/// merge at this layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub uuid: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    /// Build a record from its uuid and open-ended fields.
    pub fn new(uuid: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            uuid: uuid.into(),
            fields,
        }
    }

    /// Parse a record out of a JSON object. Fails if `uuid` is missing
    /// or the value is not an object.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Reject a document whose embedded uuid disagrees with the addressed
    /// key. The uuid is immutable; an update must not rewrite it.
    pub fn ensure_uuid(&self, uuid: &str) -> Result<(), StorageError> {
        if self.uuid == uuid {
            Ok(())
        } else {
            Err(StorageError::Validation(format!(
                "record uuid {} does not match addressed uuid {}",
                self.uuid, uuid
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flattened_fields_round_trip() {
        let record = Record::from_value(json!({
            "uuid": "uuid1",
            "name": "Project 1",
            "description": "Description",
        }))
        .unwrap();

        assert_eq!(record.uuid, "uuid1");
        assert_eq!(record.fields["name"], json!("Project 1"));

        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(
            back,
            json!({
                "uuid": "uuid1",
                "name": "Project 1",
                "description": "Description",
            })
        );
    }

    #[test]
    fn test_ensure_uuid_rejects_mismatch() {
        let record = Record::from_value(json!({ "uuid": "uuid1" })).unwrap();
        assert!(record.ensure_uuid("uuid1").is_ok());
        assert!(matches!(
            record.ensure_uuid("uuid2"),
            Err(StorageError::Validation(_))
        ));
    }

    #[test]
    fn test_missing_uuid_rejected() {
        assert!(Record::from_value(json!({ "name": "no id" })).is_err());
    }

    #[test]
    fn test_nested_fields_survive() {
        let value = json!({
            "uuid": "uuid2",
            "tags": ["a", "b"],
            "meta": { "depth": 2, "flag": true },
        });
        let record = Record::from_value(value.clone()).unwrap();
        assert_eq!(serde_json::to_value(&record).unwrap(), value);
    }
}
