use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoClient;
use depot_storage_core::{Namespace, Record, RecordStore, StorageError};
use tracing::{debug, instrument};

/// Partition key attribute: the namespace string.
const ATTR_NAMESPACE: &str = "namespace";
/// Sort key attribute: the record uuid.
const ATTR_UUID: &str = "uuid";
/// The record document, serialized as a JSON string.
const ATTR_PAYLOAD: &str = "payload";

/// Record store over a single DynamoDB table.
///
/// One table holds every namespace; the partition key keeps the key spaces
/// disjoint. The document itself is carried opaquely as JSON in the
/// `payload` attribute, so arbitrary fields round-trip without an attribute
/// mapping.
#[derive(Clone)]
pub struct DynamoRecords {
    client: DynamoClient,
    table_name: String,
}

impl DynamoRecords {
    pub fn new(client: DynamoClient, table_name: String) -> Self {
        Self { client, table_name }
    }

    fn key(namespace: Namespace, uuid: &str) -> HashMap<String, AttributeValue> {
        HashMap::from([
            (
                ATTR_NAMESPACE.to_string(),
                AttributeValue::S(namespace.as_str().to_string()),
            ),
            (ATTR_UUID.to_string(), AttributeValue::S(uuid.to_string())),
        ])
    }

    fn item_to_record(
        item: &HashMap<String, AttributeValue>,
    ) -> Result<Record, StorageError> {
        let payload = item
            .get(ATTR_PAYLOAD)
            .and_then(|v| v.as_s().ok())
            .ok_or_else(|| {
                StorageError::Serialization("item is missing the payload attribute".to_string())
            })?;
        serde_json::from_str(payload).map_err(|e| {
            StorageError::Serialization(format!("failed to parse record payload: {}", e))
        })
    }

    fn record_to_item(
        namespace: Namespace,
        record: &Record,
    ) -> Result<HashMap<String, AttributeValue>, StorageError> {
        let payload = serde_json::to_string(record).map_err(|e| {
            StorageError::Serialization(format!("failed to serialize record: {}", e))
        })?;
        let mut item = Self::key(namespace, &record.uuid);
        item.insert(ATTR_PAYLOAD.to_string(), AttributeValue::S(payload));
        Ok(item)
    }

    /// Map a DynamoDB SDK error into the shared taxonomy. `conditional` is
    /// the error to raise when a condition expression failed.
    fn map_error<E>(
        err: aws_sdk_dynamodb::error::SdkError<E>,
        conditional: Option<StorageError>,
    ) -> StorageError
    where
        E: std::error::Error + aws_sdk_dynamodb::error::ProvideErrorMetadata + Send + Sync + 'static,
    {
        use aws_sdk_dynamodb::error::SdkError;

        if let SdkError::ServiceError(ref service) = err {
            let status = service.raw().status().as_u16();
            if status == 401 || status == 403 {
                return StorageError::Unauthorized(format!("DynamoDB rejected credentials: {}", err));
            }
            if let Some(conflict) = conditional {
                let code = aws_sdk_dynamodb::error::ProvideErrorMetadata::code(service.err());
                if code == Some("ConditionalCheckFailedException") {
                    return conflict;
                }
            }
        }

        StorageError::Transport(format!("DynamoDB error: {}", err))
    }
}

#[async_trait]
impl RecordStore for DynamoRecords {
    #[instrument(skip(self), level = "debug")]
    async fn list(&self, namespace: Namespace) -> Result<Vec<Record>, StorageError> {
        let mut records = Vec::new();
        let mut exclusive_start_key: Option<HashMap<String, AttributeValue>> = None;

        // Drain DynamoDB's native pagination into one snapshot.
        loop {
            let mut request = self
                .client
                .query()
                .table_name(&self.table_name)
                .key_condition_expression("#ns = :ns")
                .expression_attribute_names("#ns", ATTR_NAMESPACE)
                .expression_attribute_values(
                    ":ns",
                    AttributeValue::S(namespace.as_str().to_string()),
                );

            if let Some(start_key) = exclusive_start_key.take() {
                request = request.set_exclusive_start_key(Some(start_key));
            }

            let output = request
                .send()
                .await
                .map_err(|e| Self::map_error(e, None))?;

            for item in output.items.unwrap_or_default() {
                records.push(Self::item_to_record(&item)?);
            }

            match output.last_evaluated_key {
                Some(key) => exclusive_start_key = Some(key),
                None => break,
            }
        }

        debug!("Listed {} records in {}", records.len(), namespace);
        Ok(records)
    }

    #[instrument(skip(self), level = "debug")]
    async fn retrieve(
        &self,
        namespace: Namespace,
        uuid: &str,
    ) -> Result<Option<Record>, StorageError> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .set_key(Some(Self::key(namespace, uuid)))
            .send()
            .await
            .map_err(|e| Self::map_error(e, None))?;

        match output.item {
            Some(item) => Ok(Some(Self::item_to_record(&item)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, record), level = "debug", fields(uuid = %record.uuid))]
    async fn create(&self, namespace: Namespace, record: Record) -> Result<(), StorageError> {
        let item = Self::record_to_item(namespace, &record)?;

        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(#id)")
            .expression_attribute_names("#id", ATTR_UUID)
            .send()
            .await
            .map_err(|e| {
                Self::map_error(
                    e,
                    Some(StorageError::conflict(namespace.as_str(), &record.uuid)),
                )
            })?;

        debug!("Created record {}/{}", namespace, record.uuid);
        Ok(())
    }

    #[instrument(skip(self, record), level = "debug")]
    async fn update(
        &self,
        namespace: Namespace,
        uuid: &str,
        record: Record,
    ) -> Result<(), StorageError> {
        record.ensure_uuid(uuid)?;
        let item = Self::record_to_item(namespace, &record)?;

        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .condition_expression("attribute_exists(#id)")
            .expression_attribute_names("#id", ATTR_UUID)
            .send()
            .await
            .map_err(|e| {
                Self::map_error(e, Some(StorageError::not_found(namespace.as_str(), uuid)))
            })?;

        debug!("Updated record {}/{}", namespace, uuid);
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn remove(&self, namespace: Namespace, uuid: &str) -> Result<(), StorageError> {
        self.client
            .delete_item()
            .table_name(&self.table_name)
            .set_key(Some(Self::key(namespace, uuid)))
            .send()
            .await
            .map_err(|e| Self::map_error(e, None))?;

        debug!("Removed record {}/{}", namespace, uuid);
        Ok(())
    }
}
