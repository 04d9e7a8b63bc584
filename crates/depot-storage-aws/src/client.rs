use async_trait::async_trait;
use aws_sdk_dynamodb::Client as DynamoClient;
use aws_sdk_s3::Client as S3Client;
use depot_storage_core::{
    FileMetadata, FileStore, Namespace, Record, RecordStore, StorageClient, StorageError,
};

use crate::dynamo::DynamoRecords;
use crate::s3::S3Files;

/// AWS storage client: DynamoDB for records, S3 for files.
///
/// The two services are physically separate; this adapter is what keeps a
/// `(namespace, uuid)` lifecycle consistent across them, so callers never
/// coordinate the pair themselves.
#[derive(Clone)]
pub struct AwsClient {
    records: DynamoRecords,
    files: S3Files,
}

impl AwsClient {
    /// Build a client from already-configured SDK clients.
    ///
    /// Credential/endpoint resolution happens upstream (the factory); an
    /// `AwsClient` only exists once that configuration succeeded.
    pub fn new(
        dynamo: DynamoClient,
        s3: S3Client,
        records_table: String,
        files_bucket: String,
    ) -> Self {
        Self {
            records: DynamoRecords::new(dynamo, records_table),
            files: S3Files::new(s3, files_bucket),
        }
    }
}

#[async_trait]
impl RecordStore for AwsClient {
    async fn list(&self, namespace: Namespace) -> Result<Vec<Record>, StorageError> {
        self.records.list(namespace).await
    }

    async fn retrieve(
        &self,
        namespace: Namespace,
        uuid: &str,
    ) -> Result<Option<Record>, StorageError> {
        self.records.retrieve(namespace, uuid).await
    }

    async fn create(&self, namespace: Namespace, record: Record) -> Result<(), StorageError> {
        self.records.create(namespace, record).await
    }

    async fn update(
        &self,
        namespace: Namespace,
        uuid: &str,
        record: Record,
    ) -> Result<(), StorageError> {
        self.records.update(namespace, uuid, record).await
    }

    async fn remove(&self, namespace: Namespace, uuid: &str) -> Result<(), StorageError> {
        self.records.remove(namespace, uuid).await
    }
}

#[async_trait]
impl FileStore for AwsClient {
    async fn upload_file(
        &self,
        namespace: Namespace,
        uuid: &str,
        metadata: &FileMetadata,
        payload: &[u8],
    ) -> Result<(), StorageError> {
        self.files.upload_file(namespace, uuid, metadata, payload).await
    }

    async fn head_file(
        &self,
        namespace: Namespace,
        uuid: &str,
        metadata: &FileMetadata,
    ) -> Result<(), StorageError> {
        self.files.head_file(namespace, uuid, metadata).await
    }

    async fn delete_file(
        &self,
        namespace: Namespace,
        uuid: &str,
        metadata: &FileMetadata,
    ) -> Result<(), StorageError> {
        self.files.delete_file(namespace, uuid, metadata).await
    }
}

impl StorageClient for AwsClient {
    fn backend_name(&self) -> &'static str {
        "aws"
    }
}
