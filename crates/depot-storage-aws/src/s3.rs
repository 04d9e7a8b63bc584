use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::Client as S3Client;
use depot_storage_core::{FileMetadata, FileStore, Namespace, StorageError};
use tracing::{debug, instrument, warn};

/// Maximum retries for transient errors (429 / 5xx).
const MAX_RETRIES: u32 = 5;
/// Base delay for exponential backoff.
const BASE_DELAY_MS: u64 = 200;

/// User-metadata key carrying the display filename.
const META_FILENAME: &str = "filename";
/// User-metadata key carrying the declared byte size.
const META_SIZE: &str = "declared-size";
/// User-metadata key carrying the upload timestamp.
const META_DATE: &str = "date";
/// User-metadata key carrying the open-ended tags as JSON.
const META_TAGS: &str = "tags";

/// File store over an S3 bucket.
///
/// Key layout:
/// ```text
/// {bucket}/
///   {namespace}/
///     {tier}/
///       {uuid}        # payload; descriptor carried as object metadata
/// ```
///
/// The descriptor travels with the object: mime as Content-Type, the rest
/// as user metadata, and the visibility flag as a canned ACL. `head_file`
/// is a HeadObject round trip, never a payload download.
#[derive(Clone)]
pub struct S3Files {
    client: S3Client,
    bucket_name: String,
}

impl S3Files {
    pub fn new(client: S3Client, bucket_name: String) -> Self {
        Self {
            client,
            bucket_name,
        }
    }

    /// The S3 key for a file, placed by storage tier.
    fn object_key(namespace: Namespace, uuid: &str, metadata: &FileMetadata) -> String {
        format!("{}/{}/{}", namespace, metadata.storage.as_str(), uuid)
    }

    /// Sleep with exponential backoff + jitter.
    async fn backoff_sleep(attempt: u32) {
        let base = Duration::from_millis(BASE_DELAY_MS * 2u64.pow(attempt));
        let jitter = Duration::from_millis(rand_jitter());
        tokio::time::sleep(base + jitter).await;
    }

    /// Check if an S3 error is retryable (429 or 5xx).
    fn is_retryable_s3_error(err: &aws_sdk_s3::error::SdkError<impl std::fmt::Debug>) -> bool {
        use aws_sdk_s3::error::SdkError;
        match err {
            SdkError::ServiceError(e) => {
                let status = e.raw().status().as_u16();
                status == 429 || (500..=504).contains(&status)
            }
            SdkError::ResponseError(e) => {
                let status = e.raw().status().as_u16();
                status == 429 || (500..=504).contains(&status)
            }
            SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => true,
            _ => false,
        }
    }

    /// Check if an S3 error is a credentials problem (401/403).
    fn is_unauthorized(err: &aws_sdk_s3::error::SdkError<impl std::fmt::Debug>) -> bool {
        use aws_sdk_s3::error::SdkError;
        match err {
            SdkError::ServiceError(e) => {
                let status = e.raw().status().as_u16();
                status == 401 || status == 403
            }
            _ => false,
        }
    }
}

#[async_trait]
impl FileStore for S3Files {
    #[instrument(
        skip(self, metadata, payload),
        level = "debug",
        fields(payload_len = payload.len())
    )]
    async fn upload_file(
        &self,
        namespace: Namespace,
        uuid: &str,
        metadata: &FileMetadata,
        payload: &[u8],
    ) -> Result<(), StorageError> {
        metadata.validate()?;

        let key = Self::object_key(namespace, uuid, metadata);
        let date = if metadata.date.is_empty() {
            chrono::Utc::now().to_rfc3339()
        } else {
            metadata.date.clone()
        };
        let tags_json = serde_json::to_string(&metadata.tags).map_err(|e| {
            StorageError::Serialization(format!("failed to serialize tags: {}", e))
        })?;

        for attempt in 0..=MAX_RETRIES {
            let mut request = self
                .client
                .put_object()
                .bucket(&self.bucket_name)
                .key(&key)
                .content_type(&metadata.mime)
                .metadata(META_FILENAME, &metadata.filename)
                .metadata(META_SIZE, metadata.size.to_string())
                .metadata(META_DATE, &date)
                .metadata(META_TAGS, &tags_json)
                .body(ByteStream::from(payload.to_vec()));

            if metadata.public {
                request = request.acl(ObjectCannedAcl::PublicRead);
            }

            match request.send().await {
                Ok(_) => {
                    debug!(
                        "Uploaded {} ({} bytes, tier {})",
                        key,
                        payload.len(),
                        metadata.storage.as_str()
                    );
                    return Ok(());
                }
                Err(e) => {
                    if Self::is_retryable_s3_error(&e) && attempt < MAX_RETRIES {
                        warn!(attempt, key, "S3 put_object retryable error, retrying");
                        Self::backoff_sleep(attempt).await;
                        continue;
                    }
                    if Self::is_unauthorized(&e) {
                        return Err(StorageError::Unauthorized(format!(
                            "S3 rejected credentials: {}",
                            e
                        )));
                    }
                    return Err(StorageError::Transport(format!("S3 put_object error: {}", e)));
                }
            }
        }
        unreachable!()
    }

    #[instrument(skip(self, metadata), level = "debug")]
    async fn head_file(
        &self,
        namespace: Namespace,
        uuid: &str,
        metadata: &FileMetadata,
    ) -> Result<(), StorageError> {
        let key = Self::object_key(namespace, uuid, metadata);

        for attempt in 0..=MAX_RETRIES {
            let result = self
                .client
                .head_object()
                .bucket(&self.bucket_name)
                .key(&key)
                .send()
                .await;

            match result {
                Ok(output) => {
                    let stored_mime = output.content_type.as_deref().unwrap_or_default();
                    let user_metadata: HashMap<String, String> =
                        output.metadata.unwrap_or_default();
                    let stored_size = user_metadata
                        .get(META_SIZE)
                        .and_then(|s| s.parse::<u64>().ok());

                    if stored_mime != metadata.mime {
                        return Err(StorageError::Validation(format!(
                            "stored object {} disagrees on mime: {} vs {}",
                            key, stored_mime, metadata.mime
                        )));
                    }
                    if stored_size != Some(metadata.size) {
                        return Err(StorageError::Validation(format!(
                            "stored object {} disagrees on size: {:?} vs {}",
                            key, stored_size, metadata.size
                        )));
                    }
                    return Ok(());
                }
                Err(e) => {
                    if Self::is_retryable_s3_error(&e) && attempt < MAX_RETRIES {
                        warn!(attempt, key, "S3 head_object retryable error, retrying");
                        Self::backoff_sleep(attempt).await;
                        continue;
                    }
                    if Self::is_unauthorized(&e) {
                        return Err(StorageError::Unauthorized(format!(
                            "S3 rejected credentials: {}",
                            e
                        )));
                    }
                    let service_error = e.into_service_error();
                    if service_error.is_not_found() {
                        return Err(StorageError::not_found(namespace.as_str(), uuid));
                    }
                    return Err(StorageError::Transport(format!(
                        "S3 head_object error: {}",
                        service_error
                    )));
                }
            }
        }
        unreachable!()
    }

    #[instrument(skip(self, metadata), level = "debug")]
    async fn delete_file(
        &self,
        namespace: Namespace,
        uuid: &str,
        metadata: &FileMetadata,
    ) -> Result<(), StorageError> {
        let key = Self::object_key(namespace, uuid, metadata);

        for attempt in 0..=MAX_RETRIES {
            let result = self
                .client
                .delete_object()
                .bucket(&self.bucket_name)
                .key(&key)
                .send()
                .await;

            match result {
                // S3 delete succeeds for absent keys, which is exactly the
                // idempotence the contract asks for.
                Ok(_) => {
                    debug!("Deleted {}", key);
                    return Ok(());
                }
                Err(e) => {
                    if Self::is_retryable_s3_error(&e) && attempt < MAX_RETRIES {
                        warn!(attempt, key, "S3 delete_object retryable error, retrying");
                        Self::backoff_sleep(attempt).await;
                        continue;
                    }
                    if Self::is_unauthorized(&e) {
                        return Err(StorageError::Unauthorized(format!(
                            "S3 rejected credentials: {}",
                            e
                        )));
                    }
                    return Err(StorageError::Transport(format!(
                        "S3 delete_object error: {}",
                        e
                    )));
                }
            }
        }
        unreachable!()
    }
}

/// Simple jitter: random-ish value 0..50ms using timestamp nanos.
fn rand_jitter() -> u64 {
    use std::time::SystemTime;
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64 % 50)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_storage_core::FileStorage;

    fn metadata(storage: FileStorage) -> FileMetadata {
        FileMetadata {
            filename: "filename".to_string(),
            size: 1024,
            mime: "application/javascript".to_string(),
            storage,
            public: false,
            date: String::new(),
            tags: HashMap::new(),
        }
    }

    #[test]
    fn test_object_key_places_by_tier() {
        let preview = metadata(FileStorage::Preview);
        let archive = metadata(FileStorage::Archive);

        assert_eq!(
            S3Files::object_key(Namespace::Fragments, "uuid1", &preview),
            "fragments/preview/uuid1"
        );
        assert_eq!(
            S3Files::object_key(Namespace::Fragments, "uuid1", &archive),
            "fragments/archive/uuid1"
        );
    }

    #[test]
    fn test_object_key_separates_namespaces() {
        let meta = metadata(FileStorage::Preview);
        assert_ne!(
            S3Files::object_key(Namespace::Projects, "uuid1", &meta),
            S3Files::object_key(Namespace::Fragments, "uuid1", &meta)
        );
    }
}
