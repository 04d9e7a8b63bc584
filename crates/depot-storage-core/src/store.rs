use async_trait::async_trait;

use crate::error::StorageError;
use crate::file::FileMetadata;
use crate::namespace::Namespace;
use crate::record::Record;

/// CRUD + listing over structured records, scoped by namespace.
///
/// Semantics every backend must satisfy:
/// - absence is a value, not an error: `list` on an empty namespace is
///   `Ok(vec![])` and `retrieve` of a missing key is `Ok(None)`;
/// - `create` rejects an existing key with `StorageError::Conflict`;
/// - `update` fully replaces the stored record and fails with
///   `StorageError::NotFound` when the key is absent;
/// - `remove` is idempotent.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Return all records in the namespace, a single snapshot read.
    ///
    /// No ordering is promised between records. Adapters drain provider
    /// pagination internally; callers always see the full snapshot.
    async fn list(&self, namespace: Namespace) -> Result<Vec<Record>, StorageError>;

    /// Return the record at `uuid`, or `None` if absent.
    async fn retrieve(
        &self,
        namespace: Namespace,
        uuid: &str,
    ) -> Result<Option<Record>, StorageError>;

    /// Insert a new record. Every field supplied comes back verbatim from
    /// a subsequent `retrieve`.
    async fn create(&self, namespace: Namespace, record: Record) -> Result<(), StorageError>;

    /// Fully replace the record at `uuid`. Update is not create.
    async fn update(
        &self,
        namespace: Namespace,
        uuid: &str,
        record: Record,
    ) -> Result<(), StorageError>;

    /// Delete the record at `uuid`; removing an absent key is not an error.
    async fn remove(&self, namespace: Namespace, uuid: &str) -> Result<(), StorageError>;
}

/// Binary object lifecycle, scoped by `(namespace, uuid)`.
///
/// Payload and descriptor are one lifecycle unit: an adapter keeps them
/// consistent even when its object store and metadata table are physically
/// separate services.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Store the payload and its metadata atomically, placed by
    /// `metadata.storage` tier. Overwrites any existing file at the key.
    async fn upload_file(
        &self,
        namespace: Namespace,
        uuid: &str,
        metadata: &FileMetadata,
        payload: &[u8],
    ) -> Result<(), StorageError>;

    /// Verify the object exists and its reported size/type are consistent
    /// with `metadata`. A lightweight post-upload integrity check that
    /// avoids re-downloading the payload.
    async fn head_file(
        &self,
        namespace: Namespace,
        uuid: &str,
        metadata: &FileMetadata,
    ) -> Result<(), StorageError>;

    /// Remove the object and its metadata. Idempotent.
    async fn delete_file(
        &self,
        namespace: Namespace,
        uuid: &str,
        metadata: &FileMetadata,
    ) -> Result<(), StorageError>;
}

/// The full capability set a backend adapter provides.
///
/// Selection between adapters is an explicit factory decision keyed by
/// configuration; callers hold a `dyn StorageClient` and never inspect
/// the concrete backend.
pub trait StorageClient: RecordStore + FileStore {
    /// Short identifier for logs and diagnostics.
    fn backend_name(&self) -> &'static str;
}
