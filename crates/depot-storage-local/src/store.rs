use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use depot_storage_core::{
    FileMetadata, FileStore, Namespace, Record, RecordStore, StorageClient, StorageError,
};
use tokio::fs;
use tracing::{debug, instrument, warn};

/// Filesystem-backed storage client.
///
/// Layout under the root directory:
/// ```text
/// {root}/
///   {namespace}/
///     records/
///       {uuid}.json                  # Record document
///     files/
///       {tier}/
///         data/
///           {uuid}                   # Binary payload
///         meta/
///           {uuid}.json              # FileMetadata descriptor
/// ```
///
/// Payloads and descriptors live in separate directories so a payload whose
/// uuid happens to end in `.json` can never shadow another key's descriptor.
///
/// All writes go through a temp file + rename so a crash never leaves a
/// half-written document behind.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Create a store rooted at `root`. The directory tree is created
    /// lazily on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn records_dir(&self, namespace: Namespace) -> PathBuf {
        self.root.join(namespace.as_str()).join("records")
    }

    fn record_path(&self, namespace: Namespace, uuid: &str) -> PathBuf {
        self.records_dir(namespace).join(format!("{}.json", uuid))
    }

    fn tier_dir(&self, namespace: Namespace, metadata: &FileMetadata) -> PathBuf {
        self.root
            .join(namespace.as_str())
            .join("files")
            .join(metadata.storage.as_str())
    }

    fn file_path(&self, namespace: Namespace, uuid: &str, metadata: &FileMetadata) -> PathBuf {
        self.tier_dir(namespace, metadata).join("data").join(uuid)
    }

    fn meta_path(&self, namespace: Namespace, uuid: &str, metadata: &FileMetadata) -> PathBuf {
        self.tier_dir(namespace, metadata)
            .join("meta")
            .join(format!("{}.json", uuid))
    }

    /// Write `data` atomically via a temp file in the target directory.
    async fn write_atomic(path: &Path, data: &[u8]) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                StorageError::Transport(format!(
                    "failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        // Append the suffix rather than swap the extension: `a.b` and `a.c`
        // must not share a temp file.
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                StorageError::Validation(format!("unusable path {}", path.display()))
            })?;
        let temp_path = path.with_file_name(format!("{}.tmp", file_name));
        fs::write(&temp_path, data).await.map_err(|e| {
            StorageError::Transport(format!(
                "failed to write temp file {}: {}",
                temp_path.display(),
                e
            ))
        })?;

        fs::rename(&temp_path, path).await.map_err(|e| {
            StorageError::Transport(format!(
                "failed to rename temp file to {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Read a file, mapping "does not exist" to `None`.
    async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, StorageError> {
        match fs::read(path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Transport(format!(
                "failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Remove a file, treating "does not exist" as success.
    async fn remove_if_present(path: &Path) -> Result<(), StorageError> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Transport(format!(
                "failed to remove {}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn parse_record(data: &[u8], path: &Path) -> Result<Record, StorageError> {
        serde_json::from_slice(data).map_err(|e| {
            StorageError::Serialization(format!("failed to parse {}: {}", path.display(), e))
        })
    }
}

#[async_trait]
impl RecordStore for LocalStore {
    #[instrument(skip(self), level = "debug")]
    async fn list(&self, namespace: Namespace) -> Result<Vec<Record>, StorageError> {
        let dir = self.records_dir(namespace);

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => {
                return Err(StorageError::Transport(format!(
                    "failed to list {}: {}",
                    dir.display(),
                    e
                )))
            }
        };

        let mut records = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            StorageError::Transport(format!("failed to list {}: {}", dir.display(), e))
        })? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            match Self::read_optional(&path).await? {
                Some(data) => records.push(Self::parse_record(&data, &path)?),
                // Deleted between read_dir and read; a later snapshot.
                None => continue,
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
        let path = self.record_path(namespace, uuid);
        match Self::read_optional(&path).await? {
            Some(data) => Ok(Some(Self::parse_record(&data, &path)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, record), level = "debug", fields(uuid = %record.uuid))]
    async fn create(&self, namespace: Namespace, record: Record) -> Result<(), StorageError> {
        let path = self.record_path(namespace, &record.uuid);

        if Self::read_optional(&path).await?.is_some() {
            return Err(StorageError::conflict(namespace.as_str(), &record.uuid));
        }

        let json = serde_json::to_vec(&record)
            .map_err(|e| StorageError::Serialization(format!("failed to serialize record: {}", e)))?;
        Self::write_atomic(&path, &json).await?;

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
        let path = self.record_path(namespace, uuid);

        if Self::read_optional(&path).await?.is_none() {
            return Err(StorageError::not_found(namespace.as_str(), uuid));
        }

        let json = serde_json::to_vec(&record)
            .map_err(|e| StorageError::Serialization(format!("failed to serialize record: {}", e)))?;
        Self::write_atomic(&path, &json).await?;

        debug!("Updated record {}/{}", namespace, uuid);
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn remove(&self, namespace: Namespace, uuid: &str) -> Result<(), StorageError> {
        let path = self.record_path(namespace, uuid);
        Self::remove_if_present(&path).await?;
        debug!("Removed record {}/{}", namespace, uuid);
        Ok(())
    }
}

#[async_trait]
impl FileStore for LocalStore {
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

        let mut stored = metadata.clone();
        if stored.date.is_empty() {
            stored.date = chrono::Utc::now().to_rfc3339();
        }

        let descriptor = serde_json::to_vec(&stored).map_err(|e| {
            StorageError::Serialization(format!("failed to serialize metadata: {}", e))
        })?;

        // Payload first, descriptor last: a file without a descriptor is
        // invisible to head_file, never the other way around.
        Self::write_atomic(&self.file_path(namespace, uuid, metadata), payload).await?;
        Self::write_atomic(&self.meta_path(namespace, uuid, metadata), &descriptor).await?;

        debug!(
            "Uploaded file {}/{} ({} bytes, tier {})",
            namespace,
            uuid,
            payload.len(),
            metadata.storage.as_str()
        );
        Ok(())
    }

    #[instrument(skip(self, metadata), level = "debug")]
    async fn head_file(
        &self,
        namespace: Namespace,
        uuid: &str,
        metadata: &FileMetadata,
    ) -> Result<(), StorageError> {
        let meta_path = self.meta_path(namespace, uuid, metadata);
        let data = Self::read_optional(&meta_path)
            .await?
            .ok_or_else(|| StorageError::not_found(namespace.as_str(), uuid))?;

        let stored: FileMetadata = serde_json::from_slice(&data).map_err(|e| {
            StorageError::Serialization(format!(
                "failed to parse descriptor {}: {}",
                meta_path.display(),
                e
            ))
        })?;

        if stored.size != metadata.size || stored.mime != metadata.mime {
            return Err(StorageError::Validation(format!(
                "stored descriptor for {}/{} disagrees: size {} vs {}, mime {} vs {}",
                namespace, uuid, stored.size, metadata.size, stored.mime, metadata.mime
            )));
        }

        let payload_path = self.file_path(namespace, uuid, metadata);
        match fs::metadata(&payload_path).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("Descriptor present but payload missing for {}/{}", namespace, uuid);
                Err(StorageError::not_found(namespace.as_str(), uuid))
            }
            Err(e) => Err(StorageError::Transport(format!(
                "failed to stat {}: {}",
                payload_path.display(),
                e
            ))),
        }
    }

    #[instrument(skip(self, metadata), level = "debug")]
    async fn delete_file(
        &self,
        namespace: Namespace,
        uuid: &str,
        metadata: &FileMetadata,
    ) -> Result<(), StorageError> {
        // Descriptor first: head_file stops confirming before the payload
        // disappears.
        Self::remove_if_present(&self.meta_path(namespace, uuid, metadata)).await?;
        Self::remove_if_present(&self.file_path(namespace, uuid, metadata)).await?;
        debug!("Deleted file {}/{}", namespace, uuid);
        Ok(())
    }
}

impl StorageClient for LocalStore {
    fn backend_name(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn setup() -> (LocalStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalStore::new(temp_dir.path());
        (store, temp_dir)
    }

    fn project(description: &str) -> Record {
        Record::from_value(json!({
            "uuid": "uuid1",
            "name": "Project 1",
            "description": description,
        }))
        .unwrap()
    }

    fn metadata() -> FileMetadata {
        FileMetadata {
            filename: "filename".to_string(),
            size: 1024,
            mime: "application/javascript".to_string(),
            storage: depot_storage_core::FileStorage::Preview,
            public: false,
            date: String::new(),
            tags: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_list_empty_namespace() {
        let (store, _dir) = setup();
        let items = store.list(Namespace::Projects).await.unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_retrieve_absent_is_none() {
        let (store, _dir) = setup();
        let item = store
            .retrieve(Namespace::Projects, "fake-uuid")
            .await
            .unwrap();
        assert!(item.is_none());
    }

    #[tokio::test]
    async fn test_create_and_retrieve_round_trip() {
        let (store, _dir) = setup();
        let record = project("Description");

        store
            .create(Namespace::Projects, record.clone())
            .await
            .unwrap();

        let item = store
            .retrieve(Namespace::Projects, "uuid1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item, record);
    }

    #[tokio::test]
    async fn test_create_existing_key_conflicts() {
        let (store, _dir) = setup();
        store
            .create(Namespace::Projects, project("Description"))
            .await
            .unwrap();

        let err = store
            .create(Namespace::Projects, project("Other"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_update_replaces_fully() {
        let (store, _dir) = setup();
        store
            .create(Namespace::Projects, project("Description"))
            .await
            .unwrap();

        // The replacement drops `description` entirely; no carryover.
        let replacement = Record::from_value(json!({
            "uuid": "uuid1",
            "name": "Project 1 renamed",
        }))
        .unwrap();
        store
            .update(Namespace::Projects, "uuid1", replacement.clone())
            .await
            .unwrap();

        let item = store
            .retrieve(Namespace::Projects, "uuid1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item, replacement);
        assert!(!item.fields.contains_key("description"));
    }

    #[tokio::test]
    async fn test_update_absent_is_not_found() {
        let (store, _dir) = setup();
        let err = store
            .update(Namespace::Projects, "uuid1", project("Description"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_update_mismatched_uuid_rejected() {
        let (store, _dir) = setup();
        store
            .create(Namespace::Projects, project("Description"))
            .await
            .unwrap();

        let renamed = Record::from_value(json!({
            "uuid": "uuid2",
            "name": "Project 1",
        }))
        .unwrap();
        let err = store
            .update(Namespace::Projects, "uuid1", renamed)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Validation(_)));

        // The stored document still carries its original uuid.
        let item = store
            .retrieve(Namespace::Projects, "uuid1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item.uuid, "uuid1");
        assert!(store
            .retrieve(Namespace::Projects, "uuid2")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let (store, _dir) = setup();
        store
            .create(Namespace::Projects, project("Description"))
            .await
            .unwrap();

        store.remove(Namespace::Projects, "uuid1").await.unwrap();
        store.remove(Namespace::Projects, "uuid1").await.unwrap();

        let item = store.retrieve(Namespace::Projects, "uuid1").await.unwrap();
        assert!(item.is_none());
    }

    #[tokio::test]
    async fn test_namespaces_are_disjoint() {
        let (store, _dir) = setup();
        store
            .create(Namespace::Projects, project("Description"))
            .await
            .unwrap();

        let item = store
            .retrieve(Namespace::Fragments, "uuid1")
            .await
            .unwrap();
        assert!(item.is_none());
        assert!(store.list(Namespace::Fragments).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scenario_create_update_remove() {
        let (store, _dir) = setup();
        let ns = Namespace::Projects;

        store.create(ns, project("Description")).await.unwrap();
        let item = store.retrieve(ns, "uuid1").await.unwrap().unwrap();
        assert_eq!(item, project("Description"));

        store
            .update(ns, "uuid1", project("New Description"))
            .await
            .unwrap();
        let item = store.retrieve(ns, "uuid1").await.unwrap().unwrap();
        assert_eq!(item, project("New Description"));

        store.remove(ns, "uuid1").await.unwrap();
        assert!(store.retrieve(ns, "uuid1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upload_head_delete_file() {
        let (store, _dir) = setup();
        let ns = Namespace::Fragments;
        let meta = metadata();
        let payload = b"export const answer = 42;";

        store
            .upload_file(ns, "uuid1", &meta, payload)
            .await
            .unwrap();
        store.head_file(ns, "uuid1", &meta).await.unwrap();

        store.delete_file(ns, "uuid1", &meta).await.unwrap();
        let err = store.head_file(ns, "uuid1", &meta).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));

        // Idempotent delete.
        store.delete_file(ns, "uuid1", &meta).await.unwrap();
    }

    #[tokio::test]
    async fn test_upload_assigns_date() {
        let (store, _dir) = setup();
        let ns = Namespace::Fragments;
        let meta = metadata();

        store.upload_file(ns, "uuid1", &meta, b"data").await.unwrap();

        let descriptor_path = store.meta_path(ns, "uuid1", &meta);
        let stored: FileMetadata =
            serde_json::from_slice(&std::fs::read(descriptor_path).unwrap()).unwrap();
        assert!(!stored.date.is_empty());
        assert!(chrono::DateTime::parse_from_rfc3339(&stored.date).is_ok());
    }

    #[tokio::test]
    async fn test_upload_overwrites_existing() {
        let (store, _dir) = setup();
        let ns = Namespace::Fragments;
        let meta = metadata();

        store.upload_file(ns, "uuid1", &meta, b"first").await.unwrap();
        store.upload_file(ns, "uuid1", &meta, b"second").await.unwrap();

        let payload = std::fs::read(store.file_path(ns, "uuid1", &meta)).unwrap();
        assert_eq!(payload, b"second");
    }

    #[tokio::test]
    async fn test_head_mismatched_metadata_rejected() {
        let (store, _dir) = setup();
        let ns = Namespace::Fragments;
        let meta = metadata();

        store.upload_file(ns, "uuid1", &meta, b"data").await.unwrap();

        let other = FileMetadata {
            size: 2048,
            ..metadata()
        };
        let err = store.head_file(ns, "uuid1", &other).await.unwrap_err();
        assert!(matches!(err, StorageError::Validation(_)));
    }

    #[tokio::test]
    async fn test_invalid_metadata_rejected_before_write() {
        let (store, dir) = setup();
        let meta = FileMetadata {
            mime: String::new(),
            ..metadata()
        };

        let err = store
            .upload_file(Namespace::Fragments, "uuid1", &meta, b"data")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Validation(_)));

        // Nothing was written.
        assert!(!dir.path().join("fragments").exists());
    }

    #[tokio::test]
    async fn test_json_suffixed_uuid_does_not_shadow_descriptor() {
        let (store, _dir) = setup();
        let ns = Namespace::Fragments;
        let meta = metadata();

        store.upload_file(ns, "x", &meta, b"payload of x").await.unwrap();
        store
            .upload_file(ns, "x.meta.json", &meta, b"payload of x.meta.json")
            .await
            .unwrap();

        // Both keys stay intact and addressable.
        store.head_file(ns, "x", &meta).await.unwrap();
        store.head_file(ns, "x.meta.json", &meta).await.unwrap();
        assert_eq!(
            std::fs::read(store.file_path(ns, "x", &meta)).unwrap(),
            b"payload of x"
        );
        assert_eq!(
            std::fs::read(store.file_path(ns, "x.meta.json", &meta)).unwrap(),
            b"payload of x.meta.json"
        );
    }

    #[tokio::test]
    async fn test_dotted_uuids_write_independently() {
        let (store, _dir) = setup();
        let ns = Namespace::Fragments;
        let meta = metadata();

        store.upload_file(ns, "a.b", &meta, b"first").await.unwrap();
        store.upload_file(ns, "a.c", &meta, b"second").await.unwrap();

        assert_eq!(std::fs::read(store.file_path(ns, "a.b", &meta)).unwrap(), b"first");
        assert_eq!(std::fs::read(store.file_path(ns, "a.c", &meta)).unwrap(), b"second");

        store
            .create(ns, Record::from_value(json!({ "uuid": "a.b" })).unwrap())
            .await
            .unwrap();
        store
            .create(ns, Record::from_value(json!({ "uuid": "a.c" })).unwrap())
            .await
            .unwrap();
        assert_eq!(store.list(ns).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_tiers_are_separate_paths() {
        let (store, _dir) = setup();
        let ns = Namespace::Fragments;
        let preview = metadata();
        let archive = FileMetadata {
            storage: depot_storage_core::FileStorage::Archive,
            ..metadata()
        };

        store.upload_file(ns, "uuid1", &preview, b"p").await.unwrap();
        assert_ne!(
            store.file_path(ns, "uuid1", &preview),
            store.file_path(ns, "uuid1", &archive)
        );

        // The archive tier never saw this upload.
        let err = store.head_file(ns, "uuid1", &archive).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }
}
