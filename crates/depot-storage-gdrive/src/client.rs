use async_trait::async_trait;
use dashmap::DashMap;
use depot_storage_core::{
    FileMetadata, FileStore, Namespace, Record, RecordStore, StorageClient, StorageError,
};
use tracing::{debug, instrument};

use crate::api::{escape_query, DriveApi, DriveFile, FOLDER_MIME};
use crate::token::TokenManager;

/// appProperties keys used to address items independently of Drive ids.
const PROP_UUID: &str = "depot-uuid";
const PROP_KIND: &str = "depot-kind";
const PROP_TIER: &str = "depot-tier";
const PROP_SIZE: &str = "depot-size";
const PROP_DATE: &str = "depot-date";
const PROP_TAGS: &str = "depot-tags";

const KIND_RECORD: &str = "record";
const KIND_FILE: &str = "file";

/// Configuration for the Drive backend.
#[derive(Debug, Clone)]
pub struct DriveConfig {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    /// Name of the folder holding all namespace subfolders.
    pub root_folder: String,
}

/// Google Drive storage client.
///
/// Folder layout in Drive:
/// ```text
/// {root_folder}/
///   projects/        # one subfolder per namespace
///   fragments/
/// ```
///
/// Records are `application/json` files named `{uuid}.json`; binary files
/// keep their display filename. Both carry `appProperties` so lookups go
/// through `(namespace, uuid)` instead of Drive file ids. Folder ids are
/// resolved lazily and cached for the lifetime of the client.
pub struct DriveStore {
    api: DriveApi,
    tokens: TokenManager,
    root_folder: String,
    folder_ids: DashMap<String, String>,
}

impl DriveStore {
    pub fn new(config: DriveConfig) -> Self {
        Self::with_api(
            config.clone(),
            DriveApi::new(),
            TokenManager::new(config.client_id, config.client_secret, config.refresh_token),
        )
    }

    /// Construct with explicit API client and token manager (tests).
    pub fn with_api(config: DriveConfig, api: DriveApi, tokens: TokenManager) -> Self {
        Self {
            api,
            tokens,
            root_folder: config.root_folder,
            folder_ids: DashMap::new(),
        }
    }

    /// Resolve (and create if needed) a folder by name, optionally under a
    /// parent, caching the resulting id.
    async fn ensure_folder(
        &self,
        token: &str,
        name: &str,
        parent: Option<&str>,
    ) -> Result<String, StorageError> {
        let cache_key = match parent {
            Some(parent) => format!("{}/{}", parent, name),
            None => name.to_string(),
        };
        if let Some(id) = self.folder_ids.get(&cache_key) {
            return Ok(id.clone());
        }

        let mut query = format!(
            "name = '{}' and mimeType = '{}' and trashed = false",
            escape_query(name),
            FOLDER_MIME
        );
        if let Some(parent) = parent {
            query.push_str(&format!(" and '{}' in parents", escape_query(parent)));
        }

        let listing = self.api.list_files(token, &query, None).await?;
        let id = match listing.files.into_iter().next() {
            Some(folder) => folder.id,
            None => {
                debug!("Creating Drive folder {}", name);
                let mut metadata = serde_json::json!({
                    "name": name,
                    "mimeType": FOLDER_MIME,
                });
                if let Some(parent) = parent {
                    metadata["parents"] = serde_json::json!([parent]);
                }
                self.api.create_metadata(token, &metadata).await?.id
            }
        };

        self.folder_ids.insert(cache_key, id.clone());
        Ok(id)
    }

    /// Folder id for a namespace, creating the path lazily.
    async fn namespace_folder(
        &self,
        token: &str,
        namespace: Namespace,
    ) -> Result<String, StorageError> {
        let root_name = self.root_folder.clone();
        let root_id = self.ensure_folder(token, &root_name, None).await?;
        self.ensure_folder(token, namespace.as_str(), Some(&root_id))
            .await
    }

    /// Find the Drive file addressed by `(uuid, kind)` inside a folder.
    async fn find_item(
        &self,
        token: &str,
        folder_id: &str,
        uuid: &str,
        kind: &str,
        tier: Option<&str>,
    ) -> Result<Option<DriveFile>, StorageError> {
        let mut query = format!(
            "appProperties has {{ key = '{}' and value = '{}' }} \
             and appProperties has {{ key = '{}' and value = '{}' }} \
             and '{}' in parents and trashed = false",
            PROP_UUID,
            escape_query(uuid),
            PROP_KIND,
            kind,
            escape_query(folder_id),
        );
        if let Some(tier) = tier {
            query.push_str(&format!(
                " and appProperties has {{ key = '{}' and value = '{}' }}",
                PROP_TIER, tier
            ));
        }

        let listing = self.api.list_files(token, &query, None).await?;
        Ok(listing.files.into_iter().next())
    }

    fn parse_record(data: &[u8]) -> Result<Record, StorageError> {
        serde_json::from_slice(data).map_err(|e| {
            StorageError::Serialization(format!("failed to parse record content: {}", e))
        })
    }

    fn record_content(record: &Record) -> Result<Vec<u8>, StorageError> {
        serde_json::to_vec(record)
            .map_err(|e| StorageError::Serialization(format!("failed to serialize record: {}", e)))
    }
}

#[async_trait]
impl RecordStore for DriveStore {
    #[instrument(skip(self), level = "debug")]
    async fn list(&self, namespace: Namespace) -> Result<Vec<Record>, StorageError> {
        let token = self.tokens.get_valid_token().await?;
        let folder_id = self.namespace_folder(&token, namespace).await?;

        let query = format!(
            "appProperties has {{ key = '{}' and value = '{}' }} \
             and '{}' in parents and trashed = false",
            PROP_KIND,
            KIND_RECORD,
            escape_query(&folder_id),
        );

        // Drain Drive's pagination into one snapshot.
        let mut records = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let listing = self
                .api
                .list_files(&token, &query, page_token.as_deref())
                .await?;
            for file in listing.files {
                let data = self
                    .api
                    .download(&token, &file.id)
                    .await?
                    // Deleted between list and download; a later snapshot.
                    .unwrap_or_default();
                if !data.is_empty() {
                    records.push(Self::parse_record(&data)?);
                }
            }
            match listing.next_page_token {
                Some(next) => page_token = Some(next),
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
        let token = self.tokens.get_valid_token().await?;
        let folder_id = self.namespace_folder(&token, namespace).await?;

        let file = match self
            .find_item(&token, &folder_id, uuid, KIND_RECORD, None)
            .await?
        {
            Some(file) => file,
            None => return Ok(None),
        };

        match self.api.download(&token, &file.id).await? {
            Some(data) => Ok(Some(Self::parse_record(&data)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, record), level = "debug", fields(uuid = %record.uuid))]
    async fn create(&self, namespace: Namespace, record: Record) -> Result<(), StorageError> {
        let token = self.tokens.get_valid_token().await?;
        let folder_id = self.namespace_folder(&token, namespace).await?;

        if self
            .find_item(&token, &folder_id, &record.uuid, KIND_RECORD, None)
            .await?
            .is_some()
        {
            return Err(StorageError::conflict(namespace.as_str(), &record.uuid));
        }

        let metadata = serde_json::json!({
            "name": format!("{}.json", record.uuid),
            "parents": [folder_id],
            "appProperties": {
                PROP_UUID: record.uuid.as_str(),
                PROP_KIND: KIND_RECORD,
            },
        });
        let content = Self::record_content(&record)?;
        self.api
            .upload_multipart(&token, &metadata, content, "application/json")
            .await?;

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
        let token = self.tokens.get_valid_token().await?;
        let folder_id = self.namespace_folder(&token, namespace).await?;

        let existing = self
            .find_item(&token, &folder_id, uuid, KIND_RECORD, None)
            .await?
            .ok_or_else(|| StorageError::not_found(namespace.as_str(), uuid))?;

        let metadata = serde_json::json!({
            "name": format!("{}.json", uuid),
        });
        let content = Self::record_content(&record)?;
        self.api
            .update_multipart(&token, &existing.id, &metadata, content, "application/json")
            .await?;

        debug!("Updated record {}/{}", namespace, uuid);
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn remove(&self, namespace: Namespace, uuid: &str) -> Result<(), StorageError> {
        let token = self.tokens.get_valid_token().await?;
        let folder_id = self.namespace_folder(&token, namespace).await?;

        if let Some(file) = self
            .find_item(&token, &folder_id, uuid, KIND_RECORD, None)
            .await?
        {
            self.api.delete(&token, &file.id).await?;
            debug!("Removed record {}/{}", namespace, uuid);
        }
        Ok(())
    }
}

#[async_trait]
impl FileStore for DriveStore {
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

        let token = self.tokens.get_valid_token().await?;
        let folder_id = self.namespace_folder(&token, namespace).await?;

        let date = if metadata.date.is_empty() {
            chrono::Utc::now().to_rfc3339()
        } else {
            metadata.date.clone()
        };
        let tags_json = serde_json::to_string(&metadata.tags).map_err(|e| {
            StorageError::Serialization(format!("failed to serialize tags: {}", e))
        })?;

        let app_properties = serde_json::json!({
            PROP_UUID: uuid,
            PROP_KIND: KIND_FILE,
            PROP_TIER: metadata.storage.as_str(),
            PROP_SIZE: metadata.size.to_string(),
            PROP_DATE: date,
            PROP_TAGS: tags_json,
        });

        // Overwrite any existing file at the same (namespace, uuid),
        // whatever tier it was uploaded under.
        let existing = self
            .find_item(&token, &folder_id, uuid, KIND_FILE, None)
            .await?;

        let uploaded = match existing {
            Some(file) => {
                let drive_metadata = serde_json::json!({
                    "name": metadata.filename,
                    "appProperties": app_properties,
                });
                self.api
                    .update_multipart(
                        &token,
                        &file.id,
                        &drive_metadata,
                        payload.to_vec(),
                        &metadata.mime,
                    )
                    .await?
            }
            None => {
                let drive_metadata = serde_json::json!({
                    "name": metadata.filename,
                    "parents": [folder_id],
                    "appProperties": app_properties,
                });
                self.api
                    .upload_multipart(&token, &drive_metadata, payload.to_vec(), &metadata.mime)
                    .await?
            }
        };

        if metadata.public {
            self.api.share_with_anyone(&token, &uploaded.id).await?;
        }

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
        let token = self.tokens.get_valid_token().await?;
        let folder_id = self.namespace_folder(&token, namespace).await?;

        let file = self
            .find_item(
                &token,
                &folder_id,
                uuid,
                KIND_FILE,
                Some(metadata.storage.as_str()),
            )
            .await?
            .ok_or_else(|| StorageError::not_found(namespace.as_str(), uuid))?;

        let stored_mime = file.mime_type.as_deref().unwrap_or_default();
        if stored_mime != metadata.mime {
            return Err(StorageError::Validation(format!(
                "stored file {}/{} disagrees on mime: {} vs {}",
                namespace, uuid, stored_mime, metadata.mime
            )));
        }

        let declared_size = file
            .app_properties
            .get(PROP_SIZE)
            .and_then(|s| s.parse::<u64>().ok());
        if declared_size != Some(metadata.size) {
            return Err(StorageError::Validation(format!(
                "stored file {}/{} disagrees on size: {:?} vs {}",
                namespace, uuid, declared_size, metadata.size
            )));
        }

        Ok(())
    }

    #[instrument(skip(self, metadata), level = "debug")]
    async fn delete_file(
        &self,
        namespace: Namespace,
        uuid: &str,
        metadata: &FileMetadata,
    ) -> Result<(), StorageError> {
        let token = self.tokens.get_valid_token().await?;
        let folder_id = self.namespace_folder(&token, namespace).await?;

        if let Some(file) = self
            .find_item(
                &token,
                &folder_id,
                uuid,
                KIND_FILE,
                Some(metadata.storage.as_str()),
            )
            .await?
        {
            self.api.delete(&token, &file.id).await?;
            debug!("Deleted file {}/{}", namespace, uuid);
        }
        Ok(())
    }
}

impl StorageClient for DriveStore {
    fn backend_name(&self) -> &'static str {
        "gdrive"
    }
}
