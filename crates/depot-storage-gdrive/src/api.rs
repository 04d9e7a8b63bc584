//! Google Drive API v3 client wrapper.
//!
//! Access tokens are passed per-call by the caller (the store resolves
//! them through `TokenManager`). Base URLs are injectable for tests.

use std::collections::HashMap;

use depot_storage_core::StorageError;
use reqwest::multipart;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

/// Default API and upload endpoints.
const API_BASE_URL: &str = "https://www.googleapis.com/drive/v3";
const UPLOAD_BASE_URL: &str = "https://www.googleapis.com/upload/drive/v3";

/// Fields requested on every file lookup.
const FILE_FIELDS: &str = "id,name,mimeType,size,modifiedTime,appProperties";

/// Drive folder MIME type.
pub const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

/// File metadata as returned by the Drive API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Drive reports size as a decimal string; absent for folders.
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub modified_time: Option<String>,
    #[serde(default)]
    pub app_properties: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileList {
    #[serde(default)]
    pub files: Vec<DriveFile>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Escape a string literal for a Drive `q` query.
pub fn escape_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Stateless Drive v3 REST client.
pub struct DriveApi {
    http: Client,
    api_base: String,
    upload_base: String,
}

impl DriveApi {
    pub fn new() -> Self {
        Self::with_base_urls(API_BASE_URL.to_string(), UPLOAD_BASE_URL.to_string())
    }

    /// Client with explicit endpoints (tests).
    pub fn with_base_urls(api_base: String, upload_base: String) -> Self {
        Self {
            http: Client::new(),
            api_base,
            upload_base,
        }
    }

    async fn check(resp: reqwest::Response, what: &str) -> Result<reqwest::Response, StorageError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(StorageError::Unauthorized(format!(
                "Drive {} rejected: {} {}",
                what, status, body
            )));
        }
        Err(StorageError::Transport(format!(
            "Drive {} error: {} {}",
            what, status, body
        )))
    }

    /// Run a `files.list` query, one page.
    #[instrument(skip(self, token), level = "debug")]
    pub async fn list_files(
        &self,
        token: &str,
        query: &str,
        page_token: Option<&str>,
    ) -> Result<FileList, StorageError> {
        let fields = format!("nextPageToken,files({})", FILE_FIELDS);
        let mut request = self
            .http
            .get(format!("{}/files", self.api_base))
            .bearer_auth(token)
            .query(&[
                ("q", query),
                ("fields", fields.as_str()),
                ("pageSize", "100"),
            ]);
        if let Some(page_token) = page_token {
            request = request.query(&[("pageToken", page_token)]);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| StorageError::Transport(format!("Drive files.list failed: {}", e)))?;
        let resp = Self::check(resp, "files.list").await?;

        resp.json()
            .await
            .map_err(|e| StorageError::Serialization(format!("malformed files.list response: {}", e)))
    }

    /// Fetch one file's metadata. `None` if Drive reports 404.
    #[instrument(skip(self, token), level = "debug")]
    pub async fn get_metadata(
        &self,
        token: &str,
        file_id: &str,
    ) -> Result<Option<DriveFile>, StorageError> {
        let resp = self
            .http
            .get(format!("{}/files/{}", self.api_base, file_id))
            .bearer_auth(token)
            .query(&[("fields", FILE_FIELDS)])
            .send()
            .await
            .map_err(|e| StorageError::Transport(format!("Drive files.get failed: {}", e)))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = Self::check(resp, "files.get").await?;

        let file = resp.json().await.map_err(|e| {
            StorageError::Serialization(format!("malformed files.get response: {}", e))
        })?;
        Ok(Some(file))
    }

    /// Download a file's content. `None` if Drive reports 404.
    #[instrument(skip(self, token), level = "debug")]
    pub async fn download(
        &self,
        token: &str,
        file_id: &str,
    ) -> Result<Option<Vec<u8>>, StorageError> {
        let resp = self
            .http
            .get(format!("{}/files/{}", self.api_base, file_id))
            .bearer_auth(token)
            .query(&[("alt", "media")])
            .send()
            .await
            .map_err(|e| StorageError::Transport(format!("Drive download failed: {}", e)))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = Self::check(resp, "download").await?;

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| StorageError::Transport(format!("Drive download body failed: {}", e)))?;
        debug!("Downloaded {} bytes for file {}", bytes.len(), file_id);
        Ok(Some(bytes.to_vec()))
    }

    /// Create a metadata-only file (used for folders).
    #[instrument(skip(self, token, metadata), level = "debug")]
    pub async fn create_metadata(
        &self,
        token: &str,
        metadata: &serde_json::Value,
    ) -> Result<DriveFile, StorageError> {
        let resp = self
            .http
            .post(format!("{}/files", self.api_base))
            .bearer_auth(token)
            .query(&[("fields", FILE_FIELDS)])
            .json(metadata)
            .send()
            .await
            .map_err(|e| StorageError::Transport(format!("Drive files.create failed: {}", e)))?;
        let resp = Self::check(resp, "files.create").await?;

        resp.json().await.map_err(|e| {
            StorageError::Serialization(format!("malformed files.create response: {}", e))
        })
    }

    /// Create a file with content via multipart upload.
    #[instrument(skip(self, token, metadata, content), level = "debug", fields(content_len = content.len()))]
    pub async fn upload_multipart(
        &self,
        token: &str,
        metadata: &serde_json::Value,
        content: Vec<u8>,
        mime: &str,
    ) -> Result<DriveFile, StorageError> {
        let form = Self::multipart_form(metadata, content, mime)?;

        let resp = self
            .http
            .post(format!("{}/files", self.upload_base))
            .bearer_auth(token)
            .query(&[("uploadType", "multipart"), ("fields", FILE_FIELDS)])
            .multipart(form)
            .send()
            .await
            .map_err(|e| StorageError::Transport(format!("Drive upload failed: {}", e)))?;
        let resp = Self::check(resp, "upload").await?;

        resp.json()
            .await
            .map_err(|e| StorageError::Serialization(format!("malformed upload response: {}", e)))
    }

    /// Replace an existing file's metadata and content.
    #[instrument(skip(self, token, metadata, content), level = "debug", fields(content_len = content.len()))]
    pub async fn update_multipart(
        &self,
        token: &str,
        file_id: &str,
        metadata: &serde_json::Value,
        content: Vec<u8>,
        mime: &str,
    ) -> Result<DriveFile, StorageError> {
        let form = Self::multipart_form(metadata, content, mime)?;

        let resp = self
            .http
            .patch(format!("{}/files/{}", self.upload_base, file_id))
            .bearer_auth(token)
            .query(&[("uploadType", "multipart"), ("fields", FILE_FIELDS)])
            .multipart(form)
            .send()
            .await
            .map_err(|e| StorageError::Transport(format!("Drive update failed: {}", e)))?;
        let resp = Self::check(resp, "update").await?;

        resp.json()
            .await
            .map_err(|e| StorageError::Serialization(format!("malformed update response: {}", e)))
    }

    /// Grant "anyone with the link" read access to a file.
    #[instrument(skip(self, token), level = "debug")]
    pub async fn share_with_anyone(&self, token: &str, file_id: &str) -> Result<(), StorageError> {
        let resp = self
            .http
            .post(format!("{}/files/{}/permissions", self.api_base, file_id))
            .bearer_auth(token)
            .json(&serde_json::json!({ "role": "reader", "type": "anyone" }))
            .send()
            .await
            .map_err(|e| StorageError::Transport(format!("Drive permissions failed: {}", e)))?;
        Self::check(resp, "permissions.create").await?;
        Ok(())
    }

    /// Delete a file. Absent files are fine: delete is idempotent here.
    #[instrument(skip(self, token), level = "debug")]
    pub async fn delete(&self, token: &str, file_id: &str) -> Result<(), StorageError> {
        let resp = self
            .http
            .delete(format!("{}/files/{}", self.api_base, file_id))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| StorageError::Transport(format!("Drive delete failed: {}", e)))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::check(resp, "delete").await?;
        Ok(())
    }

    fn multipart_form(
        metadata: &serde_json::Value,
        content: Vec<u8>,
        mime: &str,
    ) -> Result<multipart::Form, StorageError> {
        let metadata_part = multipart::Part::text(metadata.to_string())
            .mime_str("application/json")
            .map_err(|e| StorageError::Validation(format!("bad metadata part: {}", e)))?;
        let media_part = multipart::Part::bytes(content)
            .mime_str(mime)
            .map_err(|e| StorageError::Validation(format!("bad mime type {}: {}", mime, e)))?;

        Ok(multipart::Form::new()
            .part("metadata", metadata_part)
            .part("media", media_part))
    }
}

impl Default for DriveApi {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_query() {
        assert_eq!(escape_query("plain"), "plain");
        assert_eq!(escape_query("it's"), "it\\'s");
        assert_eq!(escape_query("back\\slash"), "back\\\\slash");
    }

    #[test]
    fn test_drive_file_deserializes_camel_case() {
        let file: DriveFile = serde_json::from_value(serde_json::json!({
            "id": "abc",
            "name": "uuid1.json",
            "mimeType": "application/json",
            "size": "42",
            "appProperties": { "uuid": "uuid1" },
        }))
        .unwrap();

        assert_eq!(file.id, "abc");
        assert_eq!(file.mime_type.as_deref(), Some("application/json"));
        assert_eq!(file.size.as_deref(), Some("42"));
        assert_eq!(file.app_properties["uuid"], "uuid1");
    }
}
