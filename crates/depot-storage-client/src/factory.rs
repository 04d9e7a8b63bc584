use std::path::PathBuf;
use std::sync::Arc;

use aws_config::{BehaviorVersion, Region};
use depot_storage_aws::AwsClient;
use depot_storage_core::StorageClient;
use depot_storage_gdrive::{DriveConfig, DriveStore};
use depot_storage_local::LocalStore;
use tracing::info;

/// Configuration selecting one backend.
///
/// Credentials and endpoints are supplied here, at construction time; an
/// adapter only exists once its configuration resolved.
#[derive(Debug, Clone)]
pub enum BackendConfig {
    /// Local filesystem store rooted at a directory.
    Local { root: PathBuf },
    /// DynamoDB records + S3 files. Credentials come from the default AWS
    /// provider chain (environment, profile, instance metadata).
    Aws {
        region: String,
        records_table: String,
        files_bucket: String,
        /// Override for S3-compatible endpoints.
        endpoint_url: Option<String>,
    },
    /// Google Drive, authorized by an OAuth2 refresh token.
    GoogleDrive(DriveConfig),
}

/// Build the storage client selected by `config`.
pub async fn connect(config: BackendConfig) -> Arc<dyn StorageClient> {
    match config {
        BackendConfig::Local { root } => {
            info!("Connecting local storage at {}", root.display());
            Arc::new(LocalStore::new(root))
        }
        BackendConfig::Aws {
            region,
            records_table,
            files_bucket,
            endpoint_url,
        } => {
            info!(
                "Connecting AWS storage (table {}, bucket {})",
                records_table, files_bucket
            );
            let shared = aws_config::defaults(BehaviorVersion::latest())
                .region(Region::new(region))
                .load()
                .await;

            let mut s3_builder = aws_sdk_s3::config::Builder::from(&shared);
            if let Some(endpoint) = endpoint_url {
                s3_builder = s3_builder.endpoint_url(endpoint).force_path_style(true);
            }
            let s3 = aws_sdk_s3::Client::from_conf(s3_builder.build());
            let dynamo = aws_sdk_dynamodb::Client::new(&shared);

            Arc::new(AwsClient::new(dynamo, s3, records_table, files_bucket))
        }
        BackendConfig::GoogleDrive(drive_config) => {
            info!(
                "Connecting Google Drive storage (root folder {})",
                drive_config.root_folder
            );
            Arc::new(DriveStore::new(drive_config))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_storage_core::{Namespace, Record};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_factory_round_trip() {
        let dir = TempDir::new().unwrap();
        let client = connect(BackendConfig::Local {
            root: dir.path().to_path_buf(),
        })
        .await;
        assert_eq!(client.backend_name(), "local");

        let record = Record::from_value(serde_json::json!({
            "uuid": "uuid1",
            "name": "Project 1",
        }))
        .unwrap();

        client
            .create(Namespace::Projects, record.clone())
            .await
            .unwrap();
        let item = client
            .retrieve(Namespace::Projects, "uuid1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item, record);
    }

    #[tokio::test]
    async fn test_gdrive_factory_selects_backend() {
        let client = connect(BackendConfig::GoogleDrive(DriveConfig {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            refresh_token: "refresh".to_string(),
            root_folder: "depot".to_string(),
        }))
        .await;
        assert_eq!(client.backend_name(), "gdrive");
    }
}
