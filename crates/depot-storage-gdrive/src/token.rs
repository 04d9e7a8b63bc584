//! OAuth2 access-token management: in-memory cache + refresh-token grant.
//!
//! A `TokenManager` holds one credential context. When Google rejects the
//! refresh token the manager flips to revoked and every later call fails
//! fast with `Unauthorized` instead of attempting network calls.

use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use depot_storage_core::StorageError;
use tracing::{debug, info, warn};

/// Default Google OAuth2 token endpoint.
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Cached token with expiration.
#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: chrono::DateTime<chrono::Utc>,
}

impl CachedToken {
    fn is_expired(&self) -> bool {
        // Refresh five minutes early rather than racing the deadline.
        chrono::Utc::now() >= self.expires_at - chrono::Duration::minutes(5)
    }
}

/// One credential's mutable state: the current refresh token (Google may
/// rotate it on use) and the cached access token.
#[derive(Debug)]
struct Credential {
    refresh_token: String,
    cached: Option<CachedToken>,
}

/// Manages one OAuth credential with caching and automatic refresh.
pub struct TokenManager {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    credentials: DashMap<String, Credential>,
    revoked: AtomicBool,
}

impl TokenManager {
    pub fn new(client_id: String, client_secret: String, refresh_token: String) -> Self {
        Self::with_token_url(
            client_id,
            client_secret,
            refresh_token,
            GOOGLE_TOKEN_URL.to_string(),
        )
    }

    /// Like [`TokenManager::new`] with an explicit token endpoint (tests).
    pub fn with_token_url(
        client_id: String,
        client_secret: String,
        refresh_token: String,
        token_url: String,
    ) -> Self {
        let credentials = DashMap::new();
        credentials.insert(
            client_id.clone(),
            Credential {
                refresh_token,
                cached: None,
            },
        );
        Self {
            http: reqwest::Client::new(),
            token_url,
            client_id,
            client_secret,
            credentials,
            revoked: AtomicBool::new(false),
        }
    }

    /// Get a valid access token, refreshing if necessary.
    pub async fn get_valid_token(&self) -> Result<String, StorageError> {
        if self.revoked.load(Ordering::SeqCst) {
            return Err(StorageError::Unauthorized(
                "credentials were revoked; reconfigure the backend".to_string(),
            ));
        }

        // Clone out of the map so no guard is held across an await.
        let cached = self
            .credentials
            .get(&self.client_id)
            .and_then(|entry| entry.cached.clone());
        if let Some(token) = cached {
            if !token.is_expired() {
                debug!("Token cache hit");
                return Ok(token.access_token);
            }
            debug!("Cached token expired, refreshing");
        }

        self.refresh().await
    }

    /// Refresh the access token using the refresh_token grant.
    async fn refresh(&self) -> Result<String, StorageError> {
        let refresh_token = self
            .credentials
            .get(&self.client_id)
            .map(|entry| entry.refresh_token.clone())
            .ok_or_else(|| {
                StorageError::Unauthorized("no refresh token configured".to_string())
            })?;

        let resp = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| StorageError::Transport(format!("OAuth token request failed: {}", e)))?;

        let status = resp.status();
        if status.is_client_error() {
            let body = resp.text().await.unwrap_or_default();
            warn!("OAuth refresh rejected ({}): {}", status, body);
            self.revoked.store(true, Ordering::SeqCst);
            return Err(StorageError::Unauthorized(format!(
                "OAuth token refresh rejected: {} {}",
                status, body
            )));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(StorageError::Transport(format!(
                "OAuth token refresh failed: {} {}",
                status, body
            )));
        }

        #[derive(serde::Deserialize)]
        struct RefreshResponse {
            access_token: String,
            expires_in: u64,
            refresh_token: Option<String>,
        }

        let token_resp: RefreshResponse = resp.json().await.map_err(|e| {
            StorageError::Serialization(format!("malformed OAuth token response: {}", e))
        })?;

        let expires_at =
            chrono::Utc::now() + chrono::Duration::seconds(token_resp.expires_in as i64);

        let mut entry = self
            .credentials
            .entry(self.client_id.clone())
            .or_insert_with(|| Credential {
                refresh_token: refresh_token.clone(),
                cached: None,
            });
        if let Some(rotated) = token_resp.refresh_token {
            entry.refresh_token = rotated;
        }
        entry.cached = Some(CachedToken {
            access_token: token_resp.access_token.clone(),
            expires_at,
        });
        drop(entry);

        info!("Refreshed OAuth token, expires at {}", expires_at.to_rfc3339());
        Ok(token_resp.access_token)
    }
}
