//! Backblaze B2 API Client
//!
//! Stores durable objects as files in a single B2 bucket. Objects are read by
//! name through the download URL and written through `b2_upload_file`.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, StatusCode};
use sha1::{Digest, Sha1};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::errors::{is_auth_expired, B2Error};
use super::types::{
    AuthorizeAccountResponse, ListBucketsRequest, ListBucketsResponse, UploadResponse, UploadUrl,
};
use crate::tier::DurableStore;

/// B2 API base URL for authorization (v3 for nested apiInfo structure)
const B2_AUTH_URL: &str = "https://api.backblazeb2.com/b2api/v3/b2_authorize_account";

/// HTTP client timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Content type of every stored object
const CONTENT_TYPE: &str = "application/json";

/// Auth state that can be refreshed (interior mutability)
struct AuthState {
    account_id: String,
    auth_token: String,
    api_url: String,
    download_url: String,
}

/// Durable store backed by a B2 bucket
#[derive(Clone)]
pub struct B2Store {
    http_client: Client,
    /// Mutable auth state (refreshable on 401)
    auth_state: Arc<RwLock<AuthState>>,
    /// Stored credentials for re-authorization
    key_id: String,
    key: String,
    bucket_id: String,
    bucket_name: String,
}

async fn authorize_account(http_client: &Client, key_id: &str, key: &str) -> Result<AuthState> {
    let credentials = format!("{}:{}", key_id, key);
    let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
    let auth_header = format!("Basic {}", encoded);

    let response = http_client
        .get(B2_AUTH_URL)
        .header("Authorization", &auth_header)
        .send()
        .await
        .context("Failed to connect to B2 API")?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(anyhow!("B2 authorization failed ({}): {}", status, body));
    }

    let auth: AuthorizeAccountResponse = response
        .json()
        .await
        .context("Failed to parse B2 auth response")?;

    Ok(AuthState {
        account_id: auth.account_id,
        auth_token: auth.authorization_token,
        api_url: auth.api_info.storage_api.api_url,
        download_url: auth.api_info.storage_api.download_url,
    })
}

impl B2Store {
    /// Authorize with B2 and bind the store to `bucket_name`
    pub async fn authorize(key_id: &str, key: &str, bucket_name: &str) -> Result<Self> {
        info!(bucket = bucket_name, "Authorizing with B2 API...");

        let http_client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        let auth = authorize_account(&http_client, key_id, key).await?;
        debug!(api_url = %auth.api_url, download_url = %auth.download_url, "B2 authorization successful");

        let bucket_id = lookup_bucket_id(&http_client, &auth, bucket_name).await?;

        info!(bucket_name = bucket_name, bucket_id = %bucket_id, "B2 store ready");
        Ok(Self {
            http_client,
            auth_state: Arc::new(RwLock::new(auth)),
            key_id: key_id.to_string(),
            key: key.to_string(),
            bucket_id,
            bucket_name: bucket_name.to_string(),
        })
    }

    /// Refresh the auth token by re-authorizing with B2
    pub async fn refresh_auth(&self) -> Result<()> {
        info!("Refreshing B2 auth token...");
        let fresh = authorize_account(&self.http_client, &self.key_id, &self.key)
            .await
            .context("Failed to refresh B2 auth")?;
        *self.auth_state.write().await = fresh;
        info!("B2 auth token refreshed successfully");
        Ok(())
    }

    /// Run `op`, refreshing the token and retrying once if it expired
    async fn with_auth_refresh<T, F, Fut>(&self, operation: &str, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match op().await {
            Err(e) if is_auth_expired(&e) => {
                warn!(operation = operation, "Auth expired, refreshing token...");
                self.refresh_auth().await?;
                op().await
            }
            other => other,
        }
    }

    /// Download an object by name; `None` if the bucket has no such file
    async fn download(&self, file_name: &str) -> Result<Option<Vec<u8>>> {
        let (token, download_url) = {
            let state = self.auth_state.read().await;
            (state.auth_token.clone(), state.download_url.clone())
        };
        let url = format!(
            "{}/file/{}/{}",
            download_url,
            self.bucket_name,
            urlencoding::encode(file_name)
        );

        debug!(file = file_name, url = %url, "Downloading object from B2");

        let response = self
            .http_client
            .get(&url)
            .header("Authorization", &token)
            .send()
            .await
            .context("Failed to download file from B2")?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(B2Error::from_status(status, &body).into());
        }

        let bytes = response
            .bytes()
            .await
            .context("Failed to read file content")?;

        debug!(file = file_name, size = bytes.len(), "Downloaded object from B2");
        Ok(Some(bytes.to_vec()))
    }

    /// Get an upload URL for uploading files to B2
    async fn get_upload_url(&self) -> Result<UploadUrl> {
        let (token, api_url) = {
            let state = self.auth_state.read().await;
            (state.auth_token.clone(), state.api_url.clone())
        };
        let url = format!("{}/b2api/v2/b2_get_upload_url", api_url);

        let response = self
            .http_client
            .post(&url)
            .header("Authorization", &token)
            .json(&serde_json::json!({ "bucketId": self.bucket_id }))
            .send()
            .await
            .context("Failed to get upload URL")?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(B2Error::from_status(status, &body).into());
        }

        response
            .json()
            .await
            .context("Failed to parse upload URL response")
    }

    /// Upload an object, replacing any previous version of the same name
    async fn upload(&self, file_name: &str, data: &[u8]) -> Result<()> {
        let upload_url = self.get_upload_url().await?;

        let mut hasher = Sha1::new();
        hasher.update(data);
        let hash = format!("{:x}", hasher.finalize());

        let response = self
            .http_client
            .post(&upload_url.upload_url)
            .header("Authorization", &upload_url.authorization_token)
            .header("X-Bz-File-Name", urlencoding::encode(file_name).as_ref())
            .header("Content-Type", CONTENT_TYPE)
            .header("Content-Length", data.len())
            .header("X-Bz-Content-Sha1", &hash)
            .body(data.to_vec())
            .send()
            .await
            .context("Failed to upload file to B2")?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(B2Error::from_status(status, &body).into());
        }

        let uploaded: UploadResponse = response
            .json()
            .await
            .context("Failed to parse upload response")?;

        info!(
            file = %uploaded.file_name,
            file_id = %uploaded.file_id,
            size = uploaded.content_length,
            bucket = %self.bucket_name,
            "Uploaded object to B2"
        );
        Ok(())
    }
}

/// Resolve the bucket ID for `bucket_name`
async fn lookup_bucket_id(http_client: &Client, auth: &AuthState, bucket_name: &str) -> Result<String> {
    let url = format!("{}/b2api/v2/b2_list_buckets", auth.api_url);

    let response = http_client
        .post(&url)
        .header("Authorization", &auth.auth_token)
        .json(&ListBucketsRequest {
            account_id: &auth.account_id,
            bucket_name,
        })
        .send()
        .await
        .context("Failed to list buckets")?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(anyhow!("Failed to list buckets ({}): {}", status, body));
    }

    let list: ListBucketsResponse = response
        .json()
        .await
        .context("Failed to parse bucket list")?;

    list.buckets
        .into_iter()
        .find(|b| b.bucket_name == bucket_name)
        .map(|b| b.bucket_id)
        .ok_or_else(|| anyhow!("Bucket '{}' not found", bucket_name))
}

#[async_trait]
impl DurableStore for B2Store {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.with_auth_refresh("download", || self.download(key)).await
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let data = value.as_slice();
        self.with_auth_refresh("upload", || self.upload(key, data))
            .await
    }
}
