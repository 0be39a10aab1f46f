//! HTTP client wrapper for the object store holding uploaded blobs.

use crate::config::get_config;
use crate::store::types::StoreError;
use reqwest::{Client, Method, StatusCode};

/// Lightweight HTTP client for blob uploads and existence probes.
pub struct ObjectStoreClient {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) bucket: String,
    pub(crate) api_key: Option<String>,
}

impl ObjectStoreClient {
    /// Construct a new client using configuration derived from the environment.
    pub fn new() -> Result<Self, StoreError> {
        let config = get_config();
        Self::with_settings(
            &config.object_store_url,
            &config.object_store_bucket,
            config.object_store_api_key.clone(),
        )
    }

    /// Construct a client from explicit connection settings.
    pub fn with_settings(
        base_url: &str,
        bucket: &str,
        api_key: Option<String>,
    ) -> Result<Self, StoreError> {
        let client = Client::builder().user_agent("studyvault/0.2").build()?;
        let base_url = normalize_base_url(base_url).map_err(StoreError::InvalidUrl)?;
        tracing::debug!(url = %base_url, bucket, "Initialized object store client");

        Ok(Self {
            client,
            base_url,
            bucket: bucket.to_string(),
            api_key,
        })
    }

    /// Store a blob under the given key, replacing any existing object.
    pub async fn put_blob(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        let byte_count = bytes.len();
        let response = self
            .request(Method::PUT, key)
            .header("content-type", "application/octet-stream")
            .body(bytes)
            .send()
            .await?;

        if response.status().is_success() {
            tracing::debug!(key, bytes = byte_count, "Blob stored");
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = StoreError::UnexpectedStatus { status, body };
            tracing::error!(key, error = %error, "Blob upload failed");
            Err(error)
        }
    }

    /// Check whether a blob exists under the given key.
    pub async fn blob_exists(&self, key: &str) -> Result<bool, StoreError> {
        let response = self.request(Method::HEAD, key).send().await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = StoreError::UnexpectedStatus { status, body };
                tracing::error!(key, error = %error, "Blob existence check failed");
                Err(error)
            }
        }
    }

    fn request(&self, method: Method, key: &str) -> reqwest::RequestBuilder {
        let base = self.base_url.trim_end_matches('/');
        let url = format!("{base}/{}/{}", self.bucket, key.trim_start_matches('/'));
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        req
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}
