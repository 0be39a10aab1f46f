//! HTTP client wrapper for the metadata document store.

use crate::config::get_config;
use crate::store::types::{FileRecord, StoreError, StoredProfile};
use reqwest::{Client, Method, StatusCode};

/// Lightweight HTTP client for file-record and profile tables.
pub struct MetadataStoreClient {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) file_table: String,
    pub(crate) profile_table: String,
    pub(crate) api_key: Option<String>,
}

impl MetadataStoreClient {
    /// Construct a new client using configuration derived from the environment.
    pub fn new() -> Result<Self, StoreError> {
        let config = get_config();
        Self::with_settings(
            &config.metadata_store_url,
            &config.file_table_name,
            &config.profile_table_name,
            config.metadata_store_api_key.clone(),
        )
    }

    /// Construct a client from explicit connection settings.
    pub fn with_settings(
        base_url: &str,
        file_table: &str,
        profile_table: &str,
        api_key: Option<String>,
    ) -> Result<Self, StoreError> {
        let client = Client::builder().user_agent("studyvault/0.2").build()?;
        let base_url = normalize_base_url(base_url).map_err(StoreError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            file_table,
            profile_table,
            "Initialized metadata store client"
        );

        Ok(Self {
            client,
            base_url,
            file_table: file_table.to_string(),
            profile_table: profile_table.to_string(),
            api_key,
        })
    }

    /// Upsert a file record. Last write wins; no transactional guarantee.
    pub async fn put_file_record(&self, record: &FileRecord) -> Result<(), StoreError> {
        let path = format!("tables/{}/items", self.file_table);
        let response = self.request(Method::PUT, &path).json(record).send().await?;
        self.ensure_success(response, || {
            tracing::debug!(
                user_id = %record.user_id,
                file_id = %record.file_id,
                "File record stored"
            );
        })
        .await
    }

    /// Fetch the file record for `(user_id, file_id)`, if one exists.
    pub async fn get_file_record(
        &self,
        user_id: &str,
        file_id: &str,
    ) -> Result<Option<FileRecord>, StoreError> {
        let path = format!("tables/{}/items/{user_id}/{file_id}", self.file_table);
        let response = self.request(Method::GET, &path).send().await?;

        match response.status() {
            StatusCode::OK => Ok(Some(response.json().await?)),
            StatusCode::NOT_FOUND => Ok(None),
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = StoreError::UnexpectedStatus { status, body };
                tracing::error!(user_id, file_id, error = %error, "File record lookup failed");
                Err(error)
            }
        }
    }

    /// Upsert a profile record, replacing the stored document wholesale.
    pub async fn put_profile(&self, profile: &StoredProfile) -> Result<(), StoreError> {
        let path = format!("tables/{}/items", self.profile_table);
        let response = self
            .request(Method::PUT, &path)
            .json(profile)
            .send()
            .await?;
        self.ensure_success(response, || {
            tracing::debug!(user_id = %profile.user_id, "Profile stored");
        })
        .await
    }

    /// Fetch the profile for a user, if one exists.
    pub async fn get_profile(&self, user_id: &str) -> Result<Option<StoredProfile>, StoreError> {
        let path = format!("tables/{}/items/{user_id}", self.profile_table);
        let response = self.request(Method::GET, &path).send().await?;

        match response.status() {
            StatusCode::OK => Ok(Some(response.json().await?)),
            StatusCode::NOT_FOUND => Ok(None),
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = StoreError::UnexpectedStatus { status, body };
                tracing::error!(user_id, error = %error, "Profile lookup failed");
                Err(error)
            }
        }
    }

    /// Delete the profile for a user.
    ///
    /// Returns `Ok(false)` when no profile existed; deleting an absent
    /// profile is not an error.
    pub async fn delete_profile(&self, user_id: &str) -> Result<bool, StoreError> {
        let path = format!("tables/{}/items/{user_id}", self.profile_table);
        let response = self.request(Method::DELETE, &path).send().await?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => {
                tracing::debug!(user_id, "Profile already absent on delete");
                Ok(false)
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = StoreError::UnexpectedStatus { status, body };
                tracing::error!(user_id, error = %error, "Profile delete failed");
                Err(error)
            }
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let base = self.base_url.trim_end_matches('/');
        let url = format!("{base}/{}", path.trim_start_matches('/'));
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        req
    }

    async fn ensure_success<F>(
        &self,
        response: reqwest::Response,
        on_success: F,
    ) -> Result<(), StoreError>
    where
        F: FnOnce(),
    {
        if response.status().is_success() {
            on_success();
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = StoreError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Metadata store request failed");
            Err(error)
        }
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}
