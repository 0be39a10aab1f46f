//! Shared types used by the store clients.

use crate::identity::profile::UserProfile;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned while interacting with the object or metadata store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid store URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Store responded with an unexpected status code.
    #[error("Unexpected store response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned from the store.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
}

/// Persisted record for an uploaded file, keyed by `(user_id, file_id)`.
///
/// The record deliberately has no field for extracted text; the processing
/// pipeline persists everything from a parsed result except its `text`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileRecord {
    /// Owner of the file.
    pub user_id: String,
    /// Caller-assigned file identifier, unique per user.
    pub file_id: String,
    /// Original filename as uploaded.
    pub filename: String,
    /// Object-store key holding the blob (`uploads/<file_id>`).
    pub storage_key: String,
    /// RFC3339 timestamp of the first successful registration.
    pub uploaded_at: String,
    /// Class/course the file belongs to, filled in by processing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    /// Topic tag supplied at processing time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// Kind of content extracted (`document` or `audio`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    /// Page count reported by the extractor, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_pages: Option<u32>,
}

/// Envelope persisted to the profile table for a single user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredProfile {
    /// Primary key of the profile record.
    pub user_id: String,
    /// Nested profile document.
    #[serde(rename = "userProfile")]
    pub profile: UserProfile,
    /// RFC3339 timestamp of the first write.
    pub created_at: String,
    /// RFC3339 timestamp of the most recent write.
    pub updated_at: String,
}
