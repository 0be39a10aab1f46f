//! Core data types and error definitions for the orchestration pipeline.

use crate::store::{FileRecord, StoreError};
use crate::tools::ToolError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Request-scoped context threaded explicitly through the call chain.
///
/// Carries the identifier attached to every log line and response produced
/// for one HTTP request. Deliberately not ambient state.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Unique identifier for the request.
    pub request_id: String,
}

impl RequestContext {
    /// Mint a fresh context with a random request id.
    pub fn new() -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// One file submitted to the process pipeline.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    /// Caller-assigned file identifier.
    pub file_id: String,
    /// Original filename as uploaded.
    pub filename: String,
    /// Optional per-file topic tag supplied by the caller.
    pub topic: Option<String>,
    /// Raw file contents.
    pub bytes: Vec<u8>,
}

/// Output of the extraction step for a single file.
///
/// Returned to the caller in full; persisted to the metadata store with the
/// `text` field stripped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParsedResult {
    /// Original filename as uploaded.
    pub filename: String,
    /// Class/course the file belongs to.
    pub class: String,
    /// Topic tag attached to the file.
    pub topic: String,
    /// Extracted plain text. Never persisted to the metadata store.
    pub text: String,
    /// Caller-assigned file identifier.
    pub file_id: String,
    /// Owner of the file.
    pub user_id: String,
    /// Object-store key holding the source blob.
    pub s3_key: String,
    /// Kind of content extracted (`document` or `audio`).
    pub file_type: String,
    /// Page count reported by the extractor, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_pages: Option<u32>,
}

impl ParsedResult {
    /// Build the metadata record persisted for this result.
    ///
    /// Everything except `text` survives into the record.
    pub fn to_record(&self, uploaded_at: String) -> FileRecord {
        FileRecord {
            user_id: self.user_id.clone(),
            file_id: self.file_id.clone(),
            filename: self.filename.clone(),
            storage_key: self.s3_key.clone(),
            uploaded_at,
            class: Some(self.class.clone()),
            topic: Some(self.topic.clone()),
            file_type: Some(self.file_type.clone()),
            num_pages: self.num_pages,
        }
    }
}

/// How an upload registration was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    /// Blob stored and metadata registered for the first time.
    Stored,
    /// Record and blob already present; nothing was written.
    AlreadyUploaded,
    /// Record was present but the blob was missing; the blob was restored
    /// without touching the metadata record.
    BlobRestored,
}

/// Outcome of an upload registration.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    /// Resolution of the idempotence policy.
    pub status: UploadStatus,
    /// Object-store key the blob lives under.
    pub s3_key: String,
}

/// Single hit returned by a search query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    /// Filename of the matched document.
    pub filename: String,
    /// Class the document belongs to.
    pub class: String,
    /// Topic tag of the document.
    pub topic: String,
    /// Similarity score reported by the query engine.
    pub similarity_score: f64,
    /// Matched chunk text.
    pub text: String,
}

/// Errors emitted by the upload registration path.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Object or metadata store interaction failed.
    #[error("Store request failed: {0}")]
    Store(#[from] StoreError),
}

/// Errors emitted by the process pipeline.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Scratch file handling failed.
    #[error("Scratch file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// An external tool failed or produced unusable output.
    #[error("{0}")]
    Tool(#[from] ToolError),
    /// Metadata store interaction failed.
    #[error("Store request failed: {0}")]
    Store(#[from] StoreError),
    /// Batch payload could not be serialized for the indexer.
    #[error("Failed to encode batch payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors emitted while orchestrating a search query.
#[derive(Debug, Error)]
pub enum SearchError {
    /// The query engine exited non-zero for a reason other than a missing
    /// collection.
    #[error("{0}")]
    Tool(#[from] ToolError),
    /// The user has no collection yet; surfaced as guidance, not a failure.
    #[error("No indexed content found for this user")]
    NoIndexedContent,
    /// Query engine output could not be parsed as a result list.
    #[error("Failed to parse search results: {details}")]
    MalformedOutput {
        /// Raw line that failed to parse.
        details: String,
    },
}
