//! Orchestration of the upload, process, and search pipelines.
//!
//! The orchestrator sequences the object store, the metadata store, and the
//! external tools for a single request. Every externally invoked tool runs
//! as a separate process awaited to completion; files within one batch are
//! handled strictly sequentially and scratch files are removed on every
//! exit path.

mod scratch;
mod service;
mod types;

pub use scratch::ScratchFile;
pub use service::{OrchestratorApi, OrchestratorService, collection_for_user};
pub use types::{
    IncomingFile, ParsedResult, ProcessError, RequestContext, SearchError, SearchHit,
    UploadError, UploadOutcome, UploadStatus,
};
