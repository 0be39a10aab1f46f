//! Orchestrator service coordinating stores and external tools.

use crate::{
    metrics::{MetricsSnapshot, ServiceMetrics},
    orchestrator::{
        scratch::ScratchFile,
        types::{
            IncomingFile, ParsedResult, ProcessError, RequestContext, SearchError, SearchHit,
            UploadError, UploadOutcome, UploadStatus,
        },
    },
    store::{FileRecord, MetadataStoreClient, ObjectStoreClient, storage_key},
    tools::{ProcessInvoker, ToolError, ToolInvoker, ToolKind, first_json_line},
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// File extensions accepted without format normalization.
const CANONICAL_DOCUMENT_EXT: &str = "pdf";
const AUDIO_EXTS: [&str; 3] = ["mp3", "wav", "m4a"];

/// Coordinates the full pipeline: blob storage, metadata registration,
/// normalize/extract/index tool runs, and similarity queries.
///
/// The service owns long-lived handles to both store clients and the tool
/// runner. Construct it once near process start and share it through an
/// `Arc`.
pub struct OrchestratorService {
    object_store: ObjectStoreClient,
    metadata_store: Arc<MetadataStoreClient>,
    tools: Box<dyn ToolInvoker>,
    scratch_dir: PathBuf,
    search_result_count: usize,
    metrics: Arc<ServiceMetrics>,
}

/// Abstraction over the orchestration pipeline used by the HTTP surface.
#[async_trait]
pub trait OrchestratorApi: Send + Sync {
    /// Store an uploaded blob and register its metadata record exactly once.
    async fn register_upload(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        file_id: &str,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadOutcome, UploadError>;

    /// Normalize, extract, persist, and index a batch of files.
    async fn process_batch(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        class_name: &str,
        files: Vec<IncomingFile>,
    ) -> Result<Vec<ParsedResult>, ProcessError>;

    /// Query the user's collection for the nearest documents.
    async fn search(
        &self,
        ctx: &RequestContext,
        query: &str,
        user_id: &str,
        topic: Option<&str>,
    ) -> Result<Vec<SearchHit>, SearchError>;

    /// List the collections present in the vector index.
    async fn list_collections(&self, ctx: &RequestContext) -> Result<Value, ToolError>;

    /// Dump the contents of one collection.
    async fn dump_collection(&self, ctx: &RequestContext, name: &str)
    -> Result<Value, ToolError>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Resolve the vector-index collection for a user.
///
/// Prefix-normalizes the id into `user_<id>` unless it already carries the
/// prefix.
pub fn collection_for_user(user_id: &str) -> String {
    if user_id.starts_with("user_") {
        user_id.to_string()
    } else {
        format!("user_{user_id}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    Document,
    Audio,
}

fn extension_of(filename: &str) -> String {
    std::path::Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default()
}

fn classify(extension: &str) -> FileKind {
    if AUDIO_EXTS.contains(&extension) {
        FileKind::Audio
    } else {
        FileKind::Document
    }
}

fn needs_normalization(extension: &str) -> bool {
    extension != CANONICAL_DOCUMENT_EXT && !AUDIO_EXTS.contains(&extension)
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}

/// Stdout contract of the format normalizer.
#[derive(Deserialize)]
struct NormalizerOutput {
    status: String,
    #[serde(default)]
    output_file: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Stdout contract of the content extractors.
#[derive(Deserialize)]
struct ExtractorOutput {
    text: String,
    #[serde(default)]
    file_type: Option<String>,
    #[serde(default)]
    num_pages: Option<u32>,
    #[serde(default)]
    class: Option<String>,
    #[serde(default)]
    topic: Option<String>,
}

impl OrchestratorService {
    /// Build a new service from the loaded configuration.
    pub fn new() -> Result<Self, crate::store::StoreError> {
        let config = crate::config::get_config();
        Ok(Self {
            object_store: ObjectStoreClient::new()?,
            metadata_store: Arc::new(MetadataStoreClient::new()?),
            tools: Box::new(ProcessInvoker::from_config()),
            scratch_dir: config.scratch_dir.clone(),
            search_result_count: config.search_result_count,
            metrics: Arc::new(ServiceMetrics::new()),
        })
    }

    /// Build a service from explicit parts. Used by tests and by callers
    /// that share the metadata client with the identity service.
    pub fn with_parts(
        object_store: ObjectStoreClient,
        metadata_store: Arc<MetadataStoreClient>,
        tools: Box<dyn ToolInvoker>,
        scratch_dir: PathBuf,
        search_result_count: usize,
        metrics: Arc<ServiceMetrics>,
    ) -> Self {
        Self {
            object_store,
            metadata_store,
            tools,
            scratch_dir,
            search_result_count,
            metrics,
        }
    }

    /// Handle to the shared metadata client.
    pub fn metadata_store(&self) -> Arc<MetadataStoreClient> {
        Arc::clone(&self.metadata_store)
    }

    /// Handle to the shared metrics accumulator.
    pub fn metrics(&self) -> Arc<ServiceMetrics> {
        Arc::clone(&self.metrics)
    }

    async fn process_one(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        class_name: &str,
        file: IncomingFile,
    ) -> Result<ParsedResult, ProcessError> {
        let scratch =
            ScratchFile::create(&self.scratch_dir, &file.file_id, &file.filename, &file.bytes)
                .await?;
        let extension = extension_of(&file.filename);
        let kind = classify(&extension);

        // The converted file gets its own guard so both paths are removed
        // whether the remaining steps succeed or fail.
        let mut converted: Option<ScratchFile> = None;
        if needs_normalization(&extension) {
            tracing::info!(
                request_id = %ctx.request_id,
                file_id = %file.file_id,
                filename = %file.filename,
                "Normalizing to canonical format"
            );
            let output = self
                .tools
                .invoke(
                    ToolKind::NormalizeDocument,
                    &[scratch.path().display().to_string()],
                    None,
                )
                .await?;
            let line = first_json_line(&output.stdout).ok_or(ToolError::EmptyOutput {
                tool: ToolKind::NormalizeDocument.script_name(),
            })?;
            let normalized: NormalizerOutput =
                serde_json::from_str(line).map_err(|source| ToolError::MalformedOutput {
                    tool: ToolKind::NormalizeDocument.script_name(),
                    source,
                })?;
            if normalized.status != "success" {
                return Err(ToolError::Failed {
                    tool: ToolKind::NormalizeDocument.script_name(),
                    stderr: normalized
                        .error
                        .unwrap_or_else(|| "conversion failed".to_string()),
                }
                .into());
            }
            let path = normalized
                .output_file
                .map(PathBuf::from)
                .ok_or(ToolError::EmptyOutput {
                    tool: ToolKind::NormalizeDocument.script_name(),
                })?;
            converted = Some(ScratchFile::adopt(path));
        }

        let extract_path = converted
            .as_ref()
            .map(|guard| guard.path())
            .unwrap_or_else(|| scratch.path());
        let extractor = match kind {
            FileKind::Audio => ToolKind::ExtractAudio,
            FileKind::Document => ToolKind::ExtractDocument,
        };
        tracing::info!(
            request_id = %ctx.request_id,
            file_id = %file.file_id,
            tool = extractor.script_name(),
            "Extracting content"
        );
        let output = self
            .tools
            .invoke(extractor, &[extract_path.display().to_string()], None)
            .await?;
        let line = first_json_line(&output.stdout).ok_or(ToolError::EmptyOutput {
            tool: extractor.script_name(),
        })?;
        let extracted: ExtractorOutput =
            serde_json::from_str(line).map_err(|source| ToolError::MalformedOutput {
                tool: extractor.script_name(),
                source,
            })?;

        // Extractor output wins over caller-supplied defaults when present
        // and non-empty.
        let class = extracted
            .class
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| class_name.to_string());
        let topic = extracted
            .topic
            .filter(|value| !value.trim().is_empty())
            .or(file.topic)
            .unwrap_or_default();
        let file_type = extracted
            .file_type
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| match kind {
                FileKind::Audio => "audio".to_string(),
                FileKind::Document => "document".to_string(),
            });

        let s3_key = storage_key(&file.file_id);
        let parsed = ParsedResult {
            filename: file.filename,
            class,
            topic,
            text: extracted.text,
            file_id: file.file_id,
            user_id: user_id.to_string(),
            s3_key,
            file_type,
            num_pages: extracted.num_pages,
        };

        // Skip the write when a record already exists for the pair.
        let existing = self
            .metadata_store
            .get_file_record(user_id, &parsed.file_id)
            .await?;
        if existing.is_none() {
            self.metadata_store
                .put_file_record(&parsed.to_record(now_rfc3339()))
                .await?;
        } else {
            tracing::debug!(
                request_id = %ctx.request_id,
                file_id = %parsed.file_id,
                "Metadata record already present; skipping write"
            );
        }

        Ok(parsed)
    }
}

#[async_trait]
impl OrchestratorApi for OrchestratorService {
    async fn register_upload(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        file_id: &str,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadOutcome, UploadError> {
        let key = storage_key(file_id);
        let existing = self.metadata_store.get_file_record(user_id, file_id).await?;

        if existing.is_some() {
            if self.object_store.blob_exists(&key).await? {
                tracing::info!(
                    request_id = %ctx.request_id,
                    user_id,
                    file_id,
                    "Upload already registered; nothing to do"
                );
                return Ok(UploadOutcome {
                    status: UploadStatus::AlreadyUploaded,
                    s3_key: key,
                });
            }
            // Record without a blob: restore the blob, leave the record be.
            self.object_store.put_blob(&key, bytes).await?;
            tracing::warn!(
                request_id = %ctx.request_id,
                user_id,
                file_id,
                "Blob was missing for a registered upload; restored"
            );
            return Ok(UploadOutcome {
                status: UploadStatus::BlobRestored,
                s3_key: key,
            });
        }

        self.object_store.put_blob(&key, bytes).await?;

        // Re-check for a concurrent registration immediately before the
        // write. Last write wins; no transactional guarantee is made.
        let raced = self.metadata_store.get_file_record(user_id, file_id).await?;
        if raced.is_none() {
            let record = FileRecord {
                user_id: user_id.to_string(),
                file_id: file_id.to_string(),
                filename: filename.to_string(),
                storage_key: key.clone(),
                uploaded_at: now_rfc3339(),
                class: None,
                topic: None,
                file_type: None,
                num_pages: None,
            };
            self.metadata_store.put_file_record(&record).await?;
        }

        self.metrics.record_upload();
        tracing::info!(
            request_id = %ctx.request_id,
            user_id,
            file_id,
            s3_key = %key,
            "Upload registered"
        );
        Ok(UploadOutcome {
            status: UploadStatus::Stored,
            s3_key: key,
        })
    }

    async fn process_batch(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        class_name: &str,
        files: Vec<IncomingFile>,
    ) -> Result<Vec<ParsedResult>, ProcessError> {
        let file_count = files.len();
        tracing::info!(
            request_id = %ctx.request_id,
            user_id,
            files = file_count,
            "Processing batch"
        );

        // Strictly sequential: each step shells out and results accumulate
        // in call order. The first per-file error aborts the batch.
        let mut results = Vec::with_capacity(file_count);
        for file in files {
            let parsed = self.process_one(ctx, user_id, class_name, file).await?;
            results.push(parsed);
        }

        // One batched embedding pass over every parsed result, text included.
        // Metadata writes above are not rolled back if this fails.
        let payload = serde_json::to_string(&results)?;
        self.tools
            .invoke(ToolKind::EmbedIndex, &[], Some(payload))
            .await?;

        self.metrics.record_processed(results.len() as u64);
        tracing::info!(
            request_id = %ctx.request_id,
            user_id,
            files = results.len(),
            "Batch indexed"
        );
        Ok(results)
    }

    async fn search(
        &self,
        ctx: &RequestContext,
        query: &str,
        user_id: &str,
        topic: Option<&str>,
    ) -> Result<Vec<SearchHit>, SearchError> {
        let collection = collection_for_user(user_id);
        let mut args = vec![
            "--query".to_string(),
            query.to_string(),
            "--collection".to_string(),
            collection.clone(),
            "--n-results".to_string(),
            self.search_result_count.to_string(),
        ];
        if let Some(topic) = topic.filter(|value| !value.trim().is_empty()) {
            args.push("--topic".to_string());
            args.push(topic.to_string());
        }

        let output = match self.tools.invoke(ToolKind::QueryIndex, &args, None).await {
            Ok(output) => output,
            Err(ToolError::Failed { stderr, .. }) if mentions_missing_collection(&stderr) => {
                tracing::info!(
                    request_id = %ctx.request_id,
                    collection = %collection,
                    "Collection does not exist yet"
                );
                return Err(SearchError::NoIndexedContent);
            }
            Err(error) => return Err(error.into()),
        };

        // Only the first non-blank line is the payload; tools sometimes
        // emit diagnostics on stdout.
        let Some(line) = first_json_line(&output.stdout) else {
            return Ok(Vec::new());
        };
        let value: Value =
            serde_json::from_str(line).map_err(|_| SearchError::MalformedOutput {
                details: line.to_string(),
            })?;

        if let Some(details) = tool_reported_error(&value) {
            if mentions_missing_collection(&details) {
                return Err(SearchError::NoIndexedContent);
            }
            return Err(SearchError::MalformedOutput { details });
        }

        let hits: Vec<SearchHit> =
            serde_json::from_value(value).map_err(|_| SearchError::MalformedOutput {
                details: line.to_string(),
            })?;

        self.metrics.record_search();
        tracing::info!(
            request_id = %ctx.request_id,
            collection = %collection,
            hits = hits.len(),
            "Search completed"
        );
        Ok(hits)
    }

    async fn list_collections(&self, ctx: &RequestContext) -> Result<Value, ToolError> {
        let output = self.tools.invoke(ToolKind::ListCollections, &[], None).await?;
        tracing::debug!(request_id = %ctx.request_id, "Listed collections");
        parse_tool_json(ToolKind::ListCollections, &output.stdout)
    }

    async fn dump_collection(
        &self,
        ctx: &RequestContext,
        name: &str,
    ) -> Result<Value, ToolError> {
        let output = self
            .tools
            .invoke(ToolKind::DumpCollection, &[name.to_string()], None)
            .await?;
        tracing::debug!(request_id = %ctx.request_id, collection = name, "Dumped collection");
        parse_tool_json(ToolKind::DumpCollection, &output.stdout)
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

fn parse_tool_json(kind: ToolKind, stdout: &str) -> Result<Value, ToolError> {
    let line = first_json_line(stdout).ok_or(ToolError::EmptyOutput {
        tool: kind.script_name(),
    })?;
    serde_json::from_str(line).map_err(|source| ToolError::MalformedOutput {
        tool: kind.script_name(),
        source,
    })
}

fn mentions_missing_collection(details: &str) -> bool {
    let lowered = details.to_lowercase();
    lowered.contains("does not exist") || lowered.contains("does not exists")
}

fn tool_reported_error(value: &Value) -> Option<String> {
    let object = value.as_object()?;
    let error = object.get("error")?;
    let details = object
        .get("details")
        .and_then(Value::as_str)
        .unwrap_or_else(|| error.as_str().unwrap_or_default());
    Some(details.to_string())
}
