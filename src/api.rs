//! HTTP surface for the studyvault backend.
//!
//! The router exposes a compact set of endpoints:
//!
//! - `GET /health` – Liveness probe reporting the bound port.
//! - `POST /upload` – Multipart upload registering one file blob and its
//!   metadata record (idempotent; a repeat upload returns a warning).
//! - `POST /process` – Multipart batch running normalize → extract → index
//!   and returning one parsed result per file, text included.
//! - `POST /search` – JSON similarity query scoped to the caller's
//!   collection.
//! - `POST /webhooks/identity` – Signed identity-provider events mapped onto
//!   the profile table.
//! - `GET /collections`, `GET /collection/:name` – Debug views proxying the
//!   vector-index inspection tools.
//! - `GET /metrics` – Service activity counters.

use crate::identity::{IdentityApi, IdentityError, profile::IdentityEvent, signature};
use crate::metrics::ServiceMetrics;
use crate::orchestrator::{
    IncomingFile, OrchestratorApi, ProcessError, RequestContext, SearchError, UploadError,
    UploadStatus,
};
use crate::store::StoreError;
use crate::tools::ToolError;
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;

/// Largest accepted request body; uploads carry whole documents.
const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Pipeline implementation behind the upload/process/search routes.
    pub orchestrator: Arc<dyn OrchestratorApi>,
    /// Identity event processor behind the webhook route.
    pub identity: Arc<dyn IdentityApi>,
    /// Shared activity counters.
    pub metrics: Arc<ServiceMetrics>,
    /// Secret used to verify webhook signatures.
    pub webhook_secret: String,
    /// Port the server is listening on, reported by `/health`.
    pub port: u16,
}

/// Build the HTTP router exposing the service API surface.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/upload", post(upload_file))
        .route("/process", post(process_files))
        .route("/search", post(search))
        .route("/webhooks/identity", post(identity_webhook))
        .route("/collections", get(list_collections))
        .route("/collection/:name", get(dump_collection))
        .route("/metrics", get(get_metrics))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

/// Liveness probe.
async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "status": "ok", "port": state.port }))
}

/// Register one uploaded file: store the blob, write the metadata record.
async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Value>, AppError> {
    let mut user_id: Option<String> = None;
    let mut file_id: Option<String> = None;
    let mut filename: Option<String> = None;
    let mut bytes: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| AppError::client("Malformed multipart body"))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "user_id" => user_id = Some(read_text_field(field).await?),
            "file_id" => file_id = Some(read_text_field(field).await?),
            "file" => {
                filename = field.file_name().map(str::to_string);
                bytes = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|_| AppError::client("Malformed multipart body"))?
                        .to_vec(),
                );
            }
            _ => {}
        }
    }

    let user_id = require_field(user_id, "user_id")?;
    let file_id = require_field(file_id, "file_id")?;
    let bytes = bytes.ok_or_else(|| AppError::client("Missing required field: file"))?;
    if bytes.is_empty() {
        return Err(AppError::client("Uploaded file is empty"));
    }
    let filename = filename.unwrap_or_else(|| file_id.clone());

    let ctx = RequestContext::new();
    let outcome = state
        .orchestrator
        .register_upload(&ctx, &user_id, &file_id, &filename, bytes)
        .await?;

    let body = match outcome.status {
        UploadStatus::AlreadyUploaded => json!({
            "warning": "File already uploaded.",
            "user_id": user_id,
            "file_id": file_id,
            "filename": filename,
            "s3_key": outcome.s3_key,
        }),
        UploadStatus::BlobRestored | UploadStatus::Stored => json!({
            "message": "File uploaded successfully",
            "user_id": user_id,
            "file_id": file_id,
            "filename": filename,
            "s3_key": outcome.s3_key,
        }),
    };
    Ok(Json(body))
}

/// Run the normalize → extract → index pipeline over a multipart batch.
///
/// Files pair positionally with repeated `file_id` fields; per-file topics
/// arrive as `topic_<filename>` fields.
async fn process_files(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Value>, AppError> {
    let mut user_id: Option<String> = None;
    let mut class_name: Option<String> = None;
    let mut file_ids: Vec<String> = Vec::new();
    let mut topics: HashMap<String, String> = HashMap::new();
    let mut files: Vec<(String, Vec<u8>)> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| AppError::client("Malformed multipart body"))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "user_id" => user_id = Some(read_text_field(field).await?),
            "className" => class_name = Some(read_text_field(field).await?),
            "file_id" => file_ids.push(read_text_field(field).await?),
            "files" => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| AppError::client("Uploaded file has no filename"))?;
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|_| AppError::client("Malformed multipart body"))?
                    .to_vec();
                files.push((filename, bytes));
            }
            other => {
                if let Some(filename) = other.strip_prefix("topic_") {
                    let filename = filename.to_string();
                    topics.insert(filename, read_text_field(field).await?);
                }
            }
        }
    }

    if files.is_empty() {
        return Err(AppError::client("No files provided"));
    }
    let user_id = require_field(user_id, "user_id")?;
    let class_name = require_field(class_name, "className")?;
    if file_ids.len() != files.len() {
        return Err(AppError::client(
            "Number of file_id fields must match number of files",
        ));
    }

    let incoming: Vec<IncomingFile> = files
        .into_iter()
        .zip(file_ids)
        .map(|((filename, bytes), file_id)| IncomingFile {
            topic: topics.get(&filename).cloned(),
            file_id,
            filename,
            bytes,
        })
        .collect();

    let ctx = RequestContext::new();
    let results = state
        .orchestrator
        .process_batch(&ctx, &user_id, &class_name, incoming)
        .await?;
    Ok(Json(serde_json::to_value(results).map_err(|err| {
        AppError::internal("Failed to encode results", Some(err.to_string()))
    })?))
}

/// Request body for `POST /search`.
#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    user_id: String,
    #[serde(default)]
    topic: Option<String>,
}

/// Query the caller's collection for the nearest indexed chunks.
async fn search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<Value>, AppError> {
    if request.query.trim().is_empty() {
        return Err(AppError::client("Missing required field: query"));
    }
    if request.user_id.trim().is_empty() {
        return Err(AppError::client("Missing required field: user_id"));
    }

    let ctx = RequestContext::new();
    let hits = state
        .orchestrator
        .search(&ctx, &request.query, &request.user_id, request.topic.as_deref())
        .await?;
    Ok(Json(serde_json::to_value(hits).map_err(|err| {
        AppError::internal("Failed to encode results", Some(err.to_string()))
    })?))
}

// The provider sends both header families; accept either.
const SVIX_ID_HEADER: &str = "svix-id";
const SVIX_TIMESTAMP_HEADER: &str = "svix-timestamp";
const SVIX_SIGNATURE_HEADER: &str = "svix-signature";
const WEBHOOK_ID_HEADER: &str = "webhook-id";
const WEBHOOK_TIMESTAMP_HEADER: &str = "webhook-timestamp";
const WEBHOOK_SIGNATURE_HEADER: &str = "webhook-signature";

/// Handle one signed identity-provider event.
///
/// The signature is verified against the raw body before the JSON is
/// parsed; unsigned or tampered deliveries never reach the profile table.
async fn identity_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Response, AppError> {
    let ctx = RequestContext::new();

    let message_id = header_str(&headers, SVIX_ID_HEADER, WEBHOOK_ID_HEADER)?;
    let timestamp = header_str(&headers, SVIX_TIMESTAMP_HEADER, WEBHOOK_TIMESTAMP_HEADER)?;
    let signature_header =
        header_str(&headers, SVIX_SIGNATURE_HEADER, WEBHOOK_SIGNATURE_HEADER)?;
    let now = OffsetDateTime::now_utc().unix_timestamp();
    if let Err(err) = signature::verify_signature(
        &state.webhook_secret,
        message_id,
        timestamp,
        signature_header,
        &body,
        now,
    ) {
        tracing::warn!(request_id = %ctx.request_id, error = %err, "Webhook signature rejected");
        return Err(AppError::unauthorized("Webhook signature verification failed"));
    }

    let event: IdentityEvent =
        serde_json::from_str(&body).map_err(|_| AppError::client("Invalid JSON payload"))?;

    match state.identity.apply_event(&ctx, event).await {
        Ok(outcome) => {
            state.metrics.record_webhook_event();
            tracing::info!(request_id = %ctx.request_id, ?outcome, "Webhook processed");
            Ok(Json(json!({
                "success": true,
                "message": "Webhook processed successfully",
                "requestId": ctx.request_id,
            }))
            .into_response())
        }
        Err(IdentityError::UnknownEvent { kind }) => Ok((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": format!("Unhandled event type: {kind}") })),
        )
            .into_response()),
        Err(IdentityError::MissingData) => Ok((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Invalid webhook payload" })),
        )
            .into_response()),
        Err(IdentityError::Store(err)) => {
            tracing::error!(request_id = %ctx.request_id, error = %err, "Webhook store failure");
            Ok((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "success": false,
                    "error": "Failed to process webhook",
                    "details": err.to_string(),
                    "requestId": ctx.request_id,
                })),
            )
                .into_response())
        }
    }
}

/// Debug view: list vector-index collections.
async fn list_collections(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let ctx = RequestContext::new();
    let value = state.orchestrator.list_collections(&ctx).await?;
    Ok(Json(value))
}

/// Debug view: dump one collection's contents.
async fn dump_collection(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, AppError> {
    let ctx = RequestContext::new();
    let value = state.orchestrator.dump_collection(&ctx, &name).await?;
    Ok(Json(value))
}

/// Return the service activity counters.
async fn get_metrics(State(state): State<AppState>) -> Json<Value> {
    let snapshot = state.metrics.snapshot();
    Json(json!({
        "files_uploaded": snapshot.files_uploaded,
        "files_processed": snapshot.files_processed,
        "searches_run": snapshot.searches_run,
        "webhook_events": snapshot.webhook_events,
    }))
}

async fn read_text_field(
    field: axum::extract::multipart::Field<'_>,
) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|_| AppError::client("Malformed multipart body"))
}

fn require_field(value: Option<String>, name: &str) -> Result<String, AppError> {
    value
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| AppError::client(&format!("Missing required field: {name}")))
}

fn header_str<'h>(
    headers: &'h HeaderMap,
    name: &str,
    fallback: &str,
) -> Result<&'h str, AppError> {
    headers
        .get(name)
        .or_else(|| headers.get(fallback))
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::unauthorized(&format!("Missing webhook header: {name}")))
}

/// JSON error response with an `error` field and optional `details`.
struct AppError {
    status: StatusCode,
    error: String,
    details: Option<String>,
}

impl AppError {
    fn client(message: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: message.to_string(),
            details: None,
        }
    }

    fn unauthorized(message: &str) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            error: message.to_string(),
            details: None,
        }
    }

    fn internal(message: &str, details: Option<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: message.to_string(),
            details,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut body = json!({ "error": self.error });
        if let Some(details) = self.details {
            body["details"] = json!(details);
        }
        (self.status, Json(body)).into_response()
    }
}

impl From<ToolError> for AppError {
    fn from(error: ToolError) -> Self {
        let details = match &error {
            ToolError::Failed { stderr, .. } => Some(stderr.clone()),
            other => Some(other.to_string()),
        };
        Self::internal("Tool execution failed", details)
    }
}

impl From<StoreError> for AppError {
    fn from(error: StoreError) -> Self {
        Self::internal("Store request failed", Some(error.to_string()))
    }
}

impl From<UploadError> for AppError {
    fn from(error: UploadError) -> Self {
        match error {
            UploadError::Store(inner) => inner.into(),
        }
    }
}

impl From<ProcessError> for AppError {
    fn from(error: ProcessError) -> Self {
        match error {
            ProcessError::Tool(inner) => inner.into(),
            ProcessError::Store(inner) => inner.into(),
            other => Self::internal("Processing failed", Some(other.to_string())),
        }
    }
}

impl From<SearchError> for AppError {
    fn from(error: SearchError) -> Self {
        match error {
            SearchError::NoIndexedContent => Self::client(
                "No indexed content found. Please upload and parse some files first.",
            ),
            SearchError::Tool(inner) => inner.into(),
            SearchError::MalformedOutput { details } => {
                Self::internal("Search failed", Some(details))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::EventOutcome;
    use crate::orchestrator::{ParsedResult, SearchHit, UploadOutcome};
    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request},
    };
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;
    use tower::ServiceExt;

    const SECRET: &str = "whsec_MfKQ9r8GKYqrTwjUPD8ILPZIo2LaLaSw";

    struct StubOrchestrator {
        upload: Option<UploadOutcome>,
        search: Result<Vec<SearchHit>, fn() -> SearchError>,
    }

    impl Default for StubOrchestrator {
        fn default() -> Self {
            Self {
                upload: None,
                search: Ok(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl OrchestratorApi for StubOrchestrator {
        async fn register_upload(
            &self,
            _ctx: &RequestContext,
            _user_id: &str,
            file_id: &str,
            _filename: &str,
            _bytes: Vec<u8>,
        ) -> Result<UploadOutcome, UploadError> {
            Ok(self.upload.clone().unwrap_or(UploadOutcome {
                status: UploadStatus::Stored,
                s3_key: format!("uploads/{file_id}"),
            }))
        }

        async fn process_batch(
            &self,
            _ctx: &RequestContext,
            user_id: &str,
            class_name: &str,
            files: Vec<IncomingFile>,
        ) -> Result<Vec<ParsedResult>, ProcessError> {
            Ok(files
                .into_iter()
                .map(|file| ParsedResult {
                    s3_key: format!("uploads/{}", file.file_id),
                    filename: file.filename,
                    class: class_name.to_string(),
                    topic: file.topic.unwrap_or_default(),
                    text: "stub text".into(),
                    file_id: file.file_id,
                    user_id: user_id.to_string(),
                    file_type: "document".into(),
                    num_pages: None,
                })
                .collect())
        }

        async fn search(
            &self,
            _ctx: &RequestContext,
            _query: &str,
            _user_id: &str,
            _topic: Option<&str>,
        ) -> Result<Vec<SearchHit>, SearchError> {
            match &self.search {
                Ok(hits) => Ok(hits.clone()),
                Err(make) => Err(make()),
            }
        }

        async fn list_collections(&self, _ctx: &RequestContext) -> Result<Value, ToolError> {
            Ok(json!({ "collections": ["user_u1"] }))
        }

        async fn dump_collection(
            &self,
            _ctx: &RequestContext,
            name: &str,
        ) -> Result<Value, ToolError> {
            Ok(json!({ "collection": name, "documents": [] }))
        }

        fn metrics_snapshot(&self) -> crate::metrics::MetricsSnapshot {
            ServiceMetrics::new().snapshot()
        }
    }

    struct StubIdentity {
        outcome: Result<EventOutcome, fn() -> IdentityError>,
    }

    #[async_trait]
    impl IdentityApi for StubIdentity {
        async fn apply_event(
            &self,
            _ctx: &RequestContext,
            event: IdentityEvent,
        ) -> Result<EventOutcome, IdentityError> {
            match &self.outcome {
                Ok(outcome) => {
                    if event.kind == "session.created" {
                        return Err(IdentityError::UnknownEvent { kind: event.kind });
                    }
                    Ok(*outcome)
                }
                Err(make) => Err(make()),
            }
        }
    }

    fn app(orchestrator: StubOrchestrator, identity: StubIdentity) -> Router {
        create_router(AppState {
            orchestrator: Arc::new(orchestrator),
            identity: Arc::new(identity),
            metrics: Arc::new(ServiceMetrics::new()),
            webhook_secret: SECRET.into(),
            port: 4000,
        })
    }

    fn default_app() -> Router {
        app(
            StubOrchestrator::default(),
            StubIdentity {
                outcome: Ok(EventOutcome::ProfileCreated),
            },
        )
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&bytes).expect("json body")
    }

    const BOUNDARY: &str = "studyvault-test-boundary";

    fn multipart_request(uri: &str, parts: &[(&str, Option<&str>, &str)]) -> Request<Body> {
        let mut body = String::new();
        for (name, filename, value) in parts {
            body.push_str(&format!("--{BOUNDARY}\r\n"));
            match filename {
                Some(filename) => body.push_str(&format!(
                    "content-disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                     content-type: application/octet-stream\r\n\r\n{value}\r\n"
                )),
                None => body.push_str(&format!(
                    "content-disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )),
            }
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));

        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .expect("request")
    }

    fn signed_webhook_request(body: &str) -> Request<Body> {
        let timestamp = OffsetDateTime::now_utc().unix_timestamp();
        let key = BASE64
            .decode(SECRET.strip_prefix("whsec_").unwrap())
            .expect("secret");
        let mut mac = Hmac::<Sha256>::new_from_slice(&key).expect("mac");
        mac.update(format!("msg_1.{timestamp}.{body}").as_bytes());
        let signature = format!("v1,{}", BASE64.encode(mac.finalize().into_bytes()));

        Request::builder()
            .method(Method::POST)
            .uri("/webhooks/identity")
            .header("content-type", "application/json")
            .header(SVIX_ID_HEADER, "msg_1")
            .header(SVIX_TIMESTAMP_HEADER, timestamp.to_string())
            .header(SVIX_SIGNATURE_HEADER, signature)
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    #[tokio::test]
    async fn health_reports_status_and_port() {
        let response = default_app()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["port"], 4000);
    }

    #[tokio::test]
    async fn upload_returns_storage_key_and_message() {
        let request = multipart_request(
            "/upload",
            &[
                ("user_id", None, "u1"),
                ("file_id", None, "f1"),
                ("file", Some("notes.pdf"), "%PDF-"),
            ],
        );
        let response = default_app().oneshot(request).await.expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["message"], "File uploaded successfully");
        assert_eq!(json["user_id"], "u1");
        assert_eq!(json["file_id"], "f1");
        assert_eq!(json["filename"], "notes.pdf");
        assert_eq!(json["s3_key"], "uploads/f1");
    }

    #[tokio::test]
    async fn duplicate_upload_returns_warning() {
        let orchestrator = StubOrchestrator {
            upload: Some(UploadOutcome {
                status: UploadStatus::AlreadyUploaded,
                s3_key: "uploads/f1".into(),
            }),
            ..Default::default()
        };
        let request = multipart_request(
            "/upload",
            &[
                ("user_id", None, "u1"),
                ("file_id", None, "f1"),
                ("file", Some("notes.pdf"), "%PDF-"),
            ],
        );
        let response = app(
            orchestrator,
            StubIdentity {
                outcome: Ok(EventOutcome::ProfileCreated),
            },
        )
        .oneshot(request)
        .await
        .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["warning"], "File already uploaded.");
        assert!(json.get("message").is_none());
    }

    #[tokio::test]
    async fn upload_without_user_id_is_rejected() {
        let request = multipart_request(
            "/upload",
            &[("file_id", None, "f1"), ("file", Some("notes.pdf"), "%PDF-")],
        );
        let response = default_app().oneshot(request).await.expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"], "Missing required field: user_id");
    }

    #[tokio::test]
    async fn process_with_zero_files_is_rejected() {
        let request = multipart_request(
            "/process",
            &[("user_id", None, "u1"), ("className", None, "bio201")],
        );
        let response = default_app().oneshot(request).await.expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"], "No files provided");
    }

    #[tokio::test]
    async fn process_pairs_topics_by_filename() {
        let request = multipart_request(
            "/process",
            &[
                ("user_id", None, "u1"),
                ("className", None, "bio201"),
                ("file_id", None, "f1"),
                ("topic_bio.pdf", None, "plants"),
                ("files", Some("bio.pdf"), "%PDF-"),
            ],
        );
        let response = default_app().oneshot(request).await.expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json[0]["filename"], "bio.pdf");
        assert_eq!(json[0]["class"], "bio201");
        assert_eq!(json[0]["topic"], "plants");
        assert_eq!(json[0]["text"], "stub text");
    }

    #[tokio::test]
    async fn process_with_mismatched_ids_is_rejected() {
        let request = multipart_request(
            "/process",
            &[
                ("user_id", None, "u1"),
                ("className", None, "bio201"),
                ("files", Some("bio.pdf"), "%PDF-"),
            ],
        );
        let response = default_app().oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn search_with_empty_query_is_rejected() {
        let response = default_app()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/search")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        json!({ "query": "  ", "user_id": "u1" }).to_string(),
                    ))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_collection_yields_guidance_not_a_500() {
        let orchestrator = StubOrchestrator {
            search: Err(|| SearchError::NoIndexedContent),
            ..Default::default()
        };
        let response = app(
            orchestrator,
            StubIdentity {
                outcome: Ok(EventOutcome::ProfileCreated),
            },
        )
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/search")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({ "query": "osmosis", "user_id": "u1" }).to_string(),
                ))
                .expect("request"),
        )
        .await
        .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(
            json["error"],
            "No indexed content found. Please upload and parse some files first."
        );
    }

    #[tokio::test]
    async fn webhook_with_valid_signature_succeeds() {
        let body = json!({
            "type": "user.deleted",
            "data": { "id": "ghost" },
            "id": "evt_1"
        })
        .to_string();
        let response = app(
            StubOrchestrator::default(),
            StubIdentity {
                outcome: Ok(EventOutcome::ProfileDeleted { existed: false }),
            },
        )
        .oneshot(signed_webhook_request(&body))
        .await
        .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["message"], "Webhook processed successfully");
        assert!(json["requestId"].as_str().is_some());
    }

    #[tokio::test]
    async fn webhook_without_signature_headers_is_unauthorized() {
        let response = default_app()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/webhooks/identity")
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn webhook_with_bad_signature_is_unauthorized() {
        let body = json!({ "type": "user.created", "data": { "id": "u1" } }).to_string();
        let mut request = signed_webhook_request(&body);
        request.headers_mut().insert(
            SVIX_SIGNATURE_HEADER,
            "v1,Zm9yZ2VkIHNpZ25hdHVyZQ==".parse().unwrap(),
        );

        let response = default_app().oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn webhook_rejects_unknown_event_kinds() {
        let body = json!({
            "type": "session.created",
            "data": { "id": "sess_1" },
            "id": "evt_2"
        })
        .to_string();
        let response = default_app()
            .oneshot(signed_webhook_request(&body))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"], "Unhandled event type: session.created");
    }

    #[tokio::test]
    async fn collection_dump_is_proxied() {
        let response = default_app()
            .oneshot(
                Request::builder()
                    .uri("/collection/user_u1")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["collection"], "user_u1");
    }
}
