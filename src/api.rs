//! HTTP surface for the document QA service.
//!
//! - `GET /` – Service banner with the endpoint catalog.
//! - `GET /health` – Liveness probe, always `{"status": "healthy"}`.
//! - `GET /metrics` – Document, chunk, and question counters.
//! - `POST /qa` – Multipart upload of `questions_file` (`.json`) and `document_file`
//!   (`.pdf` or `.json`). Both parts are written to a request-scoped temporary directory,
//!   parsed, and answered in a fresh QA session.
//! - `POST /qa/batch` – JSON body with `questions` and `document_text`, answered the same way.
//!
//! Successful answers return `{"results": {question: answer}}`; when some questions failed an
//! `errors` object lists their messages. Every error response is `{"detail": message}`.

use crate::loader::{self, DocumentKind, LoaderError};
use crate::qa::{AnswerMap, QaApi, QaError, types::Failures};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{
        DefaultBodyLimit, Multipart, State, multipart::MultipartRejection,
        rejection::JsonRejection,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const QUESTIONS_FIELD: &str = "questions_file";
const DOCUMENT_FIELD: &str = "document_file";

/// Build the HTTP router exposing the QA API surface.
pub fn create_router<S>(service: Arc<S>, max_upload_bytes: usize) -> Router
where
    S: QaApi + 'static,
{
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/metrics", get(get_metrics::<S>))
        .route("/qa", post(answer_upload::<S>))
        .route("/qa/batch", post(answer_batch::<S>))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(service)
}

/// Service banner listing the available endpoints.
async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "message": "Document QA API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "/": "Service information",
            "/health": "Health check",
            "/metrics": "Question answering counters",
            "/qa": "Upload questions_file (.json) and document_file (.pdf or .json) as multipart form data",
            "/qa/batch": "Answer questions against raw document text sent as JSON",
        }
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<crate::metrics::MetricsSnapshot>
where
    S: QaApi,
{
    Json(service.metrics_snapshot())
}

/// Response body shared by `/qa` and `/qa/batch`.
#[derive(Serialize)]
struct QaResponse<'a> {
    results: &'a AnswerMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<Failures<'a>>,
}

fn answers_response(answers: &AnswerMap) -> Response {
    let failures = answers.failures();
    Json(QaResponse {
        results: answers,
        errors: (!failures.is_empty()).then_some(failures),
    })
    .into_response()
}

/// A file part received in the multipart form.
struct UploadedFile {
    file_name: String,
    contents: Bytes,
}

/// Answer questions from an uploaded JSON file against an uploaded PDF or JSON document.
async fn answer_upload<S>(
    State(service): State<Arc<S>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, AppError>
where
    S: QaApi,
{
    let mut multipart = multipart?;
    let mut questions_file = None;
    let mut document_file = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| AppError::bad_request(format!("Invalid multipart body: {error}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name != QUESTIONS_FIELD && name != DOCUMENT_FIELD {
            tracing::debug!(field = %name, "Ignoring unexpected multipart field");
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let contents = field.bytes().await.map_err(|error| {
            AppError::bad_request(format!("Failed to read {name}: {error}"))
        })?;
        let upload = UploadedFile {
            file_name,
            contents,
        };
        if name == QUESTIONS_FIELD {
            questions_file = Some(upload);
        } else {
            document_file = Some(upload);
        }
    }

    let questions_file = questions_file
        .ok_or_else(|| AppError::bad_request(format!("Missing {QUESTIONS_FIELD}")))?;
    if DocumentKind::from_file_name(&questions_file.file_name) != Some(DocumentKind::Json) {
        return Err(AppError::bad_request("Questions file must be a JSON file"));
    }
    let document_file = document_file
        .ok_or_else(|| AppError::bad_request(format!("Missing {DOCUMENT_FIELD}")))?;
    let document_kind = DocumentKind::from_file_name(&document_file.file_name)
        .ok_or_else(|| AppError::bad_request("Document file must be a PDF or JSON file"))?;

    tracing::info!(
        questions_file = %questions_file.file_name,
        document_file = %document_file.file_name,
        document_bytes = document_file.contents.len(),
        "QA upload received"
    );

    // Removed when dropped, on every return path below.
    let workspace = TempDir::new().map_err(|error| AppError::upload_failure(&error))?;
    let questions_path = workspace.path().join("questions.json");
    let document_path = workspace
        .path()
        .join(format!("document{}", document_kind.extension()));
    persist(&questions_path, &questions_file.contents).await?;
    persist(&document_path, &document_file.contents).await?;

    let questions = loader::load_questions(&questions_path).await?;
    if questions.is_empty() {
        return Err(QaError::NoQuestions.into());
    }
    let document_text = loader::load_document(&document_path, document_kind).await?;
    if document_text.trim().is_empty() {
        return Err(QaError::EmptyDocument.into());
    }

    let answers = service
        .answer_document(document_text, questions)
        .await
        .map_err(|error| AppError::from_qa(error, "Error processing files"))?;
    Ok(answers_response(&answers))
}

async fn persist(path: &Path, contents: &[u8]) -> Result<(), AppError> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|error| AppError::upload_failure(&error))
}

/// Request body for `POST /qa/batch`.
#[derive(Deserialize)]
struct BatchRequest {
    /// Questions to answer, in order.
    questions: Vec<String>,
    /// Raw document text to index.
    document_text: String,
}

/// Answer questions against raw document text.
async fn answer_batch<S>(
    State(service): State<Arc<S>>,
    request: Result<Json<BatchRequest>, JsonRejection>,
) -> Result<Response, AppError>
where
    S: QaApi,
{
    let Json(BatchRequest {
        questions,
        document_text,
    }) = request?;
    if questions.is_empty() {
        return Err(QaError::NoQuestions.into());
    }
    if document_text.trim().is_empty() {
        return Err(AppError::bad_request("Document text is empty"));
    }
    tracing::info!(
        questions = questions.len(),
        document_chars = document_text.len(),
        "QA batch received"
    );

    let answers = service
        .answer_document(document_text, questions)
        .await
        .map_err(|error| AppError::from_qa(error, "Error processing"))?;
    Ok(answers_response(&answers))
}

/// Error rendered as `{"detail": message}` with a status code.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    detail: String,
}

impl AppError {
    fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }

    fn internal(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: detail.into(),
        }
    }

    fn upload_failure(error: &std::io::Error) -> Self {
        Self::internal(format!("Error processing files: {error}"))
    }

    /// Map a pipeline error; anything not caused by the request becomes a 500 with `prefix`.
    fn from_qa(error: QaError, prefix: &str) -> Self {
        if error.is_client_error() {
            Self::bad_request(error.to_string())
        } else {
            tracing::error!(error = %error, "Question answering failed");
            Self::internal(format!("{prefix}: {error}"))
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

impl From<LoaderError> for AppError {
    fn from(error: LoaderError) -> Self {
        tracing::warn!(error = %error, "Rejected upload");
        Self::bad_request(error.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: rejection.status(),
            detail: rejection.body_text(),
        }
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        Self {
            status: rejection.status(),
            detail: rejection.body_text(),
        }
    }
}

impl From<QaError> for AppError {
    fn from(error: QaError) -> Self {
        Self::from_qa(error, "Error processing")
    }
}
