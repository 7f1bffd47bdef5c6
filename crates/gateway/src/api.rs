//! Query, document and tool endpoints.
//!
//! Endpoints:
//!
//! - `POST /query`: SSE stream of orchestration events
//! - `POST /upload?collection=`: Ingest a multipart `file`
//! - `GET /documents/{collection}`: List documents in a collection
//! - `DELETE /documents/{collection}/{filename}`: Remove a document
//! - `GET /actions`: Tool catalog
//! - `POST /action`: Run a tool directly

use axum::{
    Router,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::sse::{Event as SseEvent, Sse},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use crate::SharedState;
use ragent_agent::QueryRequest;
use ragent_core::ToolDescriptor;
use ragent_memory::{SUPPORTED_EXTENSIONS, extract_text, is_supported_file};

pub fn api_router(state: SharedState) -> Router {
    Router::new()
        .route("/query", post(query_handler))
        .route("/upload", post(upload_handler))
        .route("/documents/{collection}", get(list_documents_handler))
        .route("/documents/{collection}/{filename}", delete(delete_document_handler))
        .route("/actions", get(list_actions_handler))
        .route("/action", post(action_handler))
        .with_state(state)
}

// ── DTOs ──────────────────────────────────────────────────────────────────

/// Error body for rejected requests.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, detail: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse { detail: detail.into() }))
}

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    pub collection: Option<String>,
}

/// Upload result. Ingestion failures are reported in the body with a 200.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UploadResponse {
    Ingested {
        success: bool,
        filename: String,
        chunks: usize,
        collection: String,
    },
    Failed {
        success: bool,
        error: String,
        filename: String,
    },
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DocumentListResponse {
    pub documents: Vec<String>,
    pub collection: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ActionListResponse {
    pub actions: Vec<ToolDescriptor>,
}

#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    pub action: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ActionResponse {
    pub result: String,
}

// ── Handlers ──────────────────────────────────────────────────────────────

/// `POST /query`: each event becomes one `data: <json>` frame.
async fn query_handler(
    State(state): State<SharedState>,
    Json(payload): Json<QueryRequest>,
) -> Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>> {
    info!(
        collection = %payload.collection,
        conversation_id = %payload.conversation(),
        "Query received"
    );

    let rx = state.orchestration.run_stream(payload);
    let stream = ReceiverStream::new(rx).map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok(SseEvent::default().data(data))
    });

    Sse::new(stream)
}

/// `POST /upload`: save the file under the uploads directory, then index it.
async fn upload_handler(
    State(state): State<SharedState>,
    Query(params): Query<UploadParams>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let collection = params
        .collection
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| state.default_collection.clone());

    let (filename, bytes) = loop {
        let field = multipart
            .next_field()
            .await
            .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("Malformed upload: {e}")))?
            .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "No file uploaded"))?;
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .and_then(|name| std::path::Path::new(name).file_name())
            .and_then(|name| name.to_str())
            .map(str::to_string)
            .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "Uploaded file has no name"))?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("Malformed upload: {e}")))?;
        break (filename, bytes);
    };

    if !is_supported_file(&filename) {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            format!("Unsupported file type. Supported: {}", SUPPORTED_EXTENSIONS.join(", ")),
        ));
    }

    tokio::fs::create_dir_all(&state.uploads_dir)
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("Cannot store upload: {e}")))?;
    let path = state.uploads_dir.join(&filename);
    tokio::fs::write(&path, &bytes)
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("Cannot store upload: {e}")))?;
    info!(file = %path.display(), bytes = bytes.len(), collection = %collection, "Upload saved");

    let failed = |error: String, filename: String| {
        warn!(filename = %filename, error = %error, "Ingestion failed");
        Json(UploadResponse::Failed {
            success: false,
            error,
            filename,
        })
    };

    let extracted = {
        let filename = filename.clone();
        tokio::task::spawn_blocking(move || extract_text(&filename, &bytes)).await
    };
    let text = match extracted {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => return Ok(failed(e.to_string(), filename)),
        Err(e) => return Ok(failed(format!("Text extraction aborted: {e}"), filename)),
    };

    match state.documents.ingest(&collection, &filename, &text).await {
        Ok(report) => Ok(Json(UploadResponse::Ingested {
            success: true,
            filename: report.filename,
            chunks: report.chunks,
            collection: report.collection,
        })),
        Err(e) => Ok(failed(e.to_string(), filename)),
    }
}

/// `GET /documents/{collection}`
async fn list_documents_handler(
    State(state): State<SharedState>,
    Path(collection): Path<String>,
) -> Result<Json<DocumentListResponse>, ApiError> {
    let documents = state
        .documents
        .list_documents(&collection)
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(DocumentListResponse { documents, collection }))
}

/// `DELETE /documents/{collection}/{filename}`
async fn delete_document_handler(
    State(state): State<SharedState>,
    Path((collection, filename)): Path<(String, String)>,
) -> Response {
    match state.documents.delete_document(&collection, &filename).await {
        Ok(true) => {
            info!(collection = %collection, filename = %filename, "Document deleted");
            Json(MessageResponse {
                message: format!("Deleted {filename}"),
            })
            .into_response()
        }
        Ok(false) => api_error(StatusCode::NOT_FOUND, "Document not found").into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// `GET /actions`
async fn list_actions_handler(State(state): State<SharedState>) -> Json<ActionListResponse> {
    Json(ActionListResponse {
        actions: state.tools().list_tools(),
    })
}

/// `POST /action`: tool failures come back as text, never as an HTTP error.
async fn action_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ActionRequest>,
) -> Json<ActionResponse> {
    info!(action = %payload.action, "Direct tool invocation");
    let result = state.tools().execute(&payload.action, payload.parameters).await;
    Json(ActionResponse { result })
}
