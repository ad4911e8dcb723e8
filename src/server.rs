//! HTTP frontend.
//!
//! A thin JSON surface over one [`Session`]: upload a PDF, ask questions
//! about it, reset. All pipeline work happens in [`Ingestor`] and
//! [`QueryEngine`]; handlers only translate requests and errors.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/api/health` | Liveness check (returns version) |
//! | `GET`  | `/api/status` | Session phase and current document |
//! | `POST` | `/api/process-pdf` | Multipart upload (field `pdf`) → study materials |
//! | `POST` | `/api/query` | `{ "message": "..." }` → `{ "result": "..." }` |
//! | `POST` | `/api/reset` | Drop the current document and index |
//!
//! # Error Contract
//!
//! Every failure is returned as
//!
//! ```json
//! { "error": { "kind": "index_not_ready", "message": "no document has been ingested yet" } }
//! ```
//!
//! where `kind` is [`RagError::kind`]. A confidence decline is not an
//! error: `/api/query` answers `200` with the decline message as `result`.
//!
//! | Kind | Status |
//! |------|--------|
//! | `invalid_request` | 400 |
//! | `payload_too_large` | 413 |
//! | `unreadable_document`, `too_many_chunks` | 422 |
//! | `index_not_ready`, `empty_index`, `ingestion_in_progress`, `cancelled` | 409 |
//! | `embedding_unavailable`, `generation_unavailable` | 503 |
//! | `ingestion_timeout` | 504 |
//! | `dimension_mismatch` | 500 |
//!
//! An upload whose client disconnects mid-ingestion drops the handler
//! future, which cancels the ingestion and leaves the session in `error`.

use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use study_rag_core::embedding::Embedder;
use study_rag_core::models::{Document, StudyMaterials};
use study_rag_core::RagError;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::extract::{content_type_for, MIME_PDF};
use crate::generation::{create_generator, Generator};
use crate::ingest::Ingestor;
use crate::query::QueryEngine;
use crate::session::{DocumentInfo, Phase, Session};
use crate::synth::Synthesizer;

/// Multipart framing allowance on top of the document size limit.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    session: Arc<Session>,
    ingestor: Ingestor,
    queries: QueryEngine,
}

impl AppState {
    pub fn new(config: Config, embedder: Arc<dyn Embedder>, generator: Arc<dyn Generator>) -> Self {
        let config = Arc::new(config);
        let synthesizer = Synthesizer::new(generator);
        Self {
            ingestor: Ingestor::new(config.clone(), embedder.clone(), synthesizer.clone()),
            queries: QueryEngine::new(&config, embedder, synthesizer),
            session: Arc::new(Session::new()),
            config,
        }
    }

    /// Build the configured backends and wrap them in fresh state.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let generator = create_generator(&config.generation)?;
        Ok(Self::new(config, embedder, generator))
    }

    pub fn session(&self) -> &Session {
        &self.session
    }
}

/// The API router with CORS, request tracing and the upload body limit.
pub fn router(state: AppState) -> Router {
    let body_limit = state.config.limits.max_upload_bytes + MULTIPART_OVERHEAD;
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(handle_health))
        .route("/api/status", get(handle_status))
        .route("/api/process-pdf", post(handle_process_pdf))
        .route("/api/query", post(handle_query))
        .route("/api/reset", post(handle_reset))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `[server].bind` and serve until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let state = AppState::from_config(config.clone())?;
    info!(
        embedder = %config.embedding.provider,
        generator = %config.generation.provider,
        "backends ready"
    );

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    info!("listening on http://{}", bind_addr);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    kind: &'static str,
    message: String,
}

/// A pipeline error on its way out as an HTTP response.
pub struct AppError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        if err.is_infrastructure() {
            error!(kind = err.kind(), "backend failure: {err}");
        } else {
            debug!(kind = err.kind(), "request rejected: {err}");
        }
        Self {
            status: status_for(&err),
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                kind: self.kind,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

pub fn status_for(err: &RagError) -> StatusCode {
    match err {
        RagError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        RagError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        RagError::UnreadableDocument(_) | RagError::TooManyChunks { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        RagError::IndexNotReady
        | RagError::EmptyIndex
        | RagError::IngestionInProgress
        | RagError::Cancelled => StatusCode::CONFLICT,
        RagError::EmbeddingUnavailable(_) | RagError::GenerationUnavailable(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        RagError::IngestionTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        RagError::DimensionMismatch { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn invalid(message: impl Into<String>) -> AppError {
    RagError::InvalidRequest(message.into()).into()
}

// ============ GET /api/health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============ GET /api/status ============

#[derive(Serialize)]
struct StatusResponse {
    session: String,
    #[serde(flatten)]
    phase: Phase,
    document: Option<DocumentInfo>,
}

async fn handle_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        session: state.session.id().to_string(),
        phase: state.session.phase(),
        document: state.session.document(),
    })
}

// ============ POST /api/process-pdf ============

/// Reads the `pdf` field, ingests it, and returns study materials.
async fn handle_process_pdf(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<StudyMaterials>, AppError> {
    let limit = state.config.limits.max_upload_bytes;
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("pdf") {
            continue;
        }
        let name = field.file_name().unwrap_or("upload.pdf").to_string();
        if content_type_for(&name) != Some(MIME_PDF) {
            return Err(invalid(format!("only PDF files are accepted, got {name}")));
        }
        let bytes = field.bytes().await.map_err(multipart_error)?;
        upload = Some((name, bytes.to_vec()));
        break;
    }

    let (name, bytes) = upload.ok_or_else(|| invalid("missing multipart field `pdf`"))?;
    if bytes.len() > limit {
        return Err(RagError::PayloadTooLarge {
            size: bytes.len(),
            limit,
        }
        .into());
    }

    let doc = Document::new(name, MIME_PDF, bytes);
    let materials = state.ingestor.process(&state.session, doc, None).await?;
    Ok(Json(materials))
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError {
            status: StatusCode::PAYLOAD_TOO_LARGE,
            kind: "payload_too_large",
            message: err.body_text(),
        }
    } else {
        invalid(err.body_text())
    }
}

// ============ POST /api/query ============

#[derive(Deserialize)]
struct QueryRequest {
    message: String,
}

#[derive(Serialize)]
struct QueryResponse {
    result: String,
}

async fn handle_query(
    State(state): State<AppState>,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, AppError> {
    let Json(req) =
        body.map_err(|e| invalid(format!("message is required: {}", e.body_text())))?;
    let outcome = state.queries.ask(&state.session, &req.message).await?;
    Ok(Json(QueryResponse {
        result: outcome.message().to_string(),
    }))
}

// ============ POST /api/reset ============

async fn handle_reset(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.session.reset();
    Json(serde_json::json!({ "status": "reset" }))
}
