//! Error taxonomy shared by every stage of the pipeline.
//!
//! Each variant maps to a stable, machine-readable [`RagError::kind`] code
//! that frontends forward to callers in `{ "error": { "kind", "message" } }`
//! bodies. A confidence *decline* is deliberately absent: refusing to answer
//! is a successful outcome, not an error.

use thiserror::Error;

/// Failures raised by the ingestion and query pipelines.
#[derive(Debug, Error)]
pub enum RagError {
    /// The upload exceeds the configured size limit. Raised before extraction.
    #[error("document is {size} bytes, which exceeds the {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },

    /// No usable text could be pulled out of the document.
    #[error("no readable text found in document: {0}")]
    UnreadableDocument(String),

    /// The embedding backend could not be reached or returned garbage.
    #[error("embedding backend unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// The generation backend could not be reached.
    #[error("generation backend unavailable: {0}")]
    GenerationUnavailable(String),

    /// Ingestion did not finish inside its time budget.
    #[error("ingestion exceeded its {budget_secs}s time budget")]
    IngestionTimeout { budget_secs: u64 },

    /// A query arrived before any document finished ingesting.
    #[error("no document has been ingested yet")]
    IndexNotReady,

    /// `search` was called on an index slot that was never built.
    #[error("vector index is empty")]
    EmptyIndex,

    /// The document would produce more chunks than allowed.
    #[error("document produced more than {limit} chunks")]
    TooManyChunks { limit: usize },

    /// Query and index vectors come from different embedding spaces.
    #[error("vector dimension mismatch: index has {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Another ingestion already owns this session.
    #[error("an ingestion is already running for this session")]
    IngestionInProgress,

    /// The caller abandoned the ingestion.
    #[error("ingestion was cancelled")]
    Cancelled,

    /// Malformed input from the caller.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl RagError {
    /// Stable snake_case code for this error.
    pub fn kind(&self) -> &'static str {
        match self {
            RagError::PayloadTooLarge { .. } => "payload_too_large",
            RagError::UnreadableDocument(_) => "unreadable_document",
            RagError::EmbeddingUnavailable(_) => "embedding_unavailable",
            RagError::GenerationUnavailable(_) => "generation_unavailable",
            RagError::IngestionTimeout { .. } => "ingestion_timeout",
            RagError::IndexNotReady => "index_not_ready",
            RagError::EmptyIndex => "empty_index",
            RagError::TooManyChunks { .. } => "too_many_chunks",
            RagError::DimensionMismatch { .. } => "dimension_mismatch",
            RagError::IngestionInProgress => "ingestion_in_progress",
            RagError::Cancelled => "cancelled",
            RagError::InvalidRequest(_) => "invalid_request",
        }
    }

    /// True for failures of an external backend rather than of the input.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            RagError::EmbeddingUnavailable(_)
                | RagError::GenerationUnavailable(_)
                | RagError::IngestionTimeout { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, RagError>;
