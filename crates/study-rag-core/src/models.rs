//! Core data models that flow through ingestion and query.
//!
//! Ingestion turns a [`Document`] into [`Chunk`]s which the vector index
//! owns once embedded. Query time produces an ephemeral
//! [`RetrievalResult`] and [`ConfidenceDecision`], and the caller receives
//! either an answer or [`StudyMaterials`].

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// An uploaded document, alive only for the duration of one ingestion.
#[derive(Debug, Clone)]
pub struct Document {
    /// Content-derived identifier: identical bytes give identical ids.
    pub id: String,
    /// Original file name as supplied by the uploader.
    pub name: String,
    /// MIME type used to pick an extractor.
    pub content_type: String,
    /// Raw payload.
    pub bytes: Vec<u8>,
    /// Page count, filled in by the extractor when the format has pages.
    pub page_count: Option<usize>,
}

impl Document {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let digest = format!("{:x}", hasher.finalize());
        Self {
            id: digest[..32].to_string(),
            name: name.into(),
            content_type: content_type.into(),
            bytes,
            page_count: None,
        }
    }

    /// Payload size in bytes.
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// A contiguous slice of the cleaned document text.
///
/// `text` is always exactly `source[start_offset..end_offset]`, so
/// consecutive chunks can be stitched back together by dropping the bytes
/// they share.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Deterministic UUID derived from the document id and sequence index.
    pub id: String,
    pub document_id: String,
    /// Position in document order, contiguous from 0.
    pub sequence_index: usize,
    pub text: String,
    /// Byte offset of the first character in the cleaned text.
    pub start_offset: usize,
    /// Byte offset one past the last character.
    pub end_offset: usize,
    /// SHA-256 of `text`.
    pub hash: String,
}

/// One retrieval hit.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Cosine similarity in `[-1.0, 1.0]`.
    pub score: f32,
}

/// Hits ordered by descending score (ties by ascending sequence index).
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetrievalResult {
    pub hits: Vec<ScoredChunk>,
}

impl RetrievalResult {
    pub fn top_score(&self) -> Option<f32> {
        self.hits.first().map(|h| h.score)
    }

    pub fn second_score(&self) -> Option<f32> {
        self.hits.get(1).map(|h| h.score)
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }
}

/// Why the confidence gate decided the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateReason {
    /// Evidence is strong enough to answer.
    Supported,
    /// Retrieval returned nothing.
    NoResults,
    /// Best match scored under the threshold.
    BelowThreshold,
    /// A lone moderate match with nothing comparable behind it.
    IsolatedMatch,
}

/// Output of the confidence gate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConfidenceDecision {
    pub sufficient: bool,
    pub top_score: f32,
    /// `top - second`, when there is a second hit.
    pub gap: Option<f32>,
    pub reason: GateReason,
}

/// A question/answer study card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flashcard {
    pub id: String,
    pub question: String,
    pub answer: String,
}

/// The bundle returned by the ingestion entry point.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StudyMaterials {
    pub summary: String,
    pub notes: Vec<String>,
    pub flashcards: Vec<Flashcard>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_id_is_content_derived() {
        let a = Document::new("a.pdf", "application/pdf", b"same bytes".to_vec());
        let b = Document::new("b.pdf", "application/pdf", b"same bytes".to_vec());
        let c = Document::new("a.pdf", "application/pdf", b"other bytes".to_vec());
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
        assert_eq!(a.id.len(), 32);
        assert_eq!(a.size(), 10);
    }

    #[test]
    fn retrieval_result_scores() {
        let empty = RetrievalResult::default();
        assert!(empty.top_score().is_none());
        assert!(empty.second_score().is_none());
        assert!(empty.is_empty());
    }
}
