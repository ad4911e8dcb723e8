//! In-memory vector index over one document's chunks.
//!
//! The index is built once, in full, from every `(chunk, vector)` pair of
//! an ingestion and is immutable afterwards. Readers share it through an
//! `Arc`, so a rebuild never exposes a half-populated index: the session
//! swaps the pointer only after [`VectorIndex::build`] has returned.
//!
//! # Search
//!
//! Vectors are L2-normalised at build time, so cosine similarity reduces
//! to a dot product against the (normalised) query. Search is brute force,
//! which is exact and fast enough for a single document's chunks.
//!
//! | Guarantee | How |
//! |-----------|-----|
//! | Deterministic order | descending score, ties by ascending `sequence_index` |
//! | Bounded output | `k` clamped to `1..=MAX_TOP_K` and to the entry count |
//! | Consistent space | every vector must have `dims` components |

use serde::Serialize;
use tracing::debug;

use crate::embedding::l2_normalize;
use crate::error::{RagError, Result};
use crate::models::{Chunk, ScoredChunk};

/// Upper bound on hits returned by a single search.
pub const MAX_TOP_K: usize = 20;

/// A chunk paired with its embedding.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// Export view of one entry.
#[derive(Debug, Clone, Serialize)]
pub struct IndexRecord {
    pub chunk_id: String,
    pub document_id: String,
    pub vector: Vec<f32>,
    pub chunk_text: String,
    pub metadata: RecordMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordMetadata {
    pub sequence_index: usize,
    pub start_offset: usize,
    pub end_offset: usize,
    pub hash: String,
    pub model: String,
}

#[derive(Debug)]
pub struct VectorIndex {
    document_id: String,
    model: String,
    dims: usize,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// Build an index from a complete set of entries.
    ///
    /// Fails with [`RagError::EmptyIndex`] when `entries` is empty and with
    /// [`RagError::DimensionMismatch`] when any vector has the wrong length.
    pub fn build(
        document_id: impl Into<String>,
        model: impl Into<String>,
        dims: usize,
        entries: Vec<IndexEntry>,
    ) -> Result<Self> {
        if entries.is_empty() {
            return Err(RagError::EmptyIndex);
        }

        let mut entries = entries;
        for entry in entries.iter_mut() {
            if entry.vector.len() != dims {
                return Err(RagError::DimensionMismatch {
                    expected: dims,
                    actual: entry.vector.len(),
                });
            }
            l2_normalize(&mut entry.vector);
        }
        entries.sort_by_key(|e| e.chunk.sequence_index);

        let index = Self {
            document_id: document_id.into(),
            model: model.into(),
            dims,
            entries,
        };
        debug!(
            document_id = %index.document_id,
            entries = index.entries.len(),
            dims,
            "vector index built"
        );
        Ok(index)
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Chunks in document order.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|e| &e.chunk)
    }

    /// Return the `k` chunks most similar to `query`.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if query.len() != self.dims {
            return Err(RagError::DimensionMismatch {
                expected: self.dims,
                actual: query.len(),
            });
        }

        let mut q = query.to_vec();
        l2_normalize(&mut q);

        let mut scored: Vec<(f32, &IndexEntry)> = self
            .entries
            .iter()
            .map(|e| (dot(&q, &e.vector), e))
            .collect();

        // Entries are stored in sequence order and the sort is stable, so
        // equal scores keep ascending sequence_index.
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        let k = k.clamp(1, MAX_TOP_K).min(scored.len());
        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, e)| ScoredChunk {
                chunk: e.chunk.clone(),
                score: score.clamp(-1.0, 1.0),
            })
            .collect())
    }

    /// Flatten the index into exportable records, in document order.
    pub fn to_records(&self) -> Vec<IndexRecord> {
        self.entries
            .iter()
            .map(|e| IndexRecord {
                chunk_id: e.chunk.id.clone(),
                document_id: e.chunk.document_id.clone(),
                vector: e.vector.clone(),
                chunk_text: e.chunk.text.clone(),
                metadata: RecordMetadata {
                    sequence_index: e.chunk.sequence_index,
                    start_offset: e.chunk.start_offset,
                    end_offset: e.chunk.end_offset,
                    hash: e.chunk.hash.clone(),
                    model: self.model.clone(),
                },
            })
            .collect()
    }

    /// Serialise the index as `{ "<document_id>": [records...] }`.
    pub fn export_json(&self) -> serde_json::Result<String> {
        let mut map = serde_json::Map::new();
        map.insert(
            self.document_id.clone(),
            serde_json::to_value(self.to_records())?,
        );
        serde_json::to_string_pretty(&map)
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
