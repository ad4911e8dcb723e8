//! Top-K retrieval against the session's current index.

use std::sync::Arc;

use crate::error::{RagError, Result};
use crate::index::VectorIndex;
use crate::models::RetrievalResult;

/// Retrieves candidate chunks for a query vector.
///
/// Holds a shared handle to an immutable [`VectorIndex`]; cloning a
/// retriever is cheap and concurrent searches never contend.
#[derive(Debug, Clone)]
pub struct Retriever {
    index: Option<Arc<VectorIndex>>,
    top_k: usize,
}

impl Retriever {
    pub fn new(index: Option<Arc<VectorIndex>>, top_k: usize) -> Self {
        Self { index, top_k }
    }

    /// Search with the configured `top_k`.
    pub fn retrieve(&self, query: &[f32]) -> Result<RetrievalResult> {
        self.retrieve_k(query, self.top_k)
    }

    /// Search with an explicit `k`.
    ///
    /// Fails with [`RagError::EmptyIndex`] when no index has been built.
    pub fn retrieve_k(&self, query: &[f32], k: usize) -> Result<RetrievalResult> {
        let index = self.index.as_ref().ok_or(RagError::EmptyIndex)?;
        let hits = index.search(query, k)?;
        tracing::debug!(
            k,
            hits = hits.len(),
            top = hits.first().map(|h| h.score),
            "retrieved"
        );
        Ok(RetrievalResult { hits })
    }
}
