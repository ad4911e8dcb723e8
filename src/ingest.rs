//! Ingestion orchestration.
//!
//! Drives one document through extract → chunk → embed → index inside a
//! session, then (optionally) generates study materials from the new
//! index.
//!
//! # Guarantees
//!
//! - The size limit is checked before any parsing.
//! - Chunks are pulled from the lazy chunk iterator `batch_size` at a time
//!   and embedded batch by batch, so peak memory is one batch of text plus
//!   the vectors collected so far.
//! - A document producing more than `limits.max_chunks` chunks is rejected
//!   with `TooManyChunks`; it is never truncated.
//! - The index only becomes visible once every chunk is embedded. Any
//!   failure, the time budget running out, or cancellation leaves the
//!   session in `error` with nothing half-built behind it.
//! - Study-material generation runs after the index is `ready`; if the
//!   generation backend fails the index stays usable for queries.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use study_rag_core::chunk::Chunker;
use study_rag_core::embedding::{validate_batch, Embedder};
use study_rag_core::index::{IndexEntry, VectorIndex};
use study_rag_core::models::{Chunk, Document, StudyMaterials};
use study_rag_core::prompt::{FLASHCARDS_QUERY, NOTES_QUERY, SUMMARY_QUERY};
use study_rag_core::retrieve::Retriever;
use study_rag_core::{RagError, Result};

use crate::config::Config;
use crate::extract;
use crate::session::{DocumentInfo, IngestTicket, Session, Step};
use crate::synth::Synthesizer;

/// Requests cancellation of an in-flight ingestion.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Observed by the ingestion; resolves once [`CancelHandle::cancel`] runs.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    async fn cancelled(mut self) {
        loop {
            if *self.rx.borrow() {
                return;
            }
            if self.rx.changed().await.is_err() {
                // Handle dropped without cancelling.
                std::future::pending::<()>().await;
            }
        }
    }
}

pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

async fn wait_cancel(token: Option<CancelToken>) {
    match token {
        Some(t) => t.cancelled().await,
        None => std::future::pending().await,
    }
}

/// Builds indexes and study materials with one fixed set of backends.
#[derive(Clone)]
pub struct Ingestor {
    config: Arc<Config>,
    embedder: Arc<dyn Embedder>,
    synthesizer: Synthesizer,
}

impl Ingestor {
    pub fn new(config: Arc<Config>, embedder: Arc<dyn Embedder>, synthesizer: Synthesizer) -> Self {
        Self {
            config,
            embedder,
            synthesizer,
        }
    }

    /// Ingest `doc` into `session`, replacing any previous index.
    pub async fn ingest(
        &self,
        session: &Session,
        doc: Document,
        cancel: Option<CancelToken>,
    ) -> Result<DocumentInfo> {
        // Size is checked before the session is touched; a ready index stays.
        if let Err(e) = extract::check_size(doc.size(), self.config.limits.max_upload_bytes) {
            warn!(name = %doc.name, bytes = doc.size(), "upload rejected: {e}");
            return Err(e);
        }

        let ticket = session.begin_ingest()?;
        let started = Instant::now();
        info!(
            session = %session.id(),
            document_id = %doc.id,
            name = %doc.name,
            bytes = doc.size(),
            "ingestion started"
        );

        let budget = self.config.limits.ingest_timeout();
        let outcome = tokio::select! {
            biased;
            _ = wait_cancel(cancel) => Err(RagError::Cancelled),
            r = tokio::time::timeout(budget, self.build_index(&ticket, doc)) => {
                r.unwrap_or(Err(RagError::IngestionTimeout {
                    budget_secs: budget.as_secs(),
                }))
            }
        };

        match outcome {
            Ok((index, document)) => {
                ticket.publish(index, document.clone())?;
                info!(
                    document_id = %document.id,
                    chunks = document.chunk_count,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "ingestion complete"
                );
                Ok(document)
            }
            Err(e) => {
                ticket.fail(&e);
                Err(e)
            }
        }
    }

    async fn build_index(
        &self,
        ticket: &IngestTicket<'_>,
        doc: Document,
    ) -> Result<(Arc<VectorIndex>, DocumentInfo)> {
        ticket.enter(Step::Extracting);
        let max_bytes = self.config.limits.max_upload_bytes;
        let document_id = doc.id.clone();
        let name = doc.name.clone();
        let extracted =
            tokio::task::spawn_blocking(move || extract::extract_document(&doc, max_bytes))
                .await
                .map_err(|e| RagError::UnreadableDocument(format!("extraction task failed: {e}")))??;

        let limits = &self.config.limits;
        let batch_size = self.config.embedding.batch_size.max(1);
        let dims = self.embedder.dims();
        let chunker = Chunker::new(self.config.chunking.policy());
        let mut chunks = chunker.chunks(&document_id, &extracted.text);
        let mut entries: Vec<IndexEntry> = Vec::new();

        loop {
            ticket.enter(Step::Chunking);
            let batch: Vec<Chunk> = chunks.by_ref().take(batch_size).collect();
            if batch.is_empty() {
                break;
            }
            if entries.len() + batch.len() > limits.max_chunks {
                return Err(RagError::TooManyChunks {
                    limit: limits.max_chunks,
                });
            }

            ticket.enter(Step::Embedding);
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed(&texts).await?;
            validate_batch(texts.len(), dims, &vectors)?;
            entries.extend(
                batch
                    .into_iter()
                    .zip(vectors)
                    .map(|(chunk, vector)| IndexEntry { chunk, vector }),
            );
            debug!(embedded = entries.len(), "embedding progress");
            // Synchronous embedders never hit an await point on their own.
            tokio::task::yield_now().await;
        }

        ticket.enter(Step::Indexing);
        let chunk_count = entries.len();
        let index = VectorIndex::build(&document_id, self.embedder.model_name(), dims, entries)?;

        Ok((
            Arc::new(index),
            DocumentInfo {
                id: document_id,
                name,
                page_count: extracted.page_count,
                chunk_count,
            },
        ))
    }

    /// Summary, notes, and flashcards from the session's ready index.
    ///
    /// Each part retrieves its own context with a fixed query. A backend
    /// failure is reported as `GenerationUnavailable`; the index is untouched.
    pub async fn study_materials(&self, session: &Session) -> Result<StudyMaterials> {
        let index = session.ready_index()?;
        let study = &self.config.study;
        let retriever = Retriever::new(Some(index), self.config.retrieval.top_k);

        let summary_hits = retriever
            .retrieve_k(&self.embedder.embed_query(SUMMARY_QUERY).await?, study.summary_k)?
            .hits;
        let notes_hits = retriever
            .retrieve_k(&self.embedder.embed_query(NOTES_QUERY).await?, study.notes_k)?
            .hits;
        let card_hits = retriever
            .retrieve_k(
                &self.embedder.embed_query(FLASHCARDS_QUERY).await?,
                study.flashcards_k,
            )?
            .hits;

        let summary = self.synthesizer.summary(&summary_hits).await?;
        let notes = self.synthesizer.notes(&notes_hits, study.max_notes).await?;
        let flashcards = self
            .synthesizer
            .flashcards(&card_hits, study.max_flashcards)
            .await?;

        info!(
            notes = notes.len(),
            flashcards = flashcards.len(),
            "study materials generated"
        );
        Ok(StudyMaterials {
            summary,
            notes,
            flashcards,
        })
    }

    /// Ingest, then generate study materials.
    pub async fn process(
        &self,
        session: &Session,
        doc: Document,
        cancel: Option<CancelToken>,
    ) -> Result<StudyMaterials> {
        self.ingest(session, doc, cancel).await?;
        self.study_materials(session).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::DisabledGenerator;
    use study_rag_core::embedding::HashEmbedder;

    fn ingestor(config: Config) -> Ingestor {
        Ingestor::new(
            Arc::new(config),
            Arc::new(HashEmbedder::default()),
            Synthesizer::new(Arc::new(DisabledGenerator)),
        )
    }

    fn text_doc(body: &str) -> Document {
        Document::new("notes.txt", extract::MIME_TEXT, body.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn test_ingest_text_reaches_ready() {
        let session = Session::new();
        let info = ingestor(Config::default())
            .ingest(&session, text_doc("Cells divide by mitosis. DNA stores genes."), None)
            .await
            .unwrap();
        assert_eq!(info.chunk_count, 1);
        assert_eq!(info.page_count, None);
        assert_eq!(session.ready_index().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_chunk_ceiling_rejects_document() {
        let mut config = Config::default();
        config.chunking.target_size = 10;
        config.chunking.overlap = 0;
        config.limits.max_chunks = 2;
        config.embedding.batch_size = 1;
        let session = Session::new();
        let err = ingestor(config)
            .ingest(&session, text_doc("One fact. Two fact. Three fact."), None)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::TooManyChunks { limit: 2 }));
        assert!(matches!(
            session.phase(),
            crate::session::Phase::Error {
                step: Step::Chunking,
                kind: "too_many_chunks"
            }
        ));
        assert!(session.ready_index().is_err());
    }

    #[tokio::test]
    async fn test_study_materials_need_ready_index() {
        let session = Session::new();
        let err = ingestor(Config::default())
            .study_materials(&session)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::IndexNotReady));
    }

    #[tokio::test]
    async fn test_generation_failure_keeps_index_ready() {
        let session = Session::new();
        let err = ingestor(Config::default())
            .process(&session, text_doc("Cells divide by mitosis."), None)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::GenerationUnavailable(_)));
        assert!(session.ready_index().is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_ingest_leaves_nothing_behind() {
        let (handle, token) = cancel_pair();
        handle.cancel();
        let session = Session::new();
        let err = ingestor(Config::default())
            .ingest(&session, text_doc("Cells divide by mitosis."), Some(token))
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Cancelled));
        assert!(session.ready_index().is_err());
        assert!(matches!(
            session.phase(),
            crate::session::Phase::Error {
                kind: "cancelled",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_dropped_cancel_handle_does_not_cancel() {
        let (handle, token) = cancel_pair();
        drop(handle);
        let session = Session::new();
        ingestor(Config::default())
            .ingest(&session, text_doc("Cells divide by mitosis."), Some(token))
            .await
            .unwrap();
        assert!(session.ready_index().is_ok());
    }
}
