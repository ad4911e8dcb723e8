//! Per-user session: the ingestion state machine and the current index.
//!
//! ```text
//! idle ─► extracting ─► chunking ⇄ embedding ─► indexing ─► ready
//!              │            │          │           │
//!              └────────────┴──────────┴───────────┴─► error { step, kind }
//! ```
//!
//! A session owns at most one [`VectorIndex`]. Readers get an `Arc` to it
//! only while the phase is `ready`; a new ingestion tears the old index
//! down before it starts, and [`Session::reset`] returns to `idle`.
//!
//! Only one ingestion may run at a time. [`Session::begin_ingest`] hands
//! out an [`IngestTicket`] holding the single-flight lock; if the ticket is
//! dropped before [`IngestTicket::publish`] (error, timeout, cancellation,
//! or the caller going away) the phase becomes `error` and no partial state
//! survives.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use study_rag_core::index::VectorIndex;
use study_rag_core::RagError;

/// A pipeline step that can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Extracting,
    Chunking,
    Embedding,
    Indexing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Extracting,
    Chunking,
    Embedding,
    Indexing,
    Ready,
    Error { step: Step, kind: &'static str },
}

impl Phase {
    fn step(&self) -> Option<Step> {
        match self {
            Phase::Extracting => Some(Step::Extracting),
            Phase::Chunking => Some(Step::Chunking),
            Phase::Embedding => Some(Step::Embedding),
            Phase::Indexing => Some(Step::Indexing),
            _ => None,
        }
    }
}

impl From<Step> for Phase {
    fn from(step: Step) -> Self {
        match step {
            Step::Extracting => Phase::Extracting,
            Step::Chunking => Phase::Chunking,
            Step::Embedding => Phase::Embedding,
            Step::Indexing => Phase::Indexing,
        }
    }
}

/// What the session knows about its ingested document.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentInfo {
    pub id: String,
    pub name: String,
    pub page_count: Option<usize>,
    pub chunk_count: usize,
}

#[derive(Debug)]
struct State {
    phase: Phase,
    index: Option<Arc<VectorIndex>>,
    document: Option<DocumentInfo>,
    /// Bumped by `reset`; an ingestion started in an older epoch cannot publish.
    epoch: u64,
}

#[derive(Debug)]
pub struct Session {
    id: String,
    state: RwLock<State>,
    ingest_lock: Mutex<()>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            state: RwLock::new(State {
                phase: Phase::Idle,
                index: None,
                document: None,
                epoch: 0,
            }),
            ingest_lock: Mutex::new(()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn phase(&self) -> Phase {
        self.read().phase.clone()
    }

    pub fn document(&self) -> Option<DocumentInfo> {
        self.read().document.clone()
    }

    /// The current index, if the session is `ready`.
    pub fn ready_index(&self) -> Result<Arc<VectorIndex>, RagError> {
        let state = self.read();
        match (&state.phase, &state.index) {
            (Phase::Ready, Some(index)) => Ok(Arc::clone(index)),
            _ => Err(RagError::IndexNotReady),
        }
    }

    /// Drop the index and return to `idle`.
    ///
    /// An ingestion running concurrently finishes its work but is refused
    /// when it tries to publish.
    pub fn reset(&self) {
        let mut state = self.write();
        state.phase = Phase::Idle;
        state.index = None;
        state.document = None;
        state.epoch += 1;
        info!(session = %self.id, "session reset");
    }

    /// Claim the session for one ingestion.
    ///
    /// Fails with [`RagError::IngestionInProgress`] if another ingestion
    /// holds it. The previous index is discarded immediately.
    pub fn begin_ingest(&self) -> Result<IngestTicket<'_>, RagError> {
        let lock = self
            .ingest_lock
            .try_lock()
            .map_err(|_| RagError::IngestionInProgress)?;

        let epoch = {
            let mut state = self.write();
            state.phase = Phase::Extracting;
            state.index = None;
            state.document = None;
            state.epoch
        };
        debug!(session = %self.id, "ingestion started");

        Ok(IngestTicket {
            session: self,
            _lock: lock,
            epoch,
            finished: false,
        })
    }
}

/// Exclusive right to drive one ingestion through the state machine.
pub struct IngestTicket<'a> {
    session: &'a Session,
    _lock: MutexGuard<'a, ()>,
    epoch: u64,
    finished: bool,
}

impl IngestTicket<'_> {
    /// Move to `step`, unless a reset has superseded this ingestion.
    pub fn enter(&self, step: Step) {
        let mut state = self.session.write();
        if state.epoch != self.epoch {
            return;
        }
        let next = Phase::from(step);
        if state.phase != next {
            debug!(session = %self.session.id, phase = ?next, "ingestion phase");
            state.phase = next;
        }
    }

    /// Make `index` visible and move to `ready`.
    pub fn publish(
        mut self,
        index: Arc<VectorIndex>,
        document: DocumentInfo,
    ) -> Result<(), RagError> {
        let mut state = self.session.write();
        if state.epoch != self.epoch {
            self.finished = true;
            return Err(RagError::Cancelled);
        }
        info!(
            session = %self.session.id,
            document_id = %document.id,
            chunks = document.chunk_count,
            "index ready"
        );
        state.phase = Phase::Ready;
        state.index = Some(index);
        state.document = Some(document);
        self.finished = true;
        Ok(())
    }

    /// Record `err` against the step currently running.
    pub fn fail(mut self, err: &RagError) {
        self.record_failure(err);
        self.finished = true;
    }

    fn record_failure(&self, err: &RagError) {
        let mut state = self.session.write();
        if state.epoch != self.epoch {
            return;
        }
        let step = state.phase.step().unwrap_or(Step::Extracting);
        warn!(
            session = %self.session.id,
            step = ?step,
            kind = err.kind(),
            error = %err,
            "ingestion failed"
        );
        state.phase = Phase::Error {
            step,
            kind: err.kind(),
        };
        state.index = None;
        state.document = None;
    }
}

impl Drop for IngestTicket<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.record_failure(&RagError::Cancelled);
        }
    }
}
