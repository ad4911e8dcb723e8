//! # Study RAG Core
//!
//! Pure retrieval-augmented-generation logic for Study RAG: data models,
//! chunking, the embedding trait, the in-memory vector index, retrieval,
//! confidence gating, prompt construction, and study-material parsing.
//!
//! This crate contains no tokio, HTTP, filesystem I/O, or other
//! runtime-bound dependencies. Backends (embedding and generation
//! providers), the ingestion state machine, and the HTTP surface live in
//! the `study-rag` application crate.
//!
//! # Pipeline
//!
//! ```text
//! text ─► Chunker ─► Embedder ─► VectorIndex::build
//!
//! query ─► Embedder ─► Retriever ─► ConfidencePolicy ─┬─► prompt ─► Generator
//!                                                     └─► decline
//! ```

pub mod chunk;
pub mod confidence;
pub mod embedding;
pub mod error;
pub mod index;
pub mod models;
pub mod prompt;
pub mod retrieve;
pub mod study;

pub use error::{RagError, Result};
