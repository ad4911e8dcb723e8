//! # Study RAG
//!
//! Ask questions about one uploaded document and get answers grounded in
//! it, or an explicit "not in the document" decline.
//!
//! The pure pipeline pieces (chunking, vector index, confidence gate,
//! prompts) live in the `study-rag-core` crate. This crate adds what needs
//! I/O: document extraction, embedding and generation backends, the
//! session state machine, orchestration, and the CLI / HTTP frontends.
//!
//! ## Architecture
//!
//! ```text
//!  upload ──▶ extract ──▶ chunk ⇄ embed ──▶ index ──▶ Session (ready)
//!                                                         │
//!  question ──▶ embed ──▶ retrieve top-K ◀─────────────────┘
//!                              │
//!                              ▼
//!                       confidence gate ──(insufficient)──▶ decline
//!                              │
//!                         (sufficient)
//!                              ▼
//!                          synthesize ──(sentinel)──▶ decline
//!                              │
//!                              ▼
//!                            answer
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration with defaults and validation |
//! | [`extract`] | PDF and OOXML text extraction and cleaning |
//! | [`backend`] | Shared HTTP retry/backoff for model backends |
//! | [`embedding`] | Embedding providers (hash, OpenAI, Ollama, local) |
//! | [`generation`] | Generation providers (OpenAI, Gemini, Ollama) |
//! | [`session`] | Per-session ingestion state machine and index slot |
//! | [`ingest`] | Ingestion orchestrator and study materials |
//! | [`query`] | Query orchestrator with the confidence gate |
//! | [`synth`] | Answer and study-material synthesis |
//! | [`server`] | HTTP API |

pub mod backend;
pub mod config;
pub mod embedding;
pub mod extract;
pub mod generation;
pub mod ingest;
pub mod query;
pub mod server;
pub mod session;
pub mod synth;
