//! # Study RAG CLI (`srag`)
//!
//! Ingests one document, answers questions grounded in it, and serves the
//! same pipeline over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! srag --config ./config/srag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `srag ingest <file>` | Ingest a document and print study materials |
//! | `srag ask <file> "<question>"` | Ingest, then answer one question or decline |
//! | `srag export <file>` | Ingest and print the vector index as JSON records |
//! | `srag serve` | Start the HTTP server |
//!
//! Without `--config` the built-in defaults are used: the offline hash
//! embedder and no generation backend. Logging follows `RUST_LOG`
//! (default `info`) and goes to stderr; results go to stdout.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use study_rag::config::{self, Config};
use study_rag::embedding::create_embedder;
use study_rag::extract;
use study_rag::generation::create_generator;
use study_rag::ingest::{cancel_pair, Ingestor};
use study_rag::query::QueryEngine;
use study_rag::server;
use study_rag::session::Session;
use study_rag::synth::Synthesizer;
use study_rag_core::models::Document;
use study_rag_core::RagError;

/// Study RAG: ask questions about one document and get answers grounded
/// in it, or an explicit decline.
#[derive(Parser)]
#[command(name = "srag", version, about)]
struct Cli {
    /// Path to a TOML configuration file. Built-in defaults when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a document and print its summary, notes and flashcards.
    ///
    /// With generation disabled only the document info is printed.
    Ingest {
        /// PDF, DOCX, PPTX, XLSX, TXT or Markdown file.
        file: PathBuf,
    },

    /// Ingest a document, then answer one question about it.
    Ask {
        file: PathBuf,
        question: String,

        /// Print the confidence decision as JSON alongside the answer.
        #[arg(long)]
        explain: bool,
    },

    /// Ingest a document and print its index as JSON records.
    Export { file: PathBuf },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

/// Pipeline pieces built from one config.
struct Pipeline {
    config: Arc<Config>,
    ingestor: Ingestor,
    queries: QueryEngine,
}

impl Pipeline {
    fn new(config: Config) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let generator = create_generator(&config.generation)?;
        let synthesizer = Synthesizer::new(generator);
        let config = Arc::new(config);
        Ok(Self {
            ingestor: Ingestor::new(config.clone(), embedder.clone(), synthesizer.clone()),
            queries: QueryEngine::new(&config, embedder, synthesizer),
            config,
        })
    }

    /// Ingest `path` into `session`; Ctrl-C cancels.
    async fn ingest(&self, session: &Session, path: &Path) -> Result<()> {
        let doc = read_document(path, self.config.limits.max_upload_bytes)?;
        let (handle, token) = cancel_pair();
        let watcher = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling ingestion");
                handle.cancel();
            }
        });
        let result = self.ingestor.ingest(session, doc, Some(token)).await;
        watcher.abort();
        let info = result.with_context(|| format!("Failed to ingest {}", path.display()))?;
        info!(
            document = %info.name,
            chunks = info.chunk_count,
            pages = ?info.page_count,
            "document ready"
        );
        Ok(())
    }
}

/// Read a document from disk, refusing oversized files before reading.
fn read_document(path: &Path, max_bytes: usize) -> Result<Document> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    let Some(content_type) = extract::content_type_for(&name) else {
        bail!("Unsupported file type: {}", path.display());
    };
    let size = std::fs::metadata(path)
        .with_context(|| format!("Failed to stat {}", path.display()))?
        .len();
    extract::check_size(usize::try_from(size).unwrap_or(usize::MAX), max_bytes)?;
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(Document::new(name, content_type, bytes))
}

fn load(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(p) => config::load_config(p),
        None => Ok(Config::default()),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = load(cli.config.as_deref())?;

    match cli.command {
        Commands::Ingest { file } => {
            let pipeline = Pipeline::new(cfg)?;
            let session = Session::new();
            pipeline.ingest(&session, &file).await?;
            match pipeline.ingestor.study_materials(&session).await {
                Ok(materials) => print_json(&materials)?,
                Err(RagError::GenerationUnavailable(reason)) => {
                    warn!(%reason, "study materials skipped");
                    print_json(&session.document())?;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Ask {
            file,
            question,
            explain,
        } => {
            let pipeline = Pipeline::new(cfg)?;
            let session = Session::new();
            pipeline.ingest(&session, &file).await?;
            let outcome = pipeline.queries.ask(&session, &question).await?;
            println!("{}", outcome.message());
            if explain {
                print_json(outcome.decision())?;
            }
        }
        Commands::Export { file } => {
            let pipeline = Pipeline::new(cfg)?;
            let session = Session::new();
            pipeline.ingest(&session, &file).await?;
            println!("{}", session.ready_index()?.export_json()?);
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
