//! TOML configuration.
//!
//! Every section is optional; a missing key takes the default listed on
//! its `default_*` function. [`Config::default()`] gives the same values
//! without a file, which is what tests and library callers use.
//!
//! ```toml
//! [limits]
//! max_upload_bytes = 4194304
//!
//! [embedding]
//! provider = "local"
//! model = "all-minilm-l6-v2"
//!
//! [generation]
//! provider = "gemini"
//!
//! [confidence]
//! policy = "gap"
//! threshold = 0.5
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use study_rag_core::chunk::{ChunkPolicy, SplitUnit};
use study_rag_core::confidence::{
    GateParams, PolicyKind, DEFAULT_MAX_DROP, DEFAULT_STRONG_SCORE, DEFAULT_THRESHOLD,
};
use study_rag_core::index::MAX_TOP_K;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub confidence: ConfidenceConfig,
    #[serde(default)]
    pub study: StudyConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    #[serde(default = "default_max_chunks")]
    pub max_chunks: usize,
    #[serde(default = "default_ingest_timeout_secs")]
    pub ingest_timeout_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: default_max_upload_bytes(),
            max_chunks: default_max_chunks(),
            ingest_timeout_secs: default_ingest_timeout_secs(),
        }
    }
}

impl LimitsConfig {
    pub fn ingest_timeout(&self) -> Duration {
        Duration::from_secs(self.ingest_timeout_secs)
    }
}

fn default_max_upload_bytes() -> usize {
    4 * 1024 * 1024
}
fn default_max_chunks() -> usize {
    2000
}
fn default_ingest_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_target_size")]
    pub target_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    #[serde(default)]
    pub split_unit: SplitUnit,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_size: default_target_size(),
            overlap: default_overlap(),
            split_unit: SplitUnit::default(),
        }
    }
}

impl ChunkingConfig {
    pub fn policy(&self) -> ChunkPolicy {
        ChunkPolicy {
            target_size: self.target_size,
            overlap: self.overlap,
            split_unit: self.split_unit,
        }
    }
}

fn default_target_size() -> usize {
    1000
}
fn default_overlap() -> usize {
    1
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `hash`, `openai`, `ollama`, or `local`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_embedding_timeout_secs(),
            url: None,
        }
    }
}

fn default_embedding_provider() -> String {
    "hash".to_string()
}
fn default_batch_size() -> usize {
    32
}
fn default_max_retries() -> u32 {
    3
}
fn default_embedding_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// `disabled`, `openai`, `gemini`, or `ollama`.
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_retries: default_max_retries(),
            timeout_secs: default_generation_timeout_secs(),
            url: None,
        }
    }
}

fn default_generation_provider() -> String {
    "disabled".to_string()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_generation_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConfidenceConfig {
    #[serde(default)]
    pub policy: PolicyKind,
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default = "default_max_drop")]
    pub max_drop: f32,
    #[serde(default = "default_strong_score")]
    pub strong_score: f32,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            policy: PolicyKind::default(),
            threshold: default_threshold(),
            max_drop: default_max_drop(),
            strong_score: default_strong_score(),
        }
    }
}

impl ConfidenceConfig {
    pub fn params(&self) -> GateParams {
        GateParams {
            policy: self.policy,
            threshold: self.threshold,
            max_drop: self.max_drop,
            strong_score: self.strong_score,
        }
    }
}

fn default_threshold() -> f32 {
    DEFAULT_THRESHOLD
}
fn default_max_drop() -> f32 {
    DEFAULT_MAX_DROP
}
fn default_strong_score() -> f32 {
    DEFAULT_STRONG_SCORE
}

#[derive(Debug, Deserialize, Clone)]
pub struct StudyConfig {
    #[serde(default = "default_summary_k")]
    pub summary_k: usize,
    #[serde(default = "default_study_k")]
    pub notes_k: usize,
    #[serde(default = "default_study_k")]
    pub flashcards_k: usize,
    #[serde(default = "default_max_notes")]
    pub max_notes: usize,
    #[serde(default = "default_max_flashcards")]
    pub max_flashcards: usize,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            summary_k: default_summary_k(),
            notes_k: default_study_k(),
            flashcards_k: default_study_k(),
            max_notes: default_max_notes(),
            max_flashcards: default_max_flashcards(),
        }
    }
}

fn default_summary_k() -> usize {
    3
}
fn default_study_k() -> usize {
    4
}
fn default_max_notes() -> usize {
    10
}
fn default_max_flashcards() -> usize {
    8
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:5000".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.limits.max_upload_bytes == 0 {
            bail!("limits.max_upload_bytes must be > 0");
        }
        if self.limits.max_chunks == 0 {
            bail!("limits.max_chunks must be > 0");
        }
        if self.limits.ingest_timeout_secs == 0 {
            bail!("limits.ingest_timeout_secs must be > 0");
        }

        if self.chunking.target_size == 0 {
            bail!("chunking.target_size must be > 0");
        }

        if self.retrieval.top_k == 0 || self.retrieval.top_k > MAX_TOP_K {
            bail!("retrieval.top_k must be in 1..={}", MAX_TOP_K);
        }
        for (name, k) in [
            ("study.summary_k", self.study.summary_k),
            ("study.notes_k", self.study.notes_k),
            ("study.flashcards_k", self.study.flashcards_k),
        ] {
            if k == 0 || k > MAX_TOP_K {
                bail!("{} must be in 1..={}", name, MAX_TOP_K);
            }
        }

        let c = &self.confidence;
        for (name, v) in [
            ("confidence.threshold", c.threshold),
            ("confidence.strong_score", c.strong_score),
        ] {
            if !(-1.0..=1.0).contains(&v) {
                bail!("{} must be in [-1.0, 1.0]", name);
            }
        }
        if !(0.0..=2.0).contains(&c.max_drop) {
            bail!("confidence.max_drop must be in [0.0, 2.0]");
        }

        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }
        if self.embedding.dims == Some(0) {
            bail!("embedding.dims must be > 0");
        }
        match self.embedding.provider.as_str() {
            "hash" | "local" => {}
            "openai" | "ollama" => {
                if self.embedding.model.is_none() || self.embedding.dims.is_none() {
                    bail!(
                        "embedding.model and embedding.dims must be specified when provider is '{}'",
                        self.embedding.provider
                    );
                }
            }
            other => bail!(
                "Unknown embedding provider: '{}'. Must be hash, openai, ollama, or local.",
                other
            ),
        }

        match self.generation.provider.as_str() {
            "disabled" | "openai" | "gemini" | "ollama" => {}
            other => bail!(
                "Unknown generation provider: '{}'. Must be disabled, openai, gemini, or ollama.",
                other
            ),
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            bail!("generation.temperature must be in [0.0, 2.0]");
        }

        Ok(())
    }
}
