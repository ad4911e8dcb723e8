//! Query orchestration: embed → retrieve → gate → synthesize or decline.
//!
//! The confidence gate runs before any generation call. When it judges the
//! evidence insufficient the engine returns [`QueryOutcome::Decline`]
//! without touching the generator, so an unrelated question can never be
//! answered from the model's own knowledge.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use study_rag_core::confidence::ConfidencePolicy;
use study_rag_core::embedding::Embedder;
use study_rag_core::models::ConfidenceDecision;
use study_rag_core::prompt::DECLINE_MESSAGE;
use study_rag_core::retrieve::Retriever;
use study_rag_core::{RagError, Result};

use crate::config::Config;
use crate::session::Session;
use crate::synth::{Synthesis, Synthesizer};

/// How a query ended. Neither variant is an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum QueryOutcome {
    Answer {
        text: String,
        decision: ConfidenceDecision,
    },
    /// The gate rejected the evidence, or the model replied with the
    /// decline sentinel.
    Decline { decision: ConfidenceDecision },
}

impl QueryOutcome {
    /// User-facing text: the answer, or the fixed decline message.
    pub fn message(&self) -> &str {
        match self {
            QueryOutcome::Answer { text, .. } => text,
            QueryOutcome::Decline { .. } => DECLINE_MESSAGE,
        }
    }

    pub fn is_decline(&self) -> bool {
        matches!(self, QueryOutcome::Decline { .. })
    }

    pub fn decision(&self) -> &ConfidenceDecision {
        match self {
            QueryOutcome::Answer { decision, .. } | QueryOutcome::Decline { decision } => decision,
        }
    }
}

/// Answers questions against a session's ready index.
#[derive(Clone)]
pub struct QueryEngine {
    top_k: usize,
    embedder: Arc<dyn Embedder>,
    synthesizer: Synthesizer,
    gate: Arc<dyn ConfidencePolicy>,
}

impl QueryEngine {
    pub fn new(config: &Config, embedder: Arc<dyn Embedder>, synthesizer: Synthesizer) -> Self {
        Self {
            top_k: config.retrieval.top_k,
            embedder,
            synthesizer,
            gate: Arc::from(config.confidence.params().build()),
        }
    }

    /// Replace the confidence policy.
    pub fn with_gate(mut self, gate: Arc<dyn ConfidencePolicy>) -> Self {
        self.gate = gate;
        self
    }

    pub async fn ask(&self, session: &Session, question: &str) -> Result<QueryOutcome> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::InvalidRequest(
                "message must not be empty".to_string(),
            ));
        }
        let index = session.ready_index()?;

        let query = self.embedder.embed_query(question).await?;
        let result = Retriever::new(Some(index), self.top_k).retrieve(&query)?;
        let decision = self.gate.assess(&result);
        info!(
            policy = self.gate.name(),
            hits = result.len(),
            top_score = decision.top_score,
            sufficient = decision.sufficient,
            reason = ?decision.reason,
            "confidence gate"
        );

        if !decision.sufficient {
            return Ok(QueryOutcome::Decline { decision });
        }

        match self.synthesizer.synthesize(question, &result.hits).await? {
            Synthesis::Answer(text) => Ok(QueryOutcome::Answer { text, decision }),
            Synthesis::Declined => Ok(QueryOutcome::Decline { decision }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use study_rag_core::embedding::HashEmbedder;
    use study_rag_core::models::{Document, GateReason};

    use crate::generation::Generator;
    use crate::ingest::Ingestor;

    /// Counts calls and echoes a fixed reply.
    struct Counting {
        reply: &'static str,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Generator for Counting {
        fn model_name(&self) -> &str {
            "counting"
        }

        async fn generate(&self, _prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.to_string())
        }
    }

    async fn setup(reply: &'static str) -> (Session, QueryEngine, Arc<Counting>) {
        let config = Arc::new(Config::default());
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::default());
        let generator = Arc::new(Counting {
            reply,
            calls: AtomicUsize::new(0),
        });
        let synthesizer = Synthesizer::new(generator.clone());
        let session = Session::new();
        Ingestor::new(config.clone(), embedder.clone(), synthesizer.clone())
            .ingest(
                &session,
                Document::new(
                    "geo.txt",
                    crate::extract::MIME_TEXT,
                    b"Paris is the capital of France. France has a population of about 68 million people."
                        .to_vec(),
                ),
                None,
            )
            .await
            .unwrap();
        (session, QueryEngine::new(&config, embedder, synthesizer), generator)
    }

    #[tokio::test]
    async fn test_supported_question_is_answered() {
        let (session, engine, generator) = setup("Paris.").await;
        let outcome = engine
            .ask(&session, "What is the capital of France?")
            .await
            .unwrap();
        assert_eq!(outcome.message(), "Paris.");
        assert!(outcome.decision().sufficient);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unrelated_question_never_reaches_generator() {
        let (session, engine, generator) = setup("Leonardo da Vinci.").await;
        let outcome = engine
            .ask(&session, "Who painted the Mona Lisa?")
            .await
            .unwrap();
        assert!(outcome.is_decline());
        assert_eq!(outcome.message(), DECLINE_MESSAGE);
        assert_eq!(outcome.decision().reason, GateReason::BelowThreshold);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_sentinel_reply_becomes_decline() {
        let (session, engine, _) = setup("NOT_IN_DOCUMENT").await;
        let outcome = engine
            .ask(&session, "What is the capital of France?")
            .await
            .unwrap();
        assert!(outcome.is_decline());
        assert!(outcome.decision().sufficient);
    }

    #[tokio::test]
    async fn test_stricter_gate_declines() {
        let (session, engine, generator) = setup("Paris.").await;
        let engine = engine.with_gate(Arc::new(
            study_rag_core::confidence::ThresholdPolicy::new(0.9),
        ));
        let outcome = engine
            .ask(&session, "What is the capital of France?")
            .await
            .unwrap();
        assert!(outcome.is_decline());
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_question_is_invalid() {
        let (session, engine, _) = setup("Paris.").await;
        let err = engine.ask(&session, "   ").await.unwrap_err();
        assert!(matches!(err, RagError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_query_before_ingest_is_not_ready() {
        let config = Config::default();
        let engine = QueryEngine::new(
            &config,
            Arc::new(HashEmbedder::default()),
            Synthesizer::new(Arc::new(crate::generation::DisabledGenerator)),
        );
        let err = engine.ask(&Session::new(), "anything").await.unwrap_err();
        assert!(matches!(err, RagError::IndexNotReady));
    }
}
