//! Answer and study-material synthesis on top of a [`Generator`].

use std::sync::Arc;

use tracing::debug;

use study_rag_core::models::{Flashcard, ScoredChunk};
use study_rag_core::prompt::{self, assemble_context};
use study_rag_core::study::{parse_flashcards, parse_notes};
use study_rag_core::Result;

use crate::generation::Generator;

/// Result of asking the model to answer from context.
#[derive(Debug, Clone, PartialEq)]
pub enum Synthesis {
    Answer(String),
    /// The model replied with the decline sentinel, or with nothing.
    Declined,
}

#[derive(Clone)]
pub struct Synthesizer {
    generator: Arc<dyn Generator>,
}

impl Synthesizer {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    /// Answer `question` using only `hits` as context.
    pub async fn synthesize(&self, question: &str, hits: &[ScoredChunk]) -> Result<Synthesis> {
        let context = assemble_context(hits);
        let reply = self
            .generator
            .generate(&prompt::build_answer_prompt(question, &context))
            .await?;
        if prompt::is_decline_reply(&reply) {
            debug!("model declined to answer from context");
            return Ok(Synthesis::Declined);
        }
        Ok(Synthesis::Answer(reply.trim().to_string()))
    }

    pub async fn summary(&self, hits: &[ScoredChunk]) -> Result<String> {
        let reply = self
            .generator
            .generate(&prompt::build_summary_prompt(&assemble_context(hits)))
            .await?;
        Ok(reply.trim().to_string())
    }

    pub async fn notes(&self, hits: &[ScoredChunk], max: usize) -> Result<Vec<String>> {
        let reply = self
            .generator
            .generate(&prompt::build_notes_prompt(&assemble_context(hits), max))
            .await?;
        Ok(parse_notes(&reply, max))
    }

    pub async fn flashcards(&self, hits: &[ScoredChunk], max: usize) -> Result<Vec<Flashcard>> {
        let reply = self
            .generator
            .generate(&prompt::build_flashcards_prompt(&assemble_context(hits), max))
            .await?;
        Ok(parse_flashcards(&reply, max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use study_rag_core::models::Chunk;
    use study_rag_core::RagError;

    struct Canned(&'static str);

    #[async_trait]
    impl Generator for Canned {
        fn model_name(&self) -> &str {
            "canned"
        }

        async fn generate(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct Down;

    #[async_trait]
    impl Generator for Down {
        fn model_name(&self) -> &str {
            "down"
        }

        async fn generate(&self, _prompt: &str) -> Result<String> {
            Err(RagError::GenerationUnavailable("connection refused".into()))
        }
    }

    fn hits() -> Vec<ScoredChunk> {
        vec![ScoredChunk {
            chunk: Chunk {
                id: "c0".into(),
                document_id: "doc".into(),
                sequence_index: 0,
                text: "The capital of France is Paris.".into(),
                start_offset: 0,
                end_offset: 31,
                hash: String::new(),
            },
            score: 0.8,
        }]
    }

    #[tokio::test]
    async fn test_answer_is_trimmed() {
        let s = Synthesizer::new(Arc::new(Canned("  Paris.\n")));
        assert_eq!(
            s.synthesize("capital?", &hits()).await.unwrap(),
            Synthesis::Answer("Paris.".into())
        );
    }

    #[tokio::test]
    async fn test_sentinel_and_empty_replies_decline() {
        for reply in ["NOT_IN_DOCUMENT", "   "] {
            let s = Synthesizer::new(Arc::new(Canned(reply)));
            assert_eq!(
                s.synthesize("capital?", &hits()).await.unwrap(),
                Synthesis::Declined
            );
        }
    }

    #[tokio::test]
    async fn test_backend_failure_is_not_a_decline() {
        let s = Synthesizer::new(Arc::new(Down));
        let err = s.synthesize("capital?", &hits()).await.unwrap_err();
        assert!(matches!(err, RagError::GenerationUnavailable(_)));
    }

    #[tokio::test]
    async fn test_study_outputs_are_parsed() {
        let s = Synthesizer::new(Arc::new(Canned(
            "Q: What is the capital of France?\nA: Paris.\n",
        )));
        let cards = s.flashcards(&hits(), 8).await.unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].answer, "Paris.");

        let notes = s.notes(&hits(), 10).await.unwrap();
        assert_eq!(notes, vec!["Q: What is the capital of France?"]);
    }
}
