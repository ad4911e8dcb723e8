//! Prompt templates for grounded answering and study-material generation.
//!
//! Retrieved chunks are re-ordered by document position and stitched
//! together before being placed in a prompt. Chunks that overlap (or sit
//! back to back) in the source are merged into one passage, so the model
//! never sees the same sentence twice; gaps between passages are marked
//! with a separator.

use crate::models::{Chunk, ScoredChunk};

/// The exact reply the model is told to give when the context cannot
/// answer the question.
pub const DECLINE_SENTINEL: &str = "NOT_IN_DOCUMENT";

/// User-facing text for a decline.
pub const DECLINE_MESSAGE: &str =
    "I couldn't find enough information in the uploaded document to answer that question.";

const PASSAGE_SEPARATOR: &str = "\n\n---\n\n";

/// Retrieval query used to pick context for the summary.
pub const SUMMARY_QUERY: &str = "main ideas, key concepts and important details of the document";
/// Retrieval query used to pick context for notes.
pub const NOTES_QUERY: &str = "most important key points and concepts";
/// Retrieval query used to pick context for flashcards.
pub const FLASHCARDS_QUERY: &str = "key concepts, definitions and facts worth testing";

/// Merge retrieved chunks into passages in document order.
pub fn assemble_context(hits: &[ScoredChunk]) -> String {
    let mut chunks: Vec<&Chunk> = hits.iter().map(|h| &h.chunk).collect();
    chunks.sort_by_key(|c| c.sequence_index);
    chunks.dedup_by_key(|c| c.sequence_index);

    let mut out = String::new();
    let mut covered: Option<usize> = None;
    for chunk in chunks {
        match covered {
            Some(end) if chunk.start_offset <= end => {
                if chunk.end_offset > end {
                    let tail = chunk
                        .text
                        .get(end - chunk.start_offset..)
                        .unwrap_or(chunk.text.as_str());
                    out.push_str(tail);
                }
            }
            Some(_) => {
                trim_trailing(&mut out);
                out.push_str(PASSAGE_SEPARATOR);
                out.push_str(chunk.text.trim_start());
            }
            None => out.push_str(chunk.text.trim_start()),
        }
        covered = Some(covered.map_or(chunk.end_offset, |e| e.max(chunk.end_offset)));
    }
    trim_trailing(&mut out);
    out
}

fn trim_trailing(s: &mut String) {
    let len = s.trim_end().len();
    s.truncate(len);
}

/// Build the grounded question-answering prompt.
pub fn build_answer_prompt(question: &str, context: &str) -> String {
    format!(
        r#"You are a study assistant that answers questions using ONLY the document excerpts below.

Rules:
1. Use only information explicitly stated in the CONTEXT.
2. Do not use outside knowledge and do not guess.
3. If the CONTEXT does not contain the answer, reply with exactly: {sentinel}

CONTEXT:
{context}

QUESTION: {question}

ANSWER:"#,
        sentinel = DECLINE_SENTINEL,
        context = context,
        question = question.trim(),
    )
}

pub fn build_summary_prompt(context: &str) -> String {
    format!(
        r#"Based only on the document excerpts below, write a comprehensive summary that captures the main ideas, key concepts and important details.

The summary should highlight the most important points, keep a logical flow, and be concise but complete. Use clear language.

CONTEXT:
{context}

SUMMARY:"#
    )
}

pub fn build_notes_prompt(context: &str, max_notes: usize) -> String {
    format!(
        r#"Extract the most important key points and concepts from the document excerpts below as study notes.

Each note captures a single idea, is specific and informative, and is written as a complete sentence or phrase.
Provide at most {max_notes} notes, one per line.

CONTEXT:
{context}

NOTES:"#
    )
}

pub fn build_flashcards_prompt(context: &str, max_cards: usize) -> String {
    format!(
        r#"Create study flashcards from the document excerpts below. Each flashcard has a clear, specific question and a detailed, accurate answer taken from the excerpts.

Generate at most {max_cards} flashcards covering different aspects of the material.

Format each flashcard as:
Q: [Question]
A: [Answer]

Separate flashcards with a blank line.

CONTEXT:
{context}

FLASHCARDS:"#
    )
}

/// Whether a model reply means "cannot answer from this context".
pub fn is_decline_reply(reply: &str) -> bool {
    let trimmed = reply.trim();
    trimmed.is_empty() || trimmed.to_ascii_uppercase().contains(DECLINE_SENTINEL)
}
