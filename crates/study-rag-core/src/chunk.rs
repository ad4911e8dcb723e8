//! Unit-boundary text chunker with deterministic overlap.
//!
//! Splits cleaned document text into [`Chunk`]s of at most `target_size`
//! bytes, cutting only between *units* (sentences, paragraphs, or fixed
//! windows) so that embeddings never see a sentence truncated mid-way.
//!
//! # Algorithm
//!
//! 1. Segment the text into units that tile it exactly: every byte belongs
//!    to exactly one unit, and trailing whitespace rides with the unit
//!    before it.
//! 2. Starting at the current unit, greedily take units while the chunk
//!    stays within `target_size`. The first unit is always taken, so an
//!    oversized sentence becomes its own oversized chunk instead of being
//!    dropped.
//! 3. Emit the chunk, then start the next one up to `overlap` units before
//!    the cut point. Overlap units are dropped from the front until the
//!    first fresh unit fits, and never reach back to the previous chunk's
//!    first unit, so every chunk starts and ends strictly after the one
//!    before it and the sequence always terminates.
//!
//! Chunks are produced lazily by [`Chunks`]; only the unit boundaries (two
//! offsets per unit) are held up front. Calling [`Chunker::chunks`] again
//! restarts the sequence from the beginning.
//!
//! # Example
//!
//! ```rust
//! use study_rag_core::chunk::{ChunkPolicy, Chunker, SplitUnit};
//!
//! let chunker = Chunker::new(ChunkPolicy { target_size: 40, overlap: 0, split_unit: SplitUnit::Sentence });
//! let text = "The capital of France is Paris. Paris has a population of over 2 million.";
//! let chunks: Vec<_> = chunker.chunks("doc-1", text).collect();
//! assert_eq!(chunks.len(), 2);
//! assert_eq!(chunks[0].text, "The capital of France is Paris. ");
//! ```

use std::ops::Range;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::Chunk;

/// How text is segmented before chunks are assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitUnit {
    /// Sentence-ending punctuation followed by whitespace, or a blank line.
    #[default]
    Sentence,
    /// Blank-line separated paragraphs.
    Paragraph,
    /// Fixed character windows of a quarter of `target_size`.
    Fixed,
}

impl FromStr for SplitUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sentence" => Ok(SplitUnit::Sentence),
            "paragraph" => Ok(SplitUnit::Paragraph),
            "fixed" => Ok(SplitUnit::Fixed),
            other => Err(format!(
                "unknown split unit '{}': expected sentence, paragraph, or fixed",
                other
            )),
        }
    }
}

/// Chunk sizing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkPolicy {
    /// Maximum chunk length in bytes (exceeded only by a single oversized unit).
    pub target_size: usize,
    /// Number of units shared between consecutive chunks.
    pub overlap: usize,
    pub split_unit: SplitUnit,
}

impl Default for ChunkPolicy {
    fn default() -> Self {
        Self {
            target_size: 1000,
            overlap: 1,
            split_unit: SplitUnit::Sentence,
        }
    }
}

/// Produces chunk sequences for a fixed [`ChunkPolicy`].
#[derive(Debug, Clone)]
pub struct Chunker {
    policy: ChunkPolicy,
}

impl Chunker {
    pub fn new(policy: ChunkPolicy) -> Self {
        Self { policy }
    }

    /// Start a lazy chunk sequence over `text`.
    pub fn chunks<'a>(&self, document_id: &'a str, text: &'a str) -> Chunks<'a> {
        let target = self.policy.target_size.max(1);
        let units = match self.policy.split_unit {
            SplitUnit::Sentence => sentence_units(text),
            SplitUnit::Paragraph => paragraph_units(text),
            SplitUnit::Fixed => fixed_units(text, target.div_ceil(4)),
        };
        Chunks {
            document_id,
            text,
            units,
            target,
            overlap: self.policy.overlap,
            next_fresh: 0,
            prev_first: None,
            sequence_index: 0,
        }
    }
}

/// Lazy iterator over the chunks of one document.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    document_id: &'a str,
    text: &'a str,
    units: Vec<Range<usize>>,
    target: usize,
    overlap: usize,
    /// First unit not covered by any emitted chunk.
    next_fresh: usize,
    prev_first: Option<usize>,
    sequence_index: usize,
}

impl Iterator for Chunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let fresh = self.next_fresh;
        if fresh >= self.units.len() {
            return None;
        }

        let mut first = match self.prev_first {
            Some(prev) => fresh - self.overlap.min(fresh - prev - 1),
            None => fresh,
        };
        while first < fresh && self.units[fresh].end - self.units[first].start > self.target {
            first += 1;
        }

        let start = self.units[first].start;
        let mut last = fresh;
        while last + 1 < self.units.len() && self.units[last + 1].end - start <= self.target {
            last += 1;
        }
        let end = self.units[last].end;

        self.prev_first = Some(first);
        self.next_fresh = last + 1;

        let chunk = make_chunk(self.document_id, self.sequence_index, self.text, start..end);
        self.sequence_index += 1;
        Some(chunk)
    }
}

/// Rebuild the source text from a chunk sequence by dropping overlaps.
///
/// Inverse of [`Chunker::chunks`] for any policy.
pub fn reassemble(chunks: &[Chunk]) -> String {
    let mut out = String::new();
    let mut covered = 0usize;
    for chunk in chunks {
        let skip = covered.saturating_sub(chunk.start_offset);
        out.push_str(&chunk.text[skip..]);
        covered = chunk.end_offset;
    }
    out
}

fn make_chunk(document_id: &str, index: usize, text: &str, range: Range<usize>) -> Chunk {
    let body = &text[range.clone()];
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    let hash = format!("{:x}", hasher.finalize());
    let id = Uuid::new_v5(
        &Uuid::NAMESPACE_OID,
        format!("{}:{}", document_id, index).as_bytes(),
    );

    Chunk {
        id: id.to_string(),
        document_id: document_id.to_string(),
        sequence_index: index,
        text: body.to_string(),
        start_offset: range.start,
        end_offset: range.end,
        hash,
    }
}

/// Closing punctuation allowed between a terminator and the following space.
fn is_closer(c: char) -> bool {
    matches!(c, '"' | '\'' | ')' | ']' | '\u{201d}' | '\u{2019}')
}

fn sentence_units(text: &str) -> Vec<Range<usize>> {
    let mut units = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        let mut end = i + c.len_utf8();
        let boundary = match c {
            '.' | '!' | '?' => {
                while let Some(&(j, d)) = chars.peek() {
                    if !is_closer(d) {
                        break;
                    }
                    end = j + d.len_utf8();
                    chars.next();
                }
                chars.peek().map_or(true, |&(_, d)| d.is_whitespace())
            }
            '\n' => matches!(chars.peek(), Some(&(_, '\n'))),
            _ => false,
        };
        if !boundary {
            continue;
        }
        while let Some(&(j, d)) = chars.peek() {
            if !d.is_whitespace() {
                break;
            }
            end = j + d.len_utf8();
            chars.next();
        }
        units.push(start..end);
        start = end;
    }

    if start < text.len() {
        units.push(start..text.len());
    }
    units
}

fn paragraph_units(text: &str) -> Vec<Range<usize>> {
    let mut units = Vec::new();
    let mut start = 0;
    let mut search_from = 0;

    while let Some(pos) = text[search_from..].find("\n\n") {
        let mut end = search_from + pos;
        end += text[end..].len() - text[end..].trim_start().len();
        units.push(start..end);
        start = end;
        search_from = end;
    }

    if start < text.len() {
        units.push(start..text.len());
    }
    units
}

fn fixed_units(text: &str, width: usize) -> Vec<Range<usize>> {
    let mut units = Vec::new();
    let mut start = 0;
    while start < text.len() {
        let mut end = (start + width).min(text.len());
        while !text.is_char_boundary(end) {
            end += 1;
        }
        units.push(start..end);
        start = end;
    }
    units
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRANCE: &str = "The capital of France is Paris. Paris has a population of over 2 million.";

    fn chunk_all(text: &str, target_size: usize, overlap: usize, unit: SplitUnit) -> Vec<Chunk> {
        Chunker::new(ChunkPolicy {
            target_size,
            overlap,
            split_unit: unit,
        })
        .chunks("doc1", text)
        .collect()
    }

    fn long_text() -> String {
        (0..60)
            .map(|i| {
                if i % 7 == 6 {
                    format!("Sentence number {} ends a paragraph.\n\n", i)
                } else {
                    format!("Sentence number {} talks about topic {}! ", i, i % 5)
                }
            })
            .collect()
    }

    #[test]
    fn sentence_units_tile_text() {
        let text = "One. Two? \"Three!\" Four\n\nFive";
        let units = sentence_units(text);
        let joined: String = units.iter().map(|r| &text[r.clone()]).collect();
        assert_eq!(joined, text);
        assert_eq!(&text[units[0].clone()], "One. ");
        assert_eq!(&text[units[2].clone()], "\"Three!\" ");
        assert_eq!(&text[units[3].clone()], "Four\n\n");
    }

    #[test]
    fn decimal_point_is_not_a_boundary() {
        let units = sentence_units("Pi is 3.14 roughly. Next.");
        assert_eq!(units.len(), 2);
    }

    #[test]
    fn small_text_single_chunk() {
        let chunks = chunk_all(FRANCE, 1000, 1, SplitUnit::Sentence);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, FRANCE);
        assert_eq!(chunks[0].sequence_index, 0);
        assert_eq!(chunks[0].start_offset, 0);
        assert_eq!(chunks[0].end_offset, FRANCE.len());
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunk_all("", 100, 1, SplitUnit::Sentence).is_empty());
    }

    #[test]
    fn sentences_split_at_target() {
        let chunks = chunk_all(FRANCE, 40, 1, SplitUnit::Sentence);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "The capital of France is Paris. ");
        assert_eq!(chunks[1].text, "Paris has a population of over 2 million.");
    }

    #[test]
    fn oversized_unit_is_kept_whole() {
        let text = "Short. This single sentence is far longer than the tiny target size allows. End.";
        let chunks = chunk_all(text, 10, 0, SplitUnit::Sentence);
        assert_eq!(chunks.len(), 3);
        assert!(chunks[1].text.len() > 10);
        assert!(chunks[1].text.starts_with("This single sentence"));
    }

    #[test]
    fn chunk_text_matches_offsets() {
        let text = long_text();
        for c in chunk_all(&text, 200, 2, SplitUnit::Sentence) {
            assert_eq!(c.text, &text[c.start_offset..c.end_offset]);
        }
    }

    #[test]
    fn overlap_repeats_trailing_units() {
        let text = "Alpha one. Beta two. Gamma three. Delta four. Epsilon five.";
        let chunks = chunk_all(text, 25, 1, SplitUnit::Sentence);
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            assert!(pair[1].start_offset < pair[0].end_offset, "expected overlap");
            assert!(pair[1].start_offset > pair[0].start_offset, "expected progress");
        }
    }

    #[test]
    fn reassembly_is_lossless_for_every_unit() {
        let text = long_text();
        for unit in [SplitUnit::Sentence, SplitUnit::Paragraph, SplitUnit::Fixed] {
            for (target, overlap) in [(50, 0), (120, 1), (300, 3), (5, 2)] {
                let chunks = chunk_all(&text, target, overlap, unit);
                assert_eq!(
                    reassemble(&chunks),
                    text,
                    "unit={:?} target={} overlap={}",
                    unit,
                    target,
                    overlap
                );
            }
        }
    }

    #[test]
    fn sequence_indices_contiguous() {
        let text = long_text();
        let chunks = chunk_all(&text, 90, 1, SplitUnit::Sentence);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.sequence_index, i, "Index mismatch at position {}", i);
        }
    }

    #[test]
    fn restartable_and_deterministic() {
        let text = long_text();
        let chunker = Chunker::new(ChunkPolicy::default());
        let a: Vec<Chunk> = chunker.chunks("doc1", &text).collect();
        let b: Vec<Chunk> = chunker.chunks("doc1", &text).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn lazy_take_does_not_need_whole_sequence() {
        let text = long_text();
        let chunker = Chunker::new(ChunkPolicy {
            target_size: 60,
            overlap: 0,
            split_unit: SplitUnit::Sentence,
        });
        let first_two: Vec<Chunk> = chunker.chunks("doc1", &text).take(2).collect();
        assert_eq!(first_two.len(), 2);
        assert_eq!(first_two[1].sequence_index, 1);
    }

    #[test]
    fn multibyte_fixed_windows() {
        let text = "┌──────────────────┐\n│ Hello world      │\n└──────────────────┘";
        let chunks = chunk_all(text, 8, 1, SplitUnit::Fixed);
        assert!(!chunks.is_empty());
        assert_eq!(reassemble(&chunks), text);
    }

    #[test]
    fn paragraph_units_keep_blank_lines_with_previous() {
        let text = "First para.\n\n\nSecond para.\n\nThird.";
        let units = paragraph_units(text);
        assert_eq!(units.len(), 3);
        assert_eq!(&text[units[0].clone()], "First para.\n\n\n");
        assert_eq!(&text[units[2].clone()], "Third.");
    }

    #[test]
    fn split_unit_parses() {
        assert_eq!("paragraph".parse::<SplitUnit>(), Ok(SplitUnit::Paragraph));
        assert!("words".parse::<SplitUnit>().is_err());
    }

    #[test]
    fn chunk_ids_are_stable_per_document() {
        let a = chunk_all(FRANCE, 40, 0, SplitUnit::Sentence);
        let b = chunk_all(FRANCE, 40, 0, SplitUnit::Sentence);
        assert_eq!(a[0].id, b[0].id);
        assert_ne!(a[0].id, a[1].id);
    }
}
