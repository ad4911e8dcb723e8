//! Embedding backend trait and vector utilities.
//!
//! Defines the [`Embedder`] trait that every embedding backend implements,
//! the deterministic [`HashEmbedder`] used offline and in tests, and the
//! pure helpers the index relies on ([`cosine_similarity`],
//! [`l2_normalize`], [`validate_batch`]).
//!
//! Network-backed providers (OpenAI, Ollama, fastembed) live in the
//! `study-rag` app crate.

use std::collections::HashMap;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::{RagError, Result};

/// A text → vector backend.
///
/// Chunk texts and queries must go through the same instance so their
/// vectors share a model and dimensionality.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"all-minilm-l6-v2"`).
    fn model_name(&self) -> &str;

    /// Returns the embedding vector dimensionality (e.g. `384`).
    fn dims(&self) -> usize;

    /// Embed a batch of texts, returning one vector per input, in order.
    ///
    /// Backend failures are reported as [`RagError::EmbeddingUnavailable`].
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let vectors = self.embed(&[text.to_string()]).await?;
        validate_batch(1, self.dims(), &vectors)?;
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| RagError::EmbeddingUnavailable("empty embedding response".into()))
    }
}

/// Check that a backend answered with `expected` vectors of `dims` values.
pub fn validate_batch(expected: usize, dims: usize, vectors: &[Vec<f32>]) -> Result<()> {
    if vectors.len() != expected {
        return Err(RagError::EmbeddingUnavailable(format!(
            "backend returned {} vectors for {} inputs",
            vectors.len(),
            expected
        )));
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
        return Err(RagError::EmbeddingUnavailable(format!(
            "backend returned a {}-dimensional vector, expected {}",
            bad.len(),
            dims
        )));
    }
    Ok(())
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for empty vectors or vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Scale `v` to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm < f32::EPSILON {
        return;
    }
    for x in v.iter_mut() {
        *x /= norm;
    }
}

/// Words carrying no topical signal.
const STOPWORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "an", "and", "any", "are", "as", "at", "be", "been",
    "but", "by", "can", "could", "did", "do", "does", "for", "from", "had", "has", "have", "he",
    "her", "his", "how", "i", "if", "in", "into", "is", "it", "its", "me", "more", "my", "no",
    "not", "of", "on", "or", "our", "over", "she", "so", "than", "that", "the", "their", "them",
    "then", "there", "these", "they", "this", "those", "to", "under", "was", "we", "were",
    "what", "when", "where", "which", "who", "whom", "why", "will", "with", "would", "you",
    "your",
];

/// Deterministic feature-hashing embedder.
///
/// Each content word is lowercased, stripped of a plural `s`, and hashed
/// (SHA-256) into one of `dims` signed buckets weighted by `1 + ln(tf)`.
/// The result is L2-normalised. Texts sharing vocabulary score high and
/// texts with disjoint vocabulary score near zero, which is enough for
/// offline runs and for tests that need reproducible similarities.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dims: usize,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    /// Embed one text synchronously.
    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut counts: HashMap<String, u32> = HashMap::new();
        for token in tokenize(text) {
            *counts.entry(token).or_insert(0) += 1;
        }

        let mut v = vec![0.0f32; self.dims];
        for (token, count) in counts {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dims as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign * (1.0 + (count as f32).ln());
        }
        l2_normalize(&mut v);
        v
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Lowercased content words with a naive plural strip.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .map(|w| {
            if w.len() > 3 && w.ends_with('s') && !w.ends_with("ss") {
                w[..w.len() - 1].to_string()
            } else {
                w
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_empty_and_mismatched() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn normalize_gives_unit_length() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0, 0.0];
        l2_normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }

    #[test]
    fn tokenize_drops_stopwords_and_plurals() {
        let tokens: Vec<String> = tokenize("What is the capital of the Cities?").collect();
        assert_eq!(tokens, vec!["capital", "citie"]);
    }

    #[test]
    fn hash_embedder_is_deterministic_and_normalised() {
        let e = HashEmbedder::new(64);
        let a = e.embed_one("Paris is the capital of France.");
        let b = e.embed_one("Paris is the capital of France.");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn hash_embedder_related_beats_unrelated() {
        let e = HashEmbedder::default();
        let doc = e.embed_one("The capital of France is Paris.");
        let related = e.embed_one("What is the capital of France?");
        let unrelated = e.embed_one("Photosynthesis converts sunlight into sugar.");
        assert!(cosine_similarity(&doc, &related) > cosine_similarity(&doc, &unrelated));
    }

    #[test]
    fn stopword_only_text_is_zero_vector() {
        let v = HashEmbedder::new(16).embed_one("what is the");
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn embed_query_matches_batch() {
        let e = HashEmbedder::new(32);
        let q = e.embed_query("capital cities").await.unwrap();
        let batch = e.embed(&["capital cities".to_string()]).await.unwrap();
        assert_eq!(q, batch[0]);
    }

    #[test]
    fn validate_batch_rejects_bad_shapes() {
        let ok = vec![vec![0.0; 3], vec![0.0; 3]];
        assert!(validate_batch(2, 3, &ok).is_ok());
        assert!(matches!(
            validate_batch(3, 3, &ok),
            Err(RagError::EmbeddingUnavailable(_))
        ));
        assert!(matches!(
            validate_batch(2, 4, &ok),
            Err(RagError::EmbeddingUnavailable(_))
        ));
    }
}
