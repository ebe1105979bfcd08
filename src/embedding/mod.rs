//! Embedding index layer.
//!
//! The solver only needs three things from the embedding space:
//!
//! - **vector lookup**: the raw embedding of a vocabulary key
//! - **nearest neighbours**: cosine-ranked keys around a key or a raw vector,
//!   restricted to the N most frequent vocabulary entries
//! - **random draws**: a uniformly random key from that same restricted vocabulary
//!
//! These are captured by the [`EmbeddingIndex`] trait. The concrete
//! implementation is [`word2vec::Word2VecIndex`], loaded from a word2vec file.
//! The index is immutable for the duration of a run.

pub mod word2vec;

use rand::RngCore;
use thiserror::Error;

use crate::model::types::WordKey;

pub use word2vec::Word2VecIndex;

/// Errors raised by an embedding index.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// The key is not in the vocabulary. Candidates are always drawn from the
    /// index itself, so this points at a logic bug rather than bad input.
    #[error("unknown vocabulary key: {0}")]
    UnknownKey(WordKey),

    #[error("query vector has dimension {found}, index expects {expected}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("failed to read embeddings: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed embeddings file: {0}")]
    Format(String),

    #[error("embedding vocabulary is empty")]
    EmptyVocabulary,
}

/// What to search around in [`EmbeddingIndex::nearest`].
#[derive(Debug, Clone, Copy)]
pub enum NeighborQuery<'q> {
    /// A vocabulary key; the key itself is excluded from the results.
    Key(&'q WordKey),
    /// A synthetic point in the embedding space.
    Vector(&'q [f32]),
}

/// Read-only view over a pretrained embedding space.
pub trait EmbeddingIndex {
    /// Vector dimension.
    fn dimension(&self) -> usize;

    /// Total vocabulary size (unrestricted).
    fn vocab_len(&self) -> usize;

    /// Whether `key` is part of the vocabulary.
    fn contains(&self, key: &WordKey) -> bool;

    /// The stored embedding of `key`.
    fn vector_of(&self, key: &WordKey) -> Result<Vec<f32>, EmbeddingError>;

    /// Up to `count` keys ordered by descending cosine similarity to `query`,
    /// searched only among the `restrict_to_top_n` most frequent entries.
    fn nearest(
        &self,
        query: NeighborQuery<'_>,
        restrict_to_top_n: usize,
        count: usize,
    ) -> Result<Vec<WordKey>, EmbeddingError>;

    /// A uniformly random key among the `restrict_to_top_n` most frequent
    /// entries, or `None` for an empty vocabulary.
    fn random_vocab_sample(
        &self,
        restrict_to_top_n: usize,
        rng: &mut dyn RngCore,
    ) -> Option<WordKey>;
}

/// Euclidean norm.
#[must_use]
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Copy of `v` scaled to unit length. Zero vectors stay zero.
#[must_use]
pub fn normalized(v: &[f32]) -> Vec<f32> {
    let norm = l2_norm(v);
    if norm <= f32::EPSILON {
        return vec![0.0; v.len()];
    }
    v.iter().map(|x| x / norm).collect()
}

/// Cosine similarity; 0.0 when either side is a zero vector.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let denom = l2_norm(a) * l2_norm(b);
    if denom <= f32::EPSILON {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    dot / denom
}
