//! Core entity types shared by the embedding, oracle and search layers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between a surface word and its tag in tagged vocabularies
/// (e.g. `chat_n`, `manger_v`).
pub const TAG_SEPARATOR: char = '_';

/// Vocabulary identifier in the embedding space.
///
/// A tagged vocabulary can hold the same surface word several times
/// (`porte_n`, `porte_v`), so the key and the word sent to the oracle are
/// distinct. The key is immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WordKey(String);

impl WordKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercase surface word with any tag suffix stripped.
    ///
    /// `Chat_n` -> `chat`, `été` -> `été`.
    pub fn surface_word(&self) -> String {
        self.0
            .split(TAG_SEPARATOR)
            .next()
            .unwrap_or_default()
            .to_lowercase()
    }
}

impl fmt::Display for WordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WordKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for WordKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A scored entry of the search frontier.
///
/// `vector` is the embedding of `word_key`, fetched once when the candidate
/// is admitted and never recomputed.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub word_key: WordKey,
    pub score: f64,
    pub vector: Vec<f32>,
}

impl ScoredCandidate {
    pub fn new(word_key: WordKey, score: f64, vector: Vec<f32>) -> Self {
        Self {
            word_key,
            score,
            vector,
        }
    }
}

/// One entry in a run's history of newly admitted candidates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcceptedCandidate {
    /// Search iteration that produced the candidate (0 during bootstrap).
    pub iteration: usize,
    pub word_key: WordKey,
    pub score: f64,
    /// Cumulative oracle queries at the time of acceptance.
    pub queries: usize,
}
