//! Per-run memo of oracle answers.
//!
//! Entries are keyed by the normalised surface word, not the vocabulary key:
//! homographs such as `porte_n` and `porte_v` send the same word to the
//! oracle and therefore share one entry. Failed queries are cached too, so a
//! word is sent to the oracle at most once per run.

use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use crate::model::types::WordKey;
use crate::oracle::ScoreOracle;

/// Hit/miss counters. Every miss is exactly one oracle call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
}

pub struct QueryCache<'o> {
    oracle: &'o mut dyn ScoreOracle,
    entries: HashMap<String, Option<f64>>,
    stats: CacheStats,
}

impl<'o> QueryCache<'o> {
    pub fn new(oracle: &'o mut dyn ScoreOracle) -> Self {
        Self {
            oracle,
            entries: HashMap::new(),
            stats: CacheStats::default(),
        }
    }

    /// Cached score for `key`'s surface word, querying the oracle on a miss.
    pub fn get_or_query(&mut self, key: &WordKey) -> Option<f64> {
        let word = key.surface_word();
        if let Some(cached) = self.entries.get(&word) {
            self.stats.hits += 1;
            debug!(word = %word, score = ?cached, "cache hit");
            return *cached;
        }

        self.stats.misses += 1;
        let score = self.oracle.score(&word);
        debug!(word = %word, score = ?score, queries = self.stats.misses, "oracle queried");
        self.entries.insert(word, score);
        score
    }

    /// Whether answering `key` would be free (no oracle call).
    pub fn contains(&self, key: &WordKey) -> bool {
        self.entries.contains_key(&key.surface_word())
    }

    /// Number of oracle calls made so far.
    pub fn oracle_queries(&self) -> usize {
        self.stats.misses
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

impl std::fmt::Debug for QueryCache<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("entries", &self.entries.len())
            .field("stats", &self.stats)
            .finish()
    }
}
