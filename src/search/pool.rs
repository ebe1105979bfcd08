//! The search frontier: scored candidates kept sorted by score.
//!
//! Invariants, checked after every mutation in debug builds:
//! - no two entries share a `WordKey`
//! - entries are ordered by descending score, ties in insertion order

use std::collections::HashSet;

use rand::RngCore;
use rand::seq::index;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::types::{ScoredCandidate, WordKey};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PoolError {
    #[error("cannot sample {requested} candidates from a tier of {available}")]
    SampleExceedsTier { requested: usize, available: usize },
}

/// When and how to shrink the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrunePolicy {
    /// Prune once the pool grows strictly beyond this size.
    pub high_water: usize,
    /// Tier to resample from.
    pub keep_top: usize,
    /// Size of the pool after pruning.
    pub sample_n: usize,
}

impl Default for PrunePolicy {
    fn default() -> Self {
        Self {
            high_water: 200,
            keep_top: 100,
            sample_n: 40,
        }
    }
}

impl PrunePolicy {
    pub fn should_prune(&self, pool_len: usize) -> bool {
        pool_len > self.high_water
    }
}

#[derive(Debug, Clone, Default)]
pub struct CandidatePool {
    entries: Vec<ScoredCandidate>,
    keys: HashSet<WordKey>,
}

impl CandidatePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &WordKey) -> bool {
        self.keys.contains(key)
    }

    /// Insert a candidate. Returns `false` (and leaves the pool untouched) if
    /// the key is already present: the first score recorded for a key wins.
    pub fn insert(&mut self, candidate: ScoredCandidate) -> bool {
        if self.keys.contains(&candidate.word_key) {
            return false;
        }
        // After every entry scoring >= the newcomer keeps ties stable.
        let at = self
            .entries
            .partition_point(|c| c.score >= candidate.score);
        self.keys.insert(candidate.word_key.clone());
        self.entries.insert(at, candidate);
        self.debug_check();
        true
    }

    /// The `k` best candidates (fewer if the pool is smaller).
    pub fn top(&self, k: usize) -> &[ScoredCandidate] {
        &self.entries[..k.min(self.entries.len())]
    }

    /// `n` distinct candidates drawn uniformly from `top(k)`, in pool order.
    ///
    /// # Errors
    ///
    /// [`PoolError::SampleExceedsTier`] if `n` exceeds the tier size.
    pub fn sample_from_top(
        &self,
        k: usize,
        n: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<&ScoredCandidate>, PoolError> {
        let tier = self.top(k);
        if n > tier.len() {
            return Err(PoolError::SampleExceedsTier {
                requested: n,
                available: tier.len(),
            });
        }
        let mut picked = index::sample(rng, tier.len(), n).into_vec();
        picked.sort_unstable();
        Ok(picked.into_iter().map(|i| &tier[i]).collect())
    }

    /// Replace the pool with a uniform sample of `sample_n` entries from
    /// `top(keep_top)`. This can drop strong candidates, including the best.
    ///
    /// Returns the number of entries removed.
    pub fn prune(&mut self, keep_top: usize, sample_n: usize, rng: &mut dyn RngCore) -> usize {
        let before = self.entries.len();
        let tier_len = keep_top.min(before);
        let n = sample_n.min(tier_len);

        let mut picked = index::sample(rng, tier_len, n).into_vec();
        picked.sort_unstable();

        let mut kept = Vec::with_capacity(n);
        let mut wanted = picked.into_iter().peekable();
        for (i, candidate) in self.entries.drain(..).enumerate() {
            if wanted.peek() == Some(&i) {
                wanted.next();
                kept.push(candidate);
            }
        }
        self.entries = kept;
        self.keys = self.entries.iter().map(|c| c.word_key.clone()).collect();
        self.debug_check();
        before - self.entries.len()
    }

    pub fn best(&self) -> Option<&ScoredCandidate> {
        self.entries.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScoredCandidate> {
        self.entries.iter()
    }

    fn debug_check(&self) {
        debug_assert_eq!(self.keys.len(), self.entries.len());
        debug_assert!(
            self.entries.windows(2).all(|w| w[0].score >= w[1].score),
            "pool must stay sorted by descending score"
        );
    }
}
