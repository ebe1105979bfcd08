//! Strategy seam of the search loop.
//!
//! A strategy proposes and scores the next candidate from the current pool.
//! Each [`SearchStrategy::step`] spends at most one oracle query (one cache
//! miss); everything else it looks at must already be cached.

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use super::cache::QueryCache;
use super::pool::{CandidatePool, PrunePolicy};
use super::solver::SolverError;
use crate::embedding::EmbeddingIndex;
use crate::model::types::{ScoredCandidate, WordKey};

/// Which strategy to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Query near score-weighted centroids of random top candidates.
    #[default]
    Centroid,
    /// Hill-climb through the neighbourhood of the current best.
    Greedy,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyKind::Centroid => write!(f, "centroid"),
            StrategyKind::Greedy => write!(f, "greedy"),
        }
    }
}

/// Everything a strategy may read or mutate during one step.
pub struct StepEnv<'s, 'a> {
    pub index: &'a dyn EmbeddingIndex,
    pub pool: &'s mut CandidatePool,
    pub cache: &'s mut QueryCache<'a>,
    pub rng: &'s mut StdRng,
    /// Vocabulary restriction passed to every index query.
    pub vocab_size: usize,
}

impl StepEnv<'_, '_> {
    /// Fetch the vector for `key` and insert it into the pool.
    /// Returns whether the pool changed.
    pub fn admit(&mut self, key: &WordKey, score: f64) -> Result<bool, SolverError> {
        if self.pool.contains(key) {
            return Ok(false);
        }
        let vector = self.index.vector_of(key)?;
        Ok(self
            .pool
            .insert(ScoredCandidate::new(key.clone(), score, vector)))
    }
}

/// Result of a single strategy step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// A new candidate entered the pool.
    Accepted { word_key: WordKey, score: f64 },
    /// Progress was made (one query spent) but nothing was admitted yet.
    Pending,
    /// The strategy has no usable proposal; the loop should draw a random word.
    Exhausted,
    /// The whole neighbourhood of the current best was scanned without finding
    /// a strictly better word.
    NoImprovement { neighborhood_size: usize },
}

pub trait SearchStrategy {
    fn kind(&self) -> StrategyKind;

    /// Pool size the loop must reach with random draws before searching.
    fn seed_size(&self) -> usize;

    /// Iteration cap, if the strategy has one.
    fn iteration_budget(&self) -> Option<usize>;

    /// Pool pruning to apply after each iteration, if any.
    fn prune_policy(&self) -> Option<PrunePolicy>;

    fn step(&mut self, env: &mut StepEnv<'_, '_>) -> Result<StepOutcome, SolverError>;
}
