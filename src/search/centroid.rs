//! Centroid-Sampling strategy.
//!
//! Each step picks a random handful of the current top candidates, averages
//! their vectors weighted by how well they scored relative to each other, and
//! asks the index for the words nearest to that synthetic point. The first
//! proposal not yet in the pool that gets a score is admitted.
//!
//! Proposals are walked across steps: a step stops after spending one
//! oracle query, and a proposal the oracle cannot score leaves the rest of
//! the list for the next step. Only when the whole list is pooled or
//! unscorable does the step report [`StepOutcome::Exhausted`].
//!
//! Randomising the subset every step keeps the search exploring around the
//! whole top tier rather than collapsing onto the single best word.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::pool::PrunePolicy;
use super::solver::SolverError;
use super::strategy::{SearchStrategy, StepEnv, StepOutcome, StrategyKind};
use crate::embedding::NeighborQuery;
use crate::model::types::WordKey;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CentroidConfig {
    /// Random draws required before searching.
    pub seed_size: usize,
    /// Tier of best candidates the subset is drawn from.
    pub top_tier: usize,
    /// Candidates per centroid.
    pub sample_size: usize,
    /// Neighbours requested around each centroid.
    pub proposals: usize,
    pub max_iterations: usize,
    pub prune: PrunePolicy,
}

impl Default for CentroidConfig {
    fn default() -> Self {
        Self {
            seed_size: 20,
            top_tier: 50,
            sample_size: 10,
            proposals: 10,
            max_iterations: 500,
            prune: PrunePolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CentroidSampling {
    config: CentroidConfig,
    /// Proposals of the current centroid not walked yet, nearest last so
    /// `pop` walks them in similarity order.
    pending: Vec<WordKey>,
}

impl CentroidSampling {
    pub fn new(config: CentroidConfig) -> Self {
        Self {
            config,
            pending: Vec::new(),
        }
    }

    fn propose(&self, env: &mut StepEnv<'_, '_>) -> Result<Vec<WordKey>, SolverError> {
        let tier = self.config.top_tier.min(env.pool.len());
        let n = self.config.sample_size.min(tier);
        if n == 0 {
            return Ok(Vec::new());
        }

        let centroid = {
            let sample = env.pool.sample_from_top(tier, n, &mut *env.rng)?;
            let scores: Vec<f64> = sample.iter().map(|c| c.score).collect();
            let weights = centroid_weights(&scores);
            let vectors: Vec<&[f32]> = sample.iter().map(|c| c.vector.as_slice()).collect();
            weighted_centroid(&vectors, &weights)
        };

        let mut proposals = env.index.nearest(
            NeighborQuery::Vector(&centroid),
            env.vocab_size,
            self.config.proposals,
        )?;
        proposals.reverse();
        Ok(proposals)
    }
}

impl SearchStrategy for CentroidSampling {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Centroid
    }

    fn seed_size(&self) -> usize {
        self.config.seed_size
    }

    fn iteration_budget(&self) -> Option<usize> {
        Some(self.config.max_iterations)
    }

    fn prune_policy(&self) -> Option<PrunePolicy> {
        Some(self.config.prune)
    }

    fn step(&mut self, env: &mut StepEnv<'_, '_>) -> Result<StepOutcome, SolverError> {
        if self.pending.is_empty() {
            self.pending = self.propose(env)?;
        }

        while let Some(key) = self.pending.pop() {
            if env.pool.contains(&key) {
                continue;
            }
            let was_cached = env.cache.contains(&key);
            match env.cache.get_or_query(&key) {
                Some(score) => {
                    self.pending.clear();
                    env.admit(&key, score)?;
                    return Ok(StepOutcome::Accepted {
                        word_key: key,
                        score,
                    });
                }
                // This step's one query came back empty; resume after it.
                None if !was_cached => {
                    debug!(word = %key, remaining = self.pending.len(), "proposal returned no score");
                    return Ok(StepOutcome::Pending);
                }
                None => continue,
            }
        }
        Ok(StepOutcome::Exhausted)
    }
}

/// Per-candidate centroid weights.
///
/// Scores are shifted so the sample minimum is zero, then normalised to sum
/// to one. When every score is equal the shifted sum is zero and the weights
/// are uniform instead.
#[must_use]
pub fn centroid_weights(scores: &[f64]) -> Vec<f64> {
    if scores.is_empty() {
        return Vec::new();
    }
    let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
    let shifted: Vec<f64> = scores.iter().map(|s| s - min).collect();
    let total: f64 = shifted.iter().sum();

    if total <= 0.0 || !total.is_finite() {
        let uniform = 1.0 / scores.len() as f64;
        return vec![uniform; scores.len()];
    }
    shifted.into_iter().map(|s| s / total).collect()
}

/// Weighted sum of equally sized vectors.
#[must_use]
pub fn weighted_centroid(vectors: &[&[f32]], weights: &[f64]) -> Vec<f32> {
    let dim = vectors.first().map_or(0, |v| v.len());
    let mut out = vec![0.0f32; dim];
    for (vector, weight) in vectors.iter().zip(weights) {
        let w = *weight as f32;
        for (acc, x) in out.iter_mut().zip(vector.iter()) {
            *acc += w * x;
        }
    }
    out
}
