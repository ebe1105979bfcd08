//! Greedy-Neighborhood strategy (first-improvement hill climbing).
//!
//! The current best word is the anchor. Its nearest neighbours are scanned in
//! similarity order and the first one scoring strictly higher becomes the new
//! anchor. A scan can span several steps: each step walks past cached
//! neighbours for free and stops after spending one oracle query. The scan
//! state survives between steps and is rebuilt only when the anchor changes.
//!
//! This variant never prunes and never restarts from a random word: when a
//! full neighbourhood holds no improvement it reports
//! [`StepOutcome::NoImprovement`] so the caller can retry with a larger
//! neighbourhood.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::pool::PrunePolicy;
use super::solver::SolverError;
use super::strategy::{SearchStrategy, StepEnv, StepOutcome, StrategyKind};
use crate::embedding::NeighborQuery;
use crate::model::types::WordKey;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GreedyConfig {
    /// Neighbours scanned around the current best.
    pub neighborhood_size: usize,
}

impl Default for GreedyConfig {
    fn default() -> Self {
        Self {
            neighborhood_size: 300,
        }
    }
}

#[derive(Debug, Clone)]
struct Scan {
    anchor: WordKey,
    anchor_score: f64,
    neighbors: Vec<WordKey>,
    cursor: usize,
}

#[derive(Debug, Clone)]
pub struct GreedyNeighborhood {
    config: GreedyConfig,
    scan: Option<Scan>,
}

impl GreedyNeighborhood {
    pub fn new(config: GreedyConfig) -> Self {
        Self { config, scan: None }
    }
}

impl SearchStrategy for GreedyNeighborhood {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Greedy
    }

    fn seed_size(&self) -> usize {
        1
    }

    fn iteration_budget(&self) -> Option<usize> {
        None
    }

    fn prune_policy(&self) -> Option<PrunePolicy> {
        None
    }

    fn step(&mut self, env: &mut StepEnv<'_, '_>) -> Result<StepOutcome, SolverError> {
        let best = env.pool.best().ok_or(SolverError::EmptyPool)?;
        let (anchor, anchor_score) = (best.word_key.clone(), best.score);

        let stale = self.scan.as_ref().is_none_or(|s| s.anchor != anchor);
        if stale {
            let neighbors = env.index.nearest(
                NeighborQuery::Key(&anchor),
                env.vocab_size,
                self.config.neighborhood_size,
            )?;
            debug!(anchor = %anchor, neighbors = neighbors.len(), "new neighbourhood scan");
            self.scan = Some(Scan {
                anchor,
                anchor_score,
                neighbors,
                cursor: 0,
            });
        }
        let Some(scan) = self.scan.as_mut() else {
            return Err(SolverError::EmptyPool);
        };

        while scan.cursor < scan.neighbors.len() {
            let key = scan.neighbors[scan.cursor].clone();
            scan.cursor += 1;

            let was_cached = env.cache.contains(&key);
            let score = env.cache.get_or_query(&key);
            if let Some(score) = score
                && score > scan.anchor_score
            {
                env.admit(&key, score)?;
                return Ok(StepOutcome::Accepted {
                    word_key: key,
                    score,
                });
            }
            if !was_cached {
                return Ok(StepOutcome::Pending);
            }
        }

        Ok(StepOutcome::NoImprovement {
            neighborhood_size: self.config.neighborhood_size,
        })
    }
}
