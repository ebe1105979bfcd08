//! The search loop.
//!
//! State machine:
//! ```text
//! Bootstrap ──> Searching ──> Finished(Solved | Stagnated | BudgetExhausted | Interrupted)
//!     │                ▲
//!     └── Solved ──────┘ (a random seed word can already be the answer)
//! ```
//!
//! Bootstrap fills the pool with random vocabulary words until the strategy's
//! seed size is reached. Searching then calls the strategy once per
//! iteration. When a Centroid step has nothing to offer, the next iteration
//! is a random fallback draw instead; it counts against the budget like any
//! other iteration. Pruning runs after each iteration when the strategy asks
//! for it.
//!
//! The loop is strictly sequential. The cancel flag is checked between
//! iterations, never during an oracle call, so an interrupted run leaves the
//! pool and cache consistent.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::rngs::StdRng;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::cache::{CacheStats, QueryCache};
use super::centroid::CentroidSampling;
use super::greedy::GreedyNeighborhood;
use super::pool::{CandidatePool, PoolError};
use super::strategy::{SearchStrategy, StepEnv, StepOutcome, StrategyKind};
use crate::config::SolverConfig;
use crate::embedding::{EmbeddingError, EmbeddingIndex};
use crate::model::types::{AcceptedCandidate, ScoredCandidate, WordKey};
use crate::oracle::ScoreOracle;

/// Score of the secret word.
pub const SOLVED_SCORE: f64 = 1.0;

#[derive(Error, Debug)]
pub enum SolverError {
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("candidate pool is empty")]
    EmptyPool,

    #[error("no vocabulary to draw from (restricted size {0})")]
    EmptyVocabulary(usize),

    #[error("oracle returned no score for {attempts} consecutive random draws")]
    OracleUnresponsive { attempts: usize },
}

/// Embedding index plus the run-wide knobs the loop itself needs.
#[derive(Clone, Copy)]
pub struct SearchContext<'a> {
    pub index: &'a dyn EmbeddingIndex,
    /// Vocabulary restriction for draws and neighbour queries.
    pub vocab_size: usize,
    pub max_draw_attempts: usize,
}

impl<'a> SearchContext<'a> {
    pub fn new(index: &'a dyn EmbeddingIndex, config: &SolverConfig) -> Self {
        Self {
            index,
            vocab_size: config.vocab_size,
            max_draw_attempts: config.max_draw_attempts,
        }
    }

    /// Number of vocabulary entries actually reachable.
    pub fn reachable_vocab(&self) -> usize {
        self.vocab_size.min(self.index.vocab_len())
    }
}

impl std::fmt::Debug for SearchContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchContext")
            .field("vocab_len", &self.index.vocab_len())
            .field("vocab_size", &self.vocab_size)
            .field("max_draw_attempts", &self.max_draw_attempts)
            .finish()
    }
}

/// Build the strategy selected in `config`.
pub fn strategy_from_config(config: &SolverConfig) -> Box<dyn SearchStrategy> {
    match config.strategy {
        StrategyKind::Centroid => Box::new(CentroidSampling::new(config.centroid.clone())),
        StrategyKind::Greedy => Box::new(GreedyNeighborhood::new(config.greedy.clone())),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchPhase {
    Bootstrap,
    Searching,
    Finished,
}

/// How a run ended. None of these is an error: every outcome comes with the
/// best candidate found so far.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SearchOutcome {
    Solved { word_key: WordKey, word: String },
    /// Greedy only: no neighbour of the best word improves on it.
    Stagnated { neighborhood_size: usize, hint: String },
    /// Centroid only: the iteration cap was reached.
    BudgetExhausted { iterations: usize },
    Interrupted,
}

impl SearchOutcome {
    pub fn is_solved(&self) -> bool {
        matches!(self, SearchOutcome::Solved { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BestCandidate {
    pub word_key: WordKey,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchReport {
    pub strategy: StrategyKind,
    pub outcome: SearchOutcome,
    /// Best candidate ever admitted, even if later pruned away.
    pub best: Option<BestCandidate>,
    pub iterations: usize,
    pub oracle_queries: usize,
    pub cache: CacheStats,
    pub pool_size: usize,
    /// Every admitted candidate, in order.
    pub accepted: Vec<AcceptedCandidate>,
}

/// A random draw that obtained a definite score.
struct Draw {
    word_key: WordKey,
    score: f64,
    inserted: bool,
}

pub struct Solver<'a> {
    ctx: SearchContext<'a>,
    strategy: Box<dyn SearchStrategy>,
    pool: CandidatePool,
    cache: QueryCache<'a>,
    rng: StdRng,
    cancel: Arc<AtomicBool>,
    phase: SearchPhase,
    iterations: usize,
    history: Vec<AcceptedCandidate>,
    best: Option<BestCandidate>,
}

impl<'a> Solver<'a> {
    pub fn new(
        ctx: SearchContext<'a>,
        strategy: Box<dyn SearchStrategy>,
        oracle: &'a mut dyn ScoreOracle,
        rng: StdRng,
    ) -> Self {
        Self {
            ctx,
            strategy,
            pool: CandidatePool::new(),
            cache: QueryCache::new(oracle),
            rng,
            cancel: Arc::new(AtomicBool::new(false)),
            phase: SearchPhase::Bootstrap,
            iterations: 0,
            history: Vec::new(),
            best: None,
        }
    }

    /// Share an external cancel flag (e.g. set from a signal handler).
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn pool(&self) -> &CandidatePool {
        &self.pool
    }

    pub fn phase(&self) -> SearchPhase {
        self.phase
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn oracle_queries(&self) -> usize {
        self.cache.oracle_queries()
    }

    /// Run until solved, stagnated, out of budget or cancelled.
    ///
    /// # Errors
    ///
    /// Only for conditions that indicate a broken setup: unknown vocabulary
    /// keys, an empty vocabulary, or an oracle that never answers.
    pub fn run(&mut self) -> Result<SearchReport, SolverError> {
        info!(
            strategy = %self.strategy.kind(),
            vocab = self.ctx.reachable_vocab(),
            "search started"
        );

        if let Some(outcome) = self.bootstrap()? {
            return Ok(self.finish(outcome));
        }

        self.phase = SearchPhase::Searching;
        let budget = self.strategy.iteration_budget();
        let prune = self.strategy.prune_policy();
        let mut fallback_due = false;

        loop {
            if self.is_cancelled() {
                return Ok(self.finish(SearchOutcome::Interrupted));
            }
            if let Some(budget) = budget
                && self.iterations >= budget
            {
                return Ok(self.finish(SearchOutcome::BudgetExhausted {
                    iterations: self.iterations,
                }));
            }
            self.iterations += 1;

            if std::mem::take(&mut fallback_due) {
                let draw = self.draw_random()?;
                info!(
                    iteration = self.iterations,
                    word = %draw.word_key,
                    score = draw.score,
                    "random fallback draw"
                );
                if draw.inserted {
                    self.record(&draw.word_key, draw.score);
                } else {
                    debug!(word = %draw.word_key, "fallback draw already in pool");
                }
                if draw.score >= SOLVED_SCORE {
                    return Ok(self.finish(solved(draw.word_key)));
                }
            } else {
                let mut env = StepEnv {
                    index: self.ctx.index,
                    pool: &mut self.pool,
                    cache: &mut self.cache,
                    rng: &mut self.rng,
                    vocab_size: self.ctx.vocab_size,
                };
                match self.strategy.step(&mut env)? {
                    StepOutcome::Accepted { word_key, score } => {
                        self.record(&word_key, score);
                        if score >= SOLVED_SCORE {
                            return Ok(self.finish(solved(word_key)));
                        }
                    }
                    StepOutcome::Pending => {}
                    StepOutcome::Exhausted => {
                        debug!(iteration = self.iterations, "no usable proposal, falling back to a random draw");
                        fallback_due = true;
                    }
                    StepOutcome::NoImprovement { neighborhood_size } => {
                        return Ok(self.finish(SearchOutcome::Stagnated {
                            neighborhood_size,
                            hint: format!(
                                "no neighbour of the current best scores higher; \
                                 increase the neighbourhood size (currently {neighborhood_size})"
                            ),
                        }));
                    }
                }
            }

            if let Some(policy) = prune
                && policy.should_prune(self.pool.len())
            {
                let removed = self
                    .pool
                    .prune(policy.keep_top, policy.sample_n, &mut self.rng);
                info!(removed, remaining = self.pool.len(), "pruned candidate pool");
            }
        }
    }

    /// Fill the pool to the strategy's seed size with random words.
    /// Returns an outcome if the run ended during bootstrap.
    fn bootstrap(&mut self) -> Result<Option<SearchOutcome>, SolverError> {
        self.phase = SearchPhase::Bootstrap;
        let target = self.strategy.seed_size().min(self.ctx.reachable_vocab());
        let mut stalled = 0usize;

        while self.pool.len() < target {
            if self.is_cancelled() {
                return Ok(Some(SearchOutcome::Interrupted));
            }
            let draw = self.draw_random()?;
            if draw.inserted {
                stalled = 0;
                self.record(&draw.word_key, draw.score);
            } else {
                stalled += 1;
            }
            if draw.score >= SOLVED_SCORE {
                return Ok(Some(solved(draw.word_key)));
            }
            // Remaining vocabulary may all be unscorable or already pooled.
            if stalled >= self.ctx.max_draw_attempts && !self.pool.is_empty() {
                warn!(
                    pool = self.pool.len(),
                    target, "bootstrap stalled, searching with a smaller seed pool"
                );
                break;
            }
        }

        if self.pool.is_empty() {
            return Err(SolverError::EmptyPool);
        }
        debug!(pool = self.pool.len(), queries = self.cache.oracle_queries(), "bootstrap complete");
        Ok(None)
    }

    /// Draw random words until one has a definite score, and admit it.
    fn draw_random(&mut self) -> Result<Draw, SolverError> {
        let mut unscored = 0usize;
        loop {
            let word_key = self
                .ctx
                .index
                .random_vocab_sample(self.ctx.vocab_size, &mut self.rng)
                .ok_or(SolverError::EmptyVocabulary(self.ctx.vocab_size))?;

            match self.cache.get_or_query(&word_key) {
                Some(score) => {
                    let inserted = if self.pool.contains(&word_key) {
                        false
                    } else {
                        let vector = self.ctx.index.vector_of(&word_key)?;
                        self.pool
                            .insert(ScoredCandidate::new(word_key.clone(), score, vector))
                    };
                    return Ok(Draw {
                        word_key,
                        score,
                        inserted,
                    });
                }
                None => {
                    unscored += 1;
                    debug!(word = %word_key, unscored, "random draw got no score");
                    if unscored >= self.ctx.max_draw_attempts {
                        warn!(
                            attempts = unscored,
                            queries = self.cache.oracle_queries(),
                            "oracle gave no score to any recent random draw, giving up"
                        );
                        return Err(SolverError::OracleUnresponsive { attempts: unscored });
                    }
                }
            }
        }
    }

    fn record(&mut self, word_key: &WordKey, score: f64) {
        let queries = self.cache.oracle_queries();
        let new_best = self.best.as_ref().is_none_or(|b| score > b.score);
        if new_best {
            self.best = Some(BestCandidate {
                word_key: word_key.clone(),
                score,
            });
        }
        info!(
            iteration = self.iterations,
            queries,
            word = %word_key,
            score,
            new_best,
            "accepted candidate"
        );
        self.history.push(AcceptedCandidate {
            iteration: self.iterations,
            word_key: word_key.clone(),
            score,
            queries,
        });
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn finish(&mut self, outcome: SearchOutcome) -> SearchReport {
        self.phase = SearchPhase::Finished;
        let queries = self.cache.oracle_queries();
        match &outcome {
            SearchOutcome::Solved { word_key, .. } => {
                info!(word = %word_key, queries, "finished in {queries} requests")
            }
            SearchOutcome::Stagnated { hint, .. } => info!(queries, "search stagnated: {hint}"),
            SearchOutcome::BudgetExhausted { iterations } => {
                info!(iterations, queries, "iteration budget exhausted")
            }
            SearchOutcome::Interrupted => info!(queries, "search interrupted"),
        }

        SearchReport {
            strategy: self.strategy.kind(),
            outcome,
            best: self.best.clone(),
            iterations: self.iterations,
            oracle_queries: queries,
            cache: self.cache.stats(),
            pool_size: self.pool.len(),
            accepted: self.history.clone(),
        }
    }
}

fn solved(word_key: WordKey) -> SearchOutcome {
    let word = word_key.surface_word();
    SearchOutcome::Solved { word_key, word }
}

impl std::fmt::Debug for Solver<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Solver")
            .field("ctx", &self.ctx)
            .field("strategy", &self.strategy.kind())
            .field("phase", &self.phase)
            .field("iterations", &self.iterations)
            .field("pool", &self.pool.len())
            .field("cache", &self.cache)
            .finish()
    }
}
