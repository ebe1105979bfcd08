//! Search layer facade.
//!
//! - **[`cache`]**: per-run memo of oracle answers keyed by surface word.
//! - **[`pool`]**: the sorted, de-duplicated candidate frontier and its pruning.
//! - **[`strategy`]**: the strategy trait and the per-step environment.
//! - **[`centroid`]**: Centroid-Sampling (weighted centroid of random top candidates).
//! - **[`greedy`]**: Greedy-Neighborhood (first-improvement hill climbing).
//! - **[`solver`]**: the search loop, its outcomes and report.

pub mod cache;
pub mod centroid;
pub mod greedy;
pub mod pool;
pub mod solver;
pub mod strategy;

pub use cache::{CacheStats, QueryCache};
pub use pool::{CandidatePool, PrunePolicy};
pub use solver::{SearchContext, SearchOutcome, SearchReport, Solver, SolverError};
pub use strategy::{SearchStrategy, StrategyKind};
