use cemantix_solver::model::types::WordKey;
use cemantix_solver::oracle::{ScoreOracle, ScriptedOracle};
use cemantix_solver::search::centroid::{CentroidConfig, CentroidSampling};
use cemantix_solver::search::greedy::{GreedyConfig, GreedyNeighborhood};
use cemantix_solver::search::pool::PrunePolicy;
use cemantix_solver::search::solver::{SearchContext, SearchOutcome, Solver, SolverError};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::HashSet;

mod util;

const VOCAB: usize = 60;

fn ctx(index: &cemantix_solver::embedding::Word2VecIndex) -> SearchContext<'_> {
    SearchContext {
        index,
        vocab_size: VOCAB,
        max_draw_attempts: 20,
    }
}

fn assert_no_repeated_queries(oracle: &ScriptedOracle) {
    let distinct: HashSet<_> = oracle.calls().iter().collect();
    assert_eq!(
        distinct.len(),
        oracle.call_count(),
        "a word was sent to the oracle twice: {:?}",
        oracle.calls()
    );
}

/// Cosine oracle whose secret word scores no higher than `cap` either.
fn capped_oracle(vocab: &[(WordKey, Vec<f32>)], cap: f64) -> ScriptedOracle {
    let mut inner = util::cosine_oracle(vocab, "chat", cap);
    ScriptedOracle::from_fn(move |w| inner.score(w).map(|s| s.min(cap)))
}

#[test]
fn centroid_finds_the_secret_word_within_budget() {
    let vocab = util::synthetic_vocab(VOCAB);
    let index = util::synthetic_index(VOCAB);
    let mut oracle = util::cosine_oracle(&vocab, "chat", 0.99);
    let config = CentroidConfig {
        max_iterations: 2_000,
        ..CentroidConfig::default()
    };

    let tracing = util::TestTracing::new();
    let _guard = tracing.install();

    let report = {
        let mut solver = Solver::new(
            ctx(&index),
            Box::new(CentroidSampling::new(config)),
            &mut oracle,
            StdRng::seed_from_u64(42),
        );
        solver.run().expect("search runs")
    };

    match &report.outcome {
        SearchOutcome::Solved { word_key, word } => {
            assert_eq!(word_key, &WordKey::new("chat_n"));
            assert_eq!(word, "chat");
        }
        other => panic!("expected solved, got {other:?}"),
    }
    assert!(report.iterations <= 2_000);
    assert!(report.oracle_queries <= VOCAB);
    assert_eq!(report.oracle_queries, oracle.call_count());
    assert_eq!(report.best.as_ref().unwrap().score, 1.0);
    assert_no_repeated_queries(&oracle);
    tracing.assert_contains("accepted candidate");
    tracing.assert_contains("finished in");
}

#[test]
fn greedy_finds_the_secret_word_with_full_neighbourhood() {
    let vocab = util::synthetic_vocab(VOCAB);
    let index = util::synthetic_index(VOCAB);
    let mut oracle = util::cosine_oracle(&vocab, "chat", 0.99);

    let report = {
        let mut solver = Solver::new(
            ctx(&index),
            Box::new(GreedyNeighborhood::new(GreedyConfig {
                neighborhood_size: VOCAB,
            })),
            &mut oracle,
            StdRng::seed_from_u64(7),
        );
        solver.run().expect("search runs")
    };

    assert!(report.outcome.is_solved(), "outcome: {:?}", report.outcome);
    assert!(report.oracle_queries <= VOCAB);
    assert_no_repeated_queries(&oracle);
}

#[test]
fn greedy_best_score_only_increases() {
    let vocab = util::synthetic_vocab(VOCAB);
    let index = util::synthetic_index(VOCAB);

    for seed in [1u64, 2, 3, 4] {
        let mut oracle = util::cosine_oracle(&vocab, "chat", 0.99);
        let mut solver = Solver::new(
            ctx(&index),
            Box::new(GreedyNeighborhood::new(GreedyConfig {
                neighborhood_size: VOCAB,
            })),
            &mut oracle,
            StdRng::seed_from_u64(seed),
        );
        let report = solver.run().expect("search runs");
        let scores: Vec<f64> = report.accepted.iter().map(|a| a.score).collect();
        assert!(
            scores.windows(2).all(|w| w[1] > w[0]),
            "seed {seed}: scores not strictly increasing: {scores:?}"
        );
        assert_eq!(solver.pool().len(), report.accepted.len());
    }
}

#[test]
fn greedy_reports_stagnation_without_touching_the_pool() {
    let index = util::synthetic_index(VOCAB);
    let mut oracle = ScriptedOracle::from_fn(|_| Some(0.3));

    let (report, pool_len, best) = {
        let mut solver = Solver::new(
            ctx(&index),
            Box::new(GreedyNeighborhood::new(GreedyConfig {
                neighborhood_size: 10,
            })),
            &mut oracle,
            StdRng::seed_from_u64(11),
        );
        let report = solver.run().expect("stagnation is not an error");
        let best = solver.pool().best().cloned().expect("seed word kept");
        (report, solver.pool().len(), best)
    };

    match &report.outcome {
        SearchOutcome::Stagnated {
            neighborhood_size,
            hint,
        } => {
            assert_eq!(*neighborhood_size, 10);
            assert!(hint.contains("increase the neighbourhood size"));
        }
        other => panic!("expected stagnated, got {other:?}"),
    }
    assert_eq!(pool_len, 1);
    assert_eq!(best.score, 0.3);
    assert_eq!(report.best.as_ref().unwrap().word_key, best.word_key);
    // One seed query plus one per neighbour, each spent in its own iteration.
    assert_eq!(oracle.call_count(), 11);
    assert_eq!(report.iterations, 11);
}

#[test]
fn centroid_returns_best_so_far_when_budget_runs_out() {
    let vocab = util::synthetic_vocab(VOCAB);
    let index = util::synthetic_index(VOCAB);
    // The secret word is unreachable: everything scores below 1.0.
    let mut oracle = capped_oracle(&vocab, 0.9);
    let config = CentroidConfig {
        max_iterations: 15,
        ..CentroidConfig::default()
    };

    let report = {
        let mut solver = Solver::new(
            ctx(&index),
            Box::new(CentroidSampling::new(config)),
            &mut oracle,
            StdRng::seed_from_u64(3),
        );
        solver.run().expect("search runs")
    };

    assert_eq!(
        report.outcome,
        SearchOutcome::BudgetExhausted { iterations: 15 }
    );
    assert_eq!(report.iterations, 15);
    let best = report.best.expect("best so far is reported");
    assert!(best.score <= 0.9);
    assert!(report.accepted.iter().all(|a| a.score <= best.score));
}

#[test]
fn centroid_pruning_bounds_pool_size() {
    let vocab = util::synthetic_vocab(VOCAB);
    let index = util::synthetic_index(VOCAB);
    let mut oracle = capped_oracle(&vocab, 0.9);
    let config = CentroidConfig {
        max_iterations: 100,
        prune: PrunePolicy {
            high_water: 25,
            keep_top: 20,
            sample_n: 12,
        },
        ..CentroidConfig::default()
    };

    let tracing = util::TestTracing::new();
    let _guard = tracing.install();

    let report = {
        let mut solver = Solver::new(
            ctx(&index),
            Box::new(CentroidSampling::new(config)),
            &mut oracle,
            StdRng::seed_from_u64(5),
        );
        solver.run().expect("search runs")
    };

    assert!(report.pool_size <= 25, "pool size {}", report.pool_size);
    assert!(report.accepted.len() > 25);
    tracing.assert_contains("pruned candidate pool");
    // Re-admitting pruned words is free: the oracle still sees each word once.
    assert_no_repeated_queries(&oracle);
}

#[test]
fn homographs_cost_a_single_query() {
    use cemantix_solver::embedding::Word2VecIndex;

    let index = Word2VecIndex::from_entries(
        2,
        vec![
            (WordKey::new("porte_n"), vec![1.0, 0.0]),
            (WordKey::new("porte_v"), vec![0.99, 0.05]),
            (WordKey::new("chat_n"), vec![0.0, 1.0]),
        ],
    )
    .unwrap();
    let mut oracle = ScriptedOracle::from_scores([("porte", 0.2), ("chat", 1.0)]);

    let report = {
        let mut solver = Solver::new(
            SearchContext {
                index: &index,
                vocab_size: 3,
                max_draw_attempts: 20,
            },
            Box::new(GreedyNeighborhood::new(GreedyConfig {
                neighborhood_size: 2,
            })),
            &mut oracle,
            StdRng::seed_from_u64(0),
        );
        solver.run().expect("search runs")
    };

    assert!(report.outcome.is_solved());
    assert!(oracle.calls_for("porte") <= 1);
    assert!(oracle.calls_for("chat") == 1);
}

#[test]
fn centroid_falls_back_to_random_draws_that_count_as_iterations() {
    use cemantix_solver::embedding::Word2VecIndex;

    // `u1` is always proposed but never scores, so every centroid step ends
    // up exhausted and the loop alternates with random draws.
    let index = Word2VecIndex::from_entries(
        2,
        vec![
            (WordKey::new("p1"), vec![1.0, 0.0]),
            (WordKey::new("p2"), vec![0.95, 0.05]),
            (WordKey::new("u1"), vec![0.9, 0.1]),
        ],
    )
    .unwrap();
    let mut oracle = ScriptedOracle::from_scores([("p1", 0.3), ("p2", 0.2)]);
    let config = CentroidConfig {
        seed_size: 2,
        top_tier: 2,
        sample_size: 2,
        proposals: 3,
        max_iterations: 6,
        ..CentroidConfig::default()
    };

    let tracing = util::TestTracing::new();
    let _guard = tracing.install();

    let report = {
        let mut solver = Solver::new(
            SearchContext {
                index: &index,
                vocab_size: 3,
                max_draw_attempts: 20,
            },
            Box::new(CentroidSampling::new(config)),
            &mut oracle,
            StdRng::seed_from_u64(9),
        );
        solver.run().expect("search runs")
    };

    assert_eq!(report.outcome, SearchOutcome::BudgetExhausted { iterations: 6 });
    assert_eq!(report.iterations, 6);
    // Steps and fallback draws alternate once `u1` is known to be unscorable;
    // a first step may instead spend its query on `u1`.
    let fallbacks = tracing.output().matches("random fallback draw").count();
    assert!(
        (2..=3).contains(&fallbacks),
        "expected 2 or 3 fallback draws in 6 iterations, got {fallbacks}"
    );
    // Fallback draws land on cached words only.
    assert_eq!(oracle.call_count(), 3);
    assert_eq!(report.pool_size, 2);
    assert_eq!(report.accepted.len(), 2);
}

#[test]
fn dead_oracle_aborts_random_draws_with_a_warning() {
    let index = util::synthetic_index(VOCAB);
    let mut oracle = ScriptedOracle::from_fn(|_| None);

    let tracing = util::TestTracing::new();
    let _guard = tracing.install();

    let err = {
        let mut solver = Solver::new(
            ctx(&index),
            Box::new(CentroidSampling::new(CentroidConfig::default())),
            &mut oracle,
            StdRng::seed_from_u64(1),
        );
        solver.run().expect_err("a dead oracle cannot seed the pool")
    };

    assert!(matches!(err, SolverError::OracleUnresponsive { attempts: 20 }));
    tracing.assert_contains("giving up");
    assert!(oracle.call_count() <= 20);
}
