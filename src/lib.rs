//! Automated Cemantix solver.
//!
//! Finds a secret word by querying a rate-limited similarity oracle and
//! searching a pretrained word-embedding space, spending as few queries as
//! possible. See [`search`] for the strategies and the search loop.

pub mod config;
pub mod embedding;
pub mod model;
pub mod oracle;
pub mod search;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing_subscriber::EnvFilter;

use crate::config::SolverConfig;
use crate::embedding::{EmbeddingIndex, NeighborQuery, Word2VecIndex};
use crate::model::types::WordKey;
use crate::oracle::HttpOracle;
use crate::search::solver::{SearchContext, SearchOutcome, SearchReport, Solver, strategy_from_config};
use crate::search::strategy::StrategyKind;

#[derive(Parser, Debug)]
#[command(name = "cemantix-solver", version, about = "Solve Cemantix by searching a word-embedding space")]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Machine-readable JSON output.
    #[arg(long, global = true)]
    pub json: bool,

    /// TOML config file (defaults to the user config dir).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search for the secret word against the scoring endpoint.
    Solve(SolveArgs),
    /// Print the nearest neighbours of a vocabulary key (no oracle calls).
    Neighbors(NeighborsArgs),
}

#[derive(Args, Debug, Default)]
pub struct SolveArgs {
    /// word2vec file (binary, or text with a .txt/.vec extension).
    #[arg(long, env = "CEMANTIX_EMBEDDINGS")]
    pub embeddings: Option<PathBuf>,

    #[arg(long, value_enum)]
    pub strategy: Option<StrategyKind>,

    /// Restrict the search to the N most frequent words.
    #[arg(long)]
    pub vocab_size: Option<usize>,

    /// Neighbourhood size for the greedy strategy.
    #[arg(long)]
    pub neighborhood: Option<usize>,

    /// Iteration cap for the centroid strategy.
    #[arg(long)]
    pub max_iterations: Option<usize>,

    /// RNG seed for a reproducible run.
    #[arg(long)]
    pub seed: Option<u64>,

    #[arg(long)]
    pub oracle_url: Option<String>,

    /// Minimum delay between oracle calls, in milliseconds.
    #[arg(long)]
    pub min_interval_ms: Option<u64>,
}

#[derive(Args, Debug)]
pub struct NeighborsArgs {
    /// Vocabulary key to search around.
    pub word: String,

    #[arg(long, env = "CEMANTIX_EMBEDDINGS")]
    pub embeddings: Option<PathBuf>,

    #[arg(long, default_value_t = 10)]
    pub count: usize,

    #[arg(long)]
    pub vocab_size: Option<usize>,
}

/// Structured CLI failure; `main` renders it as text or a JSON envelope.
#[derive(Debug, Clone)]
pub struct CliError {
    pub code: i32,
    pub kind: &'static str,
    pub message: String,
    pub hint: Option<String>,
    pub retryable: bool,
}

impl CliError {
    fn new(code: i32, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            kind,
            message: message.into(),
            hint: None,
            retryable: false,
        }
    }

    fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CliError {}

pub const EXIT_USAGE: i32 = 2;
pub const EXIT_STAGNATED: i32 = 3;
pub const EXIT_BUDGET_EXHAUSTED: i32 = 4;
pub const EXIT_EMBEDDINGS: i32 = 5;
pub const EXIT_SEARCH_FAILED: i32 = 6;
pub const EXIT_INTERRUPTED: i32 = 130;

#[derive(Debug)]
pub struct ParsedCli {
    pub cli: Cli,
}

/// Parse raw process arguments. `--help`/`--version` come back as a
/// `CliError` with code 0 carrying the rendered text.
pub fn parse_cli(args: Vec<String>) -> Result<ParsedCli, CliError> {
    Cli::try_parse_from(args)
        .map(|cli| ParsedCli { cli })
        .map_err(|err| CliError::new(err.exit_code(), "usage", err.render().to_string()))
}

pub fn run_with_parsed(parsed: ParsedCli) -> Result<(), CliError> {
    let cli = parsed.cli;
    init_tracing(cli.verbose, cli.json);

    let mut config = load_config(cli.config.as_ref())?;
    match cli.command {
        Commands::Solve(args) => {
            apply_solve_args(&mut config, &args);
            run_solve(&config, cli.json)
        }
        Commands::Neighbors(args) => {
            if let Some(path) = args.embeddings.clone() {
                config.embeddings = Some(path);
            }
            if let Some(n) = args.vocab_size {
                config.vocab_size = n;
            }
            run_neighbors(&config, &args, cli.json)
        }
    }
}

fn init_tracing(verbose: u8, json: bool) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // A subscriber may already be installed (tests, embedding in another binary).
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(!json)
        .with_target(false)
        .try_init();
}

fn load_config(path: Option<&PathBuf>) -> Result<SolverConfig, CliError> {
    let loaded = match path {
        Some(path) => SolverConfig::load_from(path).map(|mut c| {
            c.apply_env();
            c
        }),
        None => SolverConfig::load(),
    };
    loaded.map_err(|e| {
        CliError::new(EXIT_USAGE, "config", e.to_string())
            .with_hint("check the TOML file and CEMANTIX_* environment variables")
    })
}

/// Overlay CLI flags on the loaded configuration.
pub fn apply_solve_args(config: &mut SolverConfig, args: &SolveArgs) {
    if let Some(path) = &args.embeddings {
        config.embeddings = Some(path.clone());
    }
    if let Some(strategy) = args.strategy {
        config.strategy = strategy;
    }
    if let Some(n) = args.vocab_size {
        config.vocab_size = n;
    }
    if let Some(n) = args.neighborhood {
        config.greedy.neighborhood_size = n;
    }
    if let Some(n) = args.max_iterations {
        config.centroid.max_iterations = n;
    }
    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }
    if let Some(url) = &args.oracle_url {
        config.oracle.url = url.clone();
    }
    if let Some(ms) = args.min_interval_ms {
        config.oracle.min_interval_ms = ms;
    }
}

fn load_index(config: &SolverConfig) -> Result<Word2VecIndex, CliError> {
    let path = config.embeddings.as_ref().ok_or_else(|| {
        CliError::new(EXIT_USAGE, "config", "no embeddings file configured")
            .with_hint("pass --embeddings PATH or set CEMANTIX_EMBEDDINGS")
    })?;
    Word2VecIndex::load(path).map_err(|e| {
        CliError::new(
            EXIT_EMBEDDINGS,
            "embeddings",
            format!("failed to load {}: {e}", path.display()),
        )
    })
}

fn run_solve(config: &SolverConfig, json: bool) -> Result<(), CliError> {
    config
        .validate()
        .map_err(|e| CliError::new(EXIT_USAGE, "config", e.to_string()))?;
    let index = load_index(config)?;

    let mut oracle = HttpOracle::new(
        config.oracle.url.clone(),
        config.oracle.min_interval(),
        config.oracle.timeout(),
    )
    .map_err(|e| CliError::new(EXIT_SEARCH_FAILED, "oracle", format!("{e:#}")))?;

    let rng = config
        .seed
        .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
    let mut solver = Solver::new(
        SearchContext::new(&index, config),
        strategy_from_config(config),
        &mut oracle,
        rng,
    );

    let report = solver
        .run()
        .map_err(|e| CliError::new(EXIT_SEARCH_FAILED, "search", e.to_string()).retryable())?;
    print_report(&report, json)?;

    match &report.outcome {
        SearchOutcome::Solved { .. } => Ok(()),
        SearchOutcome::Stagnated { hint, .. } => Err(CliError::new(
            EXIT_STAGNATED,
            "stagnated",
            "search stagnated",
        )
        .with_hint(hint.clone())
        .retryable()),
        SearchOutcome::BudgetExhausted { iterations } => Err(CliError::new(
            EXIT_BUDGET_EXHAUSTED,
            "budget_exhausted",
            format!("no solution after {iterations} iterations"),
        )
        .with_hint("raise --max-iterations or try --strategy greedy")
        .retryable()),
        SearchOutcome::Interrupted => Err(CliError::new(
            EXIT_INTERRUPTED,
            "interrupted",
            "search interrupted",
        )),
    }
}

fn print_report(report: &SearchReport, json: bool) -> Result<(), CliError> {
    if json {
        let out = serde_json::to_string_pretty(report)
            .map_err(|e| CliError::new(EXIT_SEARCH_FAILED, "output", e.to_string()))?;
        println!("{out}");
        return Ok(());
    }

    let best = report
        .best
        .as_ref()
        .map(|b| format!("{} ({:.4})", b.word_key, b.score))
        .unwrap_or_else(|| "none".to_string());
    match &report.outcome {
        SearchOutcome::Solved { word, word_key } => println!(
            "{} '{}' (key {word_key}) in {} requests",
            "Solved:".green().bold(),
            word.as_str().bold(),
            report.oracle_queries
        ),
        SearchOutcome::Stagnated { hint, .. } => {
            println!("{} {hint}", "Stagnated:".yellow().bold());
            println!("  best so far: {best}");
        }
        SearchOutcome::BudgetExhausted { iterations } => {
            println!("{} {iterations} iterations", "Budget exhausted:".yellow().bold());
            println!("  best so far: {best}");
        }
        SearchOutcome::Interrupted => {
            println!("{}", "Interrupted".red().bold());
            println!("  best so far: {best}");
        }
    }
    println!(
        "  {} iterations, {} requests, {} cache hits, {} candidates in pool",
        report.iterations, report.oracle_queries, report.cache.hits, report.pool_size
    );
    Ok(())
}

fn run_neighbors(config: &SolverConfig, args: &NeighborsArgs, json: bool) -> Result<(), CliError> {
    let index = load_index(config)?;
    let key = WordKey::new(args.word.clone());
    if !index.contains(&key) {
        return Err(
            CliError::new(EXIT_USAGE, "unknown_word", format!("'{key}' is not in the vocabulary"))
                .with_hint("keys are case-sensitive and may carry a tag suffix such as _n"),
        );
    }
    let neighbors = index
        .nearest(NeighborQuery::Key(&key), config.vocab_size, args.count)
        .map_err(|e| CliError::new(EXIT_EMBEDDINGS, "embeddings", e.to_string()))?;

    if json {
        let payload = serde_json::json!({ "word": key, "neighbors": neighbors });
        println!("{payload}");
    } else {
        for (rank, neighbor) in neighbors.iter().enumerate() {
            println!("{:>4}  {neighbor}", rank + 1);
        }
    }
    Ok(())
}
