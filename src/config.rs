//! Solver configuration.
//!
//! Settings are layered, lowest precedence first:
//!
//! 1. built-in defaults ([`SolverConfig::default`])
//! 2. a TOML file (`--config`, or `~/.config/cemantix-solver/config.toml`)
//! 3. `CEMANTIX_*` environment variables (a `.env` file is honoured)
//! 4. command-line flags, applied by the CLI
//!
//! # Example Configuration
//!
//! ```toml
//! embeddings = "frWac_non_lem_no_postag_no_phrase_200_skip_cut100.bin"
//! strategy = "greedy"
//! vocab_size = 30000
//!
//! [greedy]
//! neighborhood_size = 500
//!
//! [oracle]
//! min_interval_ms = 1200
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::oracle::http::{DEFAULT_MIN_INTERVAL, DEFAULT_ORACLE_URL, DEFAULT_TIMEOUT};
use crate::search::centroid::CentroidConfig;
use crate::search::greedy::GreedyConfig;
use crate::search::strategy::StrategyKind;

/// Errors that can occur when loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Scoring endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub url: String,
    /// Minimum delay between two oracle calls.
    pub min_interval_ms: u64,
    pub timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_ORACLE_URL.to_string(),
            min_interval_ms: DEFAULT_MIN_INTERVAL.as_millis() as u64,
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

impl OracleConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// word2vec file to load.
    pub embeddings: Option<PathBuf>,
    pub strategy: StrategyKind,
    /// Only the most frequent `vocab_size` entries are searched or drawn.
    pub vocab_size: usize,
    /// Consecutive unscored random draws tolerated before giving up.
    pub max_draw_attempts: usize,
    /// RNG seed for reproducible runs.
    pub seed: Option<u64>,
    pub centroid: CentroidConfig,
    pub greedy: GreedyConfig,
    pub oracle: OracleConfig,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            embeddings: None,
            strategy: StrategyKind::default(),
            vocab_size: 30_000,
            max_draw_attempts: 50,
            seed: None,
            centroid: CentroidConfig::default(),
            greedy: GreedyConfig::default(),
            oracle: OracleConfig::default(),
        }
    }
}

impl SolverConfig {
    /// Load from the default config path if present, then apply environment
    /// overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path)?,
            _ => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Load from an explicit TOML file (no environment overrides).
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Default config file location.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("cemantix-solver").join("config.toml"))
    }

    /// Apply `CEMANTIX_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| dotenvy::var(key).ok());
    }

    /// Apply `CEMANTIX_*` overrides from an arbitrary lookup.
    /// Values that fail to parse are ignored with a warning.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("CEMANTIX_EMBEDDINGS") {
            self.embeddings = Some(PathBuf::from(val));
        }
        if let Some(val) = lookup("CEMANTIX_ORACLE_URL") {
            self.oracle.url = val;
        }
        if let Some(val) = lookup("CEMANTIX_STRATEGY") {
            match val.to_ascii_lowercase().as_str() {
                "centroid" => self.strategy = StrategyKind::Centroid,
                "greedy" => self.strategy = StrategyKind::Greedy,
                other => warn!(value = other, "ignoring unknown CEMANTIX_STRATEGY"),
            }
        }
        parse_into(&lookup, "CEMANTIX_VOCAB_SIZE", &mut self.vocab_size);
        parse_into(&lookup, "CEMANTIX_NEIGHBORHOOD", &mut self.greedy.neighborhood_size);
        parse_into(&lookup, "CEMANTIX_MAX_ITERATIONS", &mut self.centroid.max_iterations);
        parse_into(&lookup, "CEMANTIX_MIN_INTERVAL_MS", &mut self.oracle.min_interval_ms);

        let mut seed = 0u64;
        if parse_into(&lookup, "CEMANTIX_SEED", &mut seed) {
            self.seed = Some(seed);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Validation(msg.to_string()));

        if self.vocab_size == 0 {
            return invalid("vocab_size must be positive");
        }
        if self.max_draw_attempts == 0 {
            return invalid("max_draw_attempts must be positive");
        }
        match self.strategy {
            StrategyKind::Centroid => {
                let c = &self.centroid;
                if c.sample_size == 0 || c.proposals == 0 || c.max_iterations == 0 {
                    return invalid("centroid sizes and max_iterations must be positive");
                }
                if c.sample_size > c.top_tier {
                    return invalid("centroid.sample_size cannot exceed centroid.top_tier");
                }
                if c.seed_size < c.sample_size {
                    return invalid("centroid.seed_size must be at least centroid.sample_size");
                }
                if c.prune.sample_n == 0 || c.prune.sample_n > c.prune.keep_top {
                    return invalid("prune.sample_n must be in 1..=prune.keep_top");
                }
                if c.prune.keep_top > c.prune.high_water {
                    return invalid("prune.keep_top cannot exceed prune.high_water");
                }
            }
            StrategyKind::Greedy => {
                if self.greedy.neighborhood_size == 0 {
                    return invalid("greedy.neighborhood_size must be positive");
                }
            }
        }
        Ok(())
    }
}

/// Parse `key` into `slot`; returns whether a value was applied.
fn parse_into<F, T>(lookup: &F, key: &str, slot: &mut T) -> bool
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let Some(raw) = lookup(key) else {
        return false;
    };
    match raw.trim().parse() {
        Ok(value) => {
            *slot = value;
            true
        }
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparseable override");
            false
        }
    }
}
