//! Deterministic offline oracle.
//!
//! Answers from a fixed score table, optionally falling back to a closure,
//! and records every call so tests can assert on query counts.

use std::collections::HashMap;

use super::ScoreOracle;

type ScoreFn = Box<dyn FnMut(&str) -> Option<f64> + Send>;

pub struct ScriptedOracle {
    table: HashMap<String, f64>,
    fallback: Option<ScoreFn>,
    calls: Vec<String>,
}

impl ScriptedOracle {
    /// Oracle answering from a table; unknown words score `None`.
    pub fn from_scores<I, S>(scores: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self {
            table: scores.into_iter().map(|(w, s)| (w.into(), s)).collect(),
            fallback: None,
            calls: Vec::new(),
        }
    }

    /// Oracle computing every score with `f`.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: FnMut(&str) -> Option<f64> + Send + 'static,
    {
        Self {
            table: HashMap::new(),
            fallback: Some(Box::new(f)),
            calls: Vec::new(),
        }
    }

    /// Use `f` for words missing from the table.
    pub fn with_fallback<F>(mut self, f: F) -> Self
    where
        F: FnMut(&str) -> Option<f64> + Send + 'static,
    {
        self.fallback = Some(Box::new(f));
        self
    }

    /// Every word scored so far, in call order.
    pub fn calls(&self) -> &[String] {
        &self.calls
    }

    pub fn call_count(&self) -> usize {
        self.calls.len()
    }

    /// How many times `word` was sent to the oracle.
    pub fn calls_for(&self, word: &str) -> usize {
        self.calls.iter().filter(|w| w.as_str() == word).count()
    }
}

impl std::fmt::Debug for ScriptedOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedOracle")
            .field("table", &self.table.len())
            .field("has_fallback", &self.fallback.is_some())
            .field("calls", &self.calls.len())
            .finish()
    }
}

impl ScoreOracle for ScriptedOracle {
    fn score(&mut self, word: &str) -> Option<f64> {
        self.calls.push(word.to_string());
        if let Some(score) = self.table.get(word) {
            return Some(*score);
        }
        self.fallback.as_mut().and_then(|f| f(word))
    }
}
