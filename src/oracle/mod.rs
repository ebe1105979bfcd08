//! Scoring oracle layer.
//!
//! The oracle is the remote game server: given a guessed word it returns a
//! similarity score against the hidden target (1.0 means found). It is a
//! black box that can fail at any time; a failure is never fatal and simply
//! carries no information, so the trait returns `Option<f64>`.
//!
//! - **[`http`]**: [`HttpOracle`], the real blocking HTTP client.
//! - **[`scripted`]**: [`ScriptedOracle`], a deterministic offline oracle.

pub mod http;
pub mod scripted;

use std::thread;
use std::time::{Duration, Instant};

pub use http::HttpOracle;
pub use scripted::ScriptedOracle;

/// Black-box similarity scorer.
pub trait ScoreOracle {
    /// Score a lowercase surface word. `None` means the query failed or the
    /// word is unknown to the game.
    fn score(&mut self, word: &str) -> Option<f64>;
}

impl<T: ScoreOracle + ?Sized> ScoreOracle for Box<T> {
    fn score(&mut self, word: &str) -> Option<f64> {
        (**self).score(word)
    }
}

/// Enforces a minimum delay between consecutive calls.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    min_interval: Duration,
    last_call: Option<Instant>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: None,
        }
    }

    /// Time still to wait before the next call is allowed.
    pub fn remaining(&self) -> Duration {
        match self.last_call {
            Some(last) => self.min_interval.saturating_sub(last.elapsed()),
            None => Duration::ZERO,
        }
    }

    /// Block until the next call is permitted, then record it.
    pub fn wait(&mut self) {
        let remaining = self.remaining();
        if !remaining.is_zero() {
            thread::sleep(remaining);
        }
        self.last_call = Some(Instant::now());
    }
}
