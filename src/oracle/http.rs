//! Blocking HTTP client for the game's scoring endpoint.
//!
//! The endpoint takes a form-encoded `word` field and answers with a JSON
//! object holding a `score` (and an `error` field for unknown words).
//! The server refuses bursts, so every call goes through a [`RateLimiter`].

use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{RateLimiter, ScoreOracle};

/// Default scoring endpoint.
pub const DEFAULT_ORACLE_URL: &str = "https://cemantix.herokuapp.com/score";

/// Minimum delay between two calls; faster requests get refused.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Timeout for a single scoring request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct ScoreResponse {
    score: Option<f64>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug)]
pub struct HttpOracle {
    client: reqwest::blocking::Client,
    url: String,
    limiter: RateLimiter,
}

impl HttpOracle {
    pub fn new(url: impl Into<String>, min_interval: Duration, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("cemantix-solver/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building http client")?;
        Ok(Self {
            client,
            url: url.into(),
            limiter: RateLimiter::new(min_interval),
        })
    }

    fn fetch(&mut self, word: &str) -> Result<Option<f64>> {
        self.limiter.wait();
        let response = self
            .client
            .post(&self.url)
            .form(&[("word", word)])
            .send()
            .context("sending score request")?;

        if !response.status().is_success() {
            bail!("score endpoint returned {}", response.status());
        }

        let body: ScoreResponse = response.json().context("parsing score JSON")?;
        if let Some(error) = body.error {
            debug!(word, %error, "oracle rejected word");
        }
        Ok(body.score)
    }
}

impl ScoreOracle for HttpOracle {
    fn score(&mut self, word: &str) -> Option<f64> {
        match self.fetch(word) {
            Ok(Some(score)) if score.is_finite() => Some(score),
            Ok(Some(score)) => {
                warn!(word, score, "oracle returned a non-finite score");
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!(word, "score request failed: {e:#}");
                None
            }
        }
    }
}
