//! Exponential backoff with jitter
//!
//! delay(attempt) = base_delay * multiplier^(attempt-1) * (1 + uniform jitter),
//! capped at a configured maximum. Jitter prevents thundering-herd reconnects
//! when several sessions lose the same dependency at once.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for exponential backoff
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Delay before the first retry
    pub base_delay_ms: u64,
    /// Hard ceiling on any single delay
    pub max_delay_ms: u64,
    /// Growth factor per attempt (typically 2.0)
    pub multiplier: f64,
    /// Upper bound of the uniform jitter fraction (0.0 disables jitter)
    pub max_jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 100,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            max_jitter: 0.1,
        }
    }
}

impl BackoffConfig {
    /// Fast retries, short ceiling. Useful in tests.
    pub fn aggressive() -> Self {
        Self {
            base_delay_ms: 10,
            max_delay_ms: 1_000,
            multiplier: 1.5,
            max_jitter: 0.1,
        }
    }

    /// Slow retries for production reconnection loops
    pub fn conservative() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            multiplier: 2.0,
            max_jitter: 0.2,
        }
    }

    /// Deterministic delay for attempt `n` (1-based), without jitter.
    ///
    /// This is the lower bound of the jittered delay and the quantity the
    /// retry-property tests assert against.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let raw = self.base_delay_ms as f64 * self.multiplier.powi(exponent as i32);
        let capped = raw.min(self.max_delay_ms as f64);
        Duration::from_millis(capped as u64)
    }

    /// Jittered delay for attempt `n` (1-based): base * (1 + U[0, max_jitter]),
    /// capped at `max_delay_ms`.
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let base = self.delay_for_attempt(attempt);
        if self.max_jitter <= 0.0 {
            return base;
        }
        let jitter = rand::thread_rng().gen_range(0.0..=self.max_jitter);
        let jittered = base.as_secs_f64() * (1.0 + jitter);
        Duration::from_secs_f64(jittered.min(self.max_delay_ms as f64 / 1_000.0))
    }
}

/// Stateful backoff for reconnection loops
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    config: BackoffConfig,
    attempt: u32,
}

impl ExponentialBackoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Advance to the next attempt and return its jittered delay
    pub fn next_delay(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        self.config.jittered_delay(self.attempt)
    }

    /// Attempts taken since the last reset
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Reset after a successful operation
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }
}
