//! Session configuration
//!
//! One JSON document configures a whole session. Every tolerance and
//! threshold lives here with a sane default, so a minimal file only names
//! the symbols and the strategy.

use crate::analytics::{ConsistencyConfig, PerformanceConfig};
use crate::feed::FeedConfig;
use crate::resilience::{BreakerConfig, RetryPolicies};
use crate::risk::RiskLimits;
use crate::session::reconcile::ReconcileConfig;
use anyhow::Context;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Registry identifier, e.g. "ema-crossover"
    pub name: String,
    /// Strategy-specific parameters, passed through opaquely
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub symbols: Vec<String>,
    pub starting_cash: Decimal,
    pub strategy: StrategyConfig,
    pub risk: RiskLimits,
    pub feed: FeedConfig,
    pub retry: RetryPolicies,
    /// Breaker settings for order submission and account polling
    pub breaker: BreakerConfig,
    pub reconcile: ReconcileConfig,
    pub performance: PerformanceConfig,
    pub consistency: ConsistencyConfig,
    pub queue_capacity: usize,
    /// Degraded for longer than this escalates to Halted
    pub degraded_timeout_ms: i64,
    /// Consecutive High-or-worse faults that trigger Degraded
    pub high_streak_threshold: usize,
    pub tick_interval_ms: i64,
    /// Equity returns considered by the risk gate
    pub returns_window: usize,
    /// Bars per symbol averaged for the liquidity check
    pub volume_window: usize,
    /// Paper broker costs
    pub commission: Decimal,
    pub slippage: Decimal,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            symbols: Vec::new(),
            starting_cash: Decimal::new(100_000, 0),
            strategy: StrategyConfig {
                name: "ema-crossover".to_string(),
                params: serde_json::Value::Null,
            },
            risk: RiskLimits::default(),
            feed: FeedConfig::default(),
            retry: RetryPolicies::default(),
            breaker: BreakerConfig::default(),
            reconcile: ReconcileConfig::default(),
            performance: PerformanceConfig::default(),
            consistency: ConsistencyConfig::default(),
            queue_capacity: 1_024,
            degraded_timeout_ms: 300_000,
            high_streak_threshold: 3,
            tick_interval_ms: 1_000,
            returns_window: 100,
            volume_window: 20,
            commission: Decimal::ONE,
            slippage: Decimal::ZERO,
        }
    }
}

impl SessionConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let mut config: SessionConfig = serde_json::from_str(&raw)
            .with_context(|| format!("parsing config {}", path.display()))?;
        // The feed subscribes to the session's symbols unless the file says
        // otherwise.
        if config.feed.symbols.is_empty() {
            config.feed.symbols = config.symbols.clone();
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.symbols.is_empty(), "no symbols configured");
        anyhow::ensure!(
            self.starting_cash > Decimal::ZERO,
            "starting cash must be positive"
        );
        anyhow::ensure!(
            (0.5..1.0).contains(&self.risk.var_confidence),
            "var confidence must be in [0.5, 1.0)"
        );
        anyhow::ensure!(self.queue_capacity >= 2, "queue capacity too small");
        Ok(())
    }
}
