//! Risk limit configuration and verdicts

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hard caps and analytic ceilings for one session
///
/// Hard caps are non-negotiable operator rules; analytic ceilings are
/// statistical and only consulted when every hard cap passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskLimits {
    /// Halt trading once today's realized loss reaches this (positive) amount
    pub max_daily_loss: Decimal,
    pub max_daily_trades: u32,
    /// Ceiling on a single order's notional value
    pub max_order_notional: Decimal,
    /// Trading window as minutes since midnight UTC, [start, end)
    pub trading_window_min: Option<(u32, u32)>,
    /// When set, only these symbols may trade
    pub allowed_symbols: Option<Vec<String>>,
    pub denied_symbols: Vec<String>,

    /// Max fraction of recent bar volume a single order may take
    pub max_volume_fraction: f64,
    /// Ceiling on the post-trade Herfindahl concentration index
    pub max_concentration: f64,
    /// Ceiling on portfolio VaR as a fraction of equity
    pub max_var: f64,
    /// Ceiling on portfolio CVaR as a fraction of equity
    pub max_cvar: f64,
    /// Confidence level for VaR/CVaR
    pub var_confidence: f64,
    /// Multiplier applied to the VaR/CVaR ceilings; raise above 1.0 to
    /// loosen them, lower to tighten
    pub volatility_scale: f64,
    /// When set, the ceilings additionally scale by target over realized
    /// volatility of the returns window, clamped to a quarter and four
    /// times the base scale. Calm markets widen the ceilings, turbulent
    /// ones tighten them.
    #[serde(default)]
    pub target_volatility: Option<f64>,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_daily_loss: Decimal::new(1_000, 0),
            max_daily_trades: 100,
            max_order_notional: Decimal::new(50_000, 0),
            trading_window_min: None,
            allowed_symbols: None,
            denied_symbols: Vec::new(),
            max_volume_fraction: 0.05,
            max_concentration: 0.5,
            max_var: 0.05,
            max_cvar: 0.08,
            var_confidence: 0.95,
            volatility_scale: 1.0,
            target_volatility: None,
        }
    }
}

/// Per-trading-day counters the gate consults for hard caps
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradingDayStats {
    pub trades_submitted: u32,
    /// Realized profit and loss since the session started; losses negative
    pub realized_pnl: Decimal,
}

/// One violated limit
#[derive(Debug, Clone, PartialEq)]
pub enum RiskBreach {
    SymbolNotAllowed { symbol: String },
    OrderTooLarge { notional: Decimal, limit: Decimal },
    DailyTradeLimit { submitted: u32, limit: u32 },
    DailyLossLimit { loss: Decimal, limit: Decimal },
    OutsideTradingWindow { minute_utc: u32 },
    LiquidityExceeded { fraction: f64, limit: f64 },
    ConcentrationExceeded { index: f64, limit: f64 },
    VarExceeded { var: f64, limit: f64 },
    CvarExceeded { cvar: f64, limit: f64 },
}

impl fmt::Display for RiskBreach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskBreach::SymbolNotAllowed { symbol } => write!(f, "symbol {symbol} not allowed"),
            RiskBreach::OrderTooLarge { notional, limit } => {
                write!(f, "order notional {notional} exceeds {limit}")
            }
            RiskBreach::DailyTradeLimit { submitted, limit } => {
                write!(f, "daily trade count {submitted} at limit {limit}")
            }
            RiskBreach::DailyLossLimit { loss, limit } => {
                write!(f, "daily loss {loss} at limit {limit}")
            }
            RiskBreach::OutsideTradingWindow { minute_utc } => {
                write!(f, "minute {minute_utc} outside trading window")
            }
            RiskBreach::LiquidityExceeded { fraction, limit } => {
                write!(f, "volume fraction {fraction:.4} exceeds {limit:.4}")
            }
            RiskBreach::ConcentrationExceeded { index, limit } => {
                write!(f, "concentration {index:.4} exceeds {limit:.4}")
            }
            RiskBreach::VarExceeded { var, limit } => {
                write!(f, "VaR {var:.4} exceeds {limit:.4}")
            }
            RiskBreach::CvarExceeded { cvar, limit } => {
                write!(f, "CVaR {cvar:.4} exceeds {limit:.4}")
            }
        }
    }
}

impl RiskBreach {
    /// Hard caps short-circuit the analytic checks
    pub fn is_hard(&self) -> bool {
        matches!(
            self,
            RiskBreach::SymbolNotAllowed { .. }
                | RiskBreach::OrderTooLarge { .. }
                | RiskBreach::DailyTradeLimit { .. }
                | RiskBreach::DailyLossLimit { .. }
                | RiskBreach::OutsideTradingWindow { .. }
        )
    }
}

/// Analytic measurements computed during evaluation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RiskMetrics {
    pub var: Option<f64>,
    pub cvar: Option<f64>,
    pub concentration: f64,
    pub volume_fraction: f64,
}

/// Outcome of one gate evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct RiskVerdict {
    pub allowed: bool,
    pub breaches: Vec<RiskBreach>,
    /// Present only when the hard caps passed and analytics ran
    pub metrics: Option<RiskMetrics>,
}

impl RiskVerdict {
    pub fn allowed(metrics: RiskMetrics) -> Self {
        Self {
            allowed: true,
            breaches: Vec::new(),
            metrics: Some(metrics),
        }
    }

    pub fn rejected(breaches: Vec<RiskBreach>, metrics: Option<RiskMetrics>) -> Self {
        Self {
            allowed: false,
            breaches,
            metrics,
        }
    }
}
