//! Session performance analytics
//!
//! Accumulates trades and equity marks, and produces a point-in-time report.
//! The analyzer keeps its own small average-cost book so it can attribute
//! realized profit to closing trades without reaching into the portfolio.

use crate::market::{Side, TradeRecord};
use crate::risk::historical_var;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// Periods per year for annualizing ratios (e.g. 252 daily, 98_280 for
    /// one-minute bars over a 6.5 hour session)
    pub periods_per_year: f64,
    pub var_confidence: f64,
    /// Returns considered by the rolling VaR
    pub var_window: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            periods_per_year: 252.0,
            var_confidence: 0.95,
            var_window: 100,
        }
    }
}

/// Snapshot report over everything recorded so far
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub total_return: f64,
    pub volatility: f64,
    pub sharpe: f64,
    pub sortino: f64,
    pub calmar: f64,
    pub max_drawdown: f64,
    /// Total traded notional over average equity
    pub turnover: f64,
    /// Commissions over total traded notional
    pub cost_ratio: f64,
    pub win_rate: f64,
    pub rolling_var: Option<f64>,
    pub trades: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct BookEntry {
    quantity: f64,
    avg_cost: f64,
}

#[derive(Debug)]
pub struct PerformanceAnalyzer {
    config: PerformanceConfig,
    trades: Vec<TradeRecord>,
    equity: Vec<(i64, f64)>,
    book: HashMap<String, BookEntry>,
    /// Realized profit per closing trade, commissions included
    closed_pnls: Vec<f64>,
    total_notional: f64,
    total_commission: f64,
}

impl PerformanceAnalyzer {
    pub fn new(config: PerformanceConfig) -> Self {
        Self {
            config,
            trades: Vec::new(),
            equity: Vec::new(),
            book: HashMap::new(),
            closed_pnls: Vec::new(),
            total_notional: 0.0,
            total_commission: 0.0,
        }
    }

    pub fn record(&mut self, trade: &TradeRecord) {
        let price = trade.price.to_f64().unwrap_or(0.0);
        let quantity = trade.quantity.to_f64().unwrap_or(0.0);
        let commission = trade.commission.to_f64().unwrap_or(0.0);
        self.total_notional += price * quantity;
        self.total_commission += commission;

        let signed = match trade.side {
            Side::Buy => quantity,
            Side::Sell => -quantity,
        };
        let entry = self.book.entry(trade.symbol.clone()).or_default();
        let closing = entry.quantity != 0.0 && signed.signum() != entry.quantity.signum();
        if closing {
            let closed = quantity.min(entry.quantity.abs());
            let direction = entry.quantity.signum();
            self.closed_pnls
                .push(closed * (price - entry.avg_cost) * direction - commission);
        }
        let new_qty = entry.quantity + signed;
        if entry.quantity == 0.0 || entry.quantity.signum() != new_qty.signum() {
            entry.avg_cost = price;
        } else if signed.signum() == entry.quantity.signum() {
            entry.avg_cost = (entry.quantity.abs() * entry.avg_cost + quantity * price)
                / new_qty.abs();
        }
        entry.quantity = new_qty;

        self.trades.push(trade.clone());
    }

    pub fn mark_equity(&mut self, timestamp_ms: i64, equity: Decimal) {
        if let Some(value) = equity.to_f64() {
            self.equity.push((timestamp_ms, value));
        }
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    fn returns(&self) -> Vec<f64> {
        self.equity
            .windows(2)
            .filter_map(|pair| {
                let prev = pair[0].1;
                if prev == 0.0 {
                    return None;
                }
                Some(pair[1].1 / prev - 1.0)
            })
            .collect()
    }

    pub fn report(&self) -> PerformanceReport {
        let returns = self.returns();
        let n = returns.len() as f64;
        let mean = if n > 0.0 {
            returns.iter().sum::<f64>() / n
        } else {
            0.0
        };
        let volatility = if n > 0.0 {
            (returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n).sqrt()
        } else {
            0.0
        };
        let downside = if n > 0.0 {
            (returns
                .iter()
                .filter(|r| **r < 0.0)
                .map(|r| r.powi(2))
                .sum::<f64>()
                / n)
                .sqrt()
        } else {
            0.0
        };
        let annualize = self.config.periods_per_year.sqrt();
        let sharpe = if volatility > 0.0 {
            mean / volatility * annualize
        } else {
            0.0
        };
        let sortino = if downside > 0.0 {
            mean / downside * annualize
        } else {
            0.0
        };

        let total_return = match (self.equity.first(), self.equity.last()) {
            (Some((_, first)), Some((_, last))) if *first != 0.0 => last / first - 1.0,
            _ => 0.0,
        };
        let max_drawdown = self.max_drawdown();
        let calmar = if max_drawdown > 0.0 {
            total_return / max_drawdown
        } else {
            0.0
        };

        let avg_equity = if self.equity.is_empty() {
            0.0
        } else {
            self.equity.iter().map(|(_, e)| e).sum::<f64>() / self.equity.len() as f64
        };
        let turnover = if avg_equity > 0.0 {
            self.total_notional / avg_equity
        } else {
            0.0
        };
        let cost_ratio = if self.total_notional > 0.0 {
            self.total_commission / self.total_notional
        } else {
            0.0
        };
        let win_rate = if self.closed_pnls.is_empty() {
            0.0
        } else {
            self.closed_pnls.iter().filter(|p| **p > 0.0).count() as f64
                / self.closed_pnls.len() as f64
        };

        let window_start = returns.len().saturating_sub(self.config.var_window);
        let rolling_var =
            historical_var(&returns[window_start..], self.config.var_confidence).map(|(v, _)| v);

        PerformanceReport {
            total_return,
            volatility,
            sharpe,
            sortino,
            calmar,
            max_drawdown,
            turnover,
            cost_ratio,
            win_rate,
            rolling_var,
            trades: self.trades.len(),
        }
    }

    fn max_drawdown(&self) -> f64 {
        let mut peak = f64::MIN;
        let mut worst = 0.0f64;
        for (_, value) in &self.equity {
            peak = peak.max(*value);
            if peak > 0.0 {
                worst = worst.max((peak - value) / peak);
            }
        }
        worst
    }
}
