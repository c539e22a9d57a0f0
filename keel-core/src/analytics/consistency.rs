//! Backtest-vs-live consistency validation
//!
//! Compares a backtest trade log against a live trade log along three
//! dimensions: did the same signals fire, did executions land close to where
//! the backtest assumed, and do the realized statistics agree. Each
//! dimension scores Pass/Warn/Fail against configured thresholds; the
//! overall grade is the worst dimension. The function is pure: validating
//! the same two logs twice yields identical reports.

use crate::market::TradeRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsistencyConfig {
    /// Max timestamp distance for two trades to count as the same signal
    pub time_tolerance_ms: i64,
    /// Match-rate grade boundaries: >= pass is Pass, >= fail is Warn
    pub signal_pass: f64,
    pub signal_fail: f64,
    /// Mean fractional price deviation boundaries (lower is better)
    pub price_dev_pass: f64,
    pub price_dev_fail: f64,
    /// Mean timestamp deviation boundaries in ms (lower is better)
    pub time_dev_pass_ms: f64,
    pub time_dev_fail_ms: f64,
    /// Absolute total-return delta boundaries (lower is better)
    pub return_delta_pass: f64,
    pub return_delta_fail: f64,
    /// Absolute Sharpe-ratio delta boundaries (lower is better)
    pub sharpe_delta_pass: f64,
    pub sharpe_delta_fail: f64,
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self {
            time_tolerance_ms: 2_000,
            signal_pass: 0.90,
            signal_fail: 0.75,
            price_dev_pass: 0.001,
            price_dev_fail: 0.005,
            time_dev_pass_ms: 1_000.0,
            time_dev_fail_ms: 2_000.0,
            return_delta_pass: 0.05,
            return_delta_fail: 0.15,
            sharpe_delta_pass: 0.2,
            sharpe_delta_fail: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    Pass,
    Warn,
    Fail,
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grade::Pass => write!(f, "pass"),
            Grade::Warn => write!(f, "warn"),
            Grade::Fail => write!(f, "fail"),
        }
    }
}

/// Grade a higher-is-better score
fn grade_score(score: f64, pass: f64, fail: f64) -> Grade {
    if score >= pass {
        Grade::Pass
    } else if score >= fail {
        Grade::Warn
    } else {
        Grade::Fail
    }
}

/// Grade a lower-is-better deviation
fn grade_deviation(value: f64, pass: f64, fail: f64) -> Grade {
    if value <= pass {
        Grade::Pass
    } else if value <= fail {
        Grade::Warn
    } else {
        Grade::Fail
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalScore {
    pub match_rate: f64,
    pub grade: Grade,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionScore {
    pub mean_price_deviation: f64,
    pub mean_time_deviation_ms: f64,
    pub grade: Grade,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsScore {
    /// Graded: total realized return and per-trade Sharpe recomputed from
    /// each log
    pub total_return_delta: f64,
    pub sharpe_delta: f64,
    /// Informational only
    pub win_rate_delta: f64,
    pub cost_ratio_delta: f64,
    pub grade: Grade,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub signal: SignalScore,
    pub execution: ExecutionScore,
    pub metrics: MetricsScore,
    pub overall: Grade,
    pub matched: usize,
    pub backtest_total: usize,
    pub live_total: usize,
}

/// Validate a live trade log against its backtest counterpart
pub fn validate(
    backtest: &[TradeRecord],
    live: &[TradeRecord],
    config: &ConsistencyConfig,
) -> ValidationReport {
    let pairs = match_trades(backtest, live, config.time_tolerance_ms);

    let match_rate = if backtest.is_empty() {
        1.0
    } else {
        pairs.len() as f64 / backtest.len() as f64
    };
    let signal = SignalScore {
        match_rate,
        grade: grade_score(match_rate, config.signal_pass, config.signal_fail),
    };

    let execution = score_execution(&pairs, config);
    let metrics = score_metrics(backtest, live, config);

    let overall = signal
        .grade
        .max(execution.grade)
        .max(metrics.grade);

    ValidationReport {
        signal,
        execution,
        metrics,
        overall,
        matched: pairs.len(),
        backtest_total: backtest.len(),
        live_total: live.len(),
    }
}

/// Matched (backtest, live) index pairs.
///
/// A live trade matches a backtest trade when symbol and side agree and the
/// timestamps are within tolerance; each backtest trade greedily takes the
/// nearest unused live trade, scanning in backtest order.
fn match_trades<'a>(
    backtest: &'a [TradeRecord],
    live: &'a [TradeRecord],
    tolerance_ms: i64,
) -> Vec<(&'a TradeRecord, &'a TradeRecord)> {
    let mut used = vec![false; live.len()];
    let mut pairs = Vec::new();
    for b in backtest {
        let mut best: Option<(usize, i64)> = None;
        for (i, l) in live.iter().enumerate() {
            if used[i] || l.symbol != b.symbol || l.side != b.side {
                continue;
            }
            let distance = (l.timestamp_ms - b.timestamp_ms).abs();
            if distance > tolerance_ms {
                continue;
            }
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((i, distance));
            }
        }
        if let Some((i, _)) = best {
            used[i] = true;
            pairs.push((b, &live[i]));
        }
    }
    pairs
}

fn score_execution(
    pairs: &[(&TradeRecord, &TradeRecord)],
    config: &ConsistencyConfig,
) -> ExecutionScore {
    if pairs.is_empty() {
        return ExecutionScore {
            mean_price_deviation: 0.0,
            mean_time_deviation_ms: 0.0,
            grade: Grade::Pass,
        };
    }
    let n = pairs.len() as f64;
    let mut price_dev = 0.0;
    let mut time_dev = 0.0;
    for (b, l) in pairs {
        let b_price = decimal_to_f64(b.price);
        let l_price = decimal_to_f64(l.price);
        if b_price != 0.0 {
            price_dev += ((l_price - b_price) / b_price).abs();
        }
        time_dev += (l.timestamp_ms - b.timestamp_ms).abs() as f64;
    }
    let mean_price_deviation = price_dev / n;
    let mean_time_deviation_ms = time_dev / n;
    let grade = grade_deviation(
        mean_price_deviation,
        config.price_dev_pass,
        config.price_dev_fail,
    )
    .max(grade_deviation(
        mean_time_deviation_ms,
        config.time_dev_pass_ms,
        config.time_dev_fail_ms,
    ));
    ExecutionScore {
        mean_price_deviation,
        mean_time_deviation_ms,
        grade,
    }
}

fn score_metrics(
    backtest: &[TradeRecord],
    live: &[TradeRecord],
    config: &ConsistencyConfig,
) -> MetricsScore {
    let b = realized_stats(backtest);
    let l = realized_stats(live);
    let total_return_delta = (b.total_return - l.total_return).abs();
    let sharpe_delta = (b.sharpe - l.sharpe).abs();
    let grade = grade_deviation(
        total_return_delta,
        config.return_delta_pass,
        config.return_delta_fail,
    )
    .max(grade_deviation(
        sharpe_delta,
        config.sharpe_delta_pass,
        config.sharpe_delta_fail,
    ));
    MetricsScore {
        total_return_delta,
        sharpe_delta,
        win_rate_delta: (b.win_rate - l.win_rate).abs(),
        cost_ratio_delta: (b.cost_ratio - l.cost_ratio).abs(),
        grade,
    }
}

struct RealizedStats {
    total_return: f64,
    sharpe: f64,
    win_rate: f64,
    cost_ratio: f64,
}

/// Realized statistics recomputed from one trade log: basis-weighted total
/// return and per-round-trip Sharpe, plus win rate and commission over
/// notional
fn realized_stats(trades: &[TradeRecord]) -> RealizedStats {
    let mut book: HashMap<&str, (f64, f64)> = HashMap::new();
    let mut trade_returns = Vec::new();
    let mut pnl_total = 0.0;
    let mut basis_total = 0.0;
    let mut wins = 0usize;
    let mut closed = 0usize;
    let mut notional = 0.0;
    let mut commission = 0.0;
    for trade in trades {
        let price = decimal_to_f64(trade.price);
        let quantity = decimal_to_f64(trade.quantity);
        let fee = decimal_to_f64(trade.commission);
        notional += price * quantity;
        commission += fee;

        let signed = match trade.side {
            crate::market::Side::Buy => quantity,
            crate::market::Side::Sell => -quantity,
        };
        let entry = book.entry(trade.symbol.as_str()).or_insert((0.0, 0.0));
        if entry.0 != 0.0 && signed.signum() != entry.0.signum() {
            let closed_qty = quantity.min(entry.0.abs());
            let basis = closed_qty * entry.1;
            let pnl = closed_qty * (price - entry.1) * entry.0.signum() - fee;
            closed += 1;
            if pnl > 0.0 {
                wins += 1;
            }
            pnl_total += pnl;
            basis_total += basis;
            if basis > 0.0 {
                trade_returns.push(pnl / basis);
            }
        }
        let new_qty = entry.0 + signed;
        if entry.0 == 0.0 || entry.0.signum() != new_qty.signum() {
            entry.1 = price;
        } else if signed.signum() == entry.0.signum() {
            entry.1 = (entry.0.abs() * entry.1 + quantity * price) / new_qty.abs();
        }
        entry.0 = new_qty;
    }
    let win_rate = if closed == 0 {
        0.0
    } else {
        wins as f64 / closed as f64
    };
    let cost_ratio = if notional > 0.0 {
        commission / notional
    } else {
        0.0
    };
    let total_return = if basis_total > 0.0 {
        pnl_total / basis_total
    } else {
        0.0
    };
    RealizedStats {
        total_return,
        sharpe: sharpe_of(&trade_returns),
        win_rate,
        cost_ratio,
    }
}

/// Mean over population standard deviation of per-trade returns; zero when
/// fewer than two closed trades or the returns are constant
fn sharpe_of(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt();
    if std > 0.0 {
        mean / std
    } else {
        0.0
    }
}

fn decimal_to_f64(value: rust_decimal::Decimal) -> f64 {
    use rust_decimal::prelude::ToPrimitive;
    value.to_f64().unwrap_or(0.0)
}
