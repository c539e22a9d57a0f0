//! Gate evaluation
//!
//! Hard caps run first and short-circuit the analytic checks, but every
//! violated hard cap is reported so the operator sees the full picture in
//! one rejection. Analytics run only on a clean hard-cap pass: liquidity,
//! post-trade concentration, then VaR/CVaR against volatility-scaled
//! ceilings.

use super::types::{RiskBreach, RiskLimits, RiskMetrics, RiskVerdict, TradingDayStats};
use super::var::historical_var;
use crate::market::{OrderIntent, Side};
use crate::portfolio::PortfolioView;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Everything the gate needs beyond the order itself
#[derive(Debug, Clone)]
pub struct RiskInputs<'a> {
    pub portfolio: &'a PortfolioView,
    /// Latest marks per symbol
    pub prices: &'a HashMap<String, Decimal>,
    /// Equity-curve simple returns, oldest first
    pub returns: &'a [f64],
    /// Recent average bar volume for the order's symbol; zero when unknown
    pub recent_volume: Decimal,
    pub day: &'a TradingDayStats,
    pub now_ms: i64,
}

#[derive(Debug, Clone)]
pub struct RiskGate {
    limits: RiskLimits,
}

impl RiskGate {
    pub fn new(limits: RiskLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    pub fn evaluate(&self, order: &OrderIntent, inputs: &RiskInputs<'_>) -> RiskVerdict {
        let hard = self.check_hard_caps(order, inputs);
        if !hard.is_empty() {
            tracing::warn!(
                symbol = %order.symbol,
                breaches = hard.len(),
                "order rejected on hard caps"
            );
            return RiskVerdict::rejected(hard, None);
        }

        let mut breaches = Vec::new();
        let mut metrics = RiskMetrics::default();

        metrics.volume_fraction = self.volume_fraction(order, inputs);
        if metrics.volume_fraction > self.limits.max_volume_fraction {
            breaches.push(RiskBreach::LiquidityExceeded {
                fraction: metrics.volume_fraction,
                limit: self.limits.max_volume_fraction,
            });
        }

        metrics.concentration = self.post_trade_concentration(order, inputs);
        if metrics.concentration > self.limits.max_concentration {
            breaches.push(RiskBreach::ConcentrationExceeded {
                index: metrics.concentration,
                limit: self.limits.max_concentration,
            });
        }

        if let Some((var, cvar)) = historical_var(inputs.returns, self.limits.var_confidence) {
            metrics.var = Some(var);
            metrics.cvar = Some(cvar);
            let scale = self.ceiling_scale(inputs.returns);
            let var_ceiling = self.limits.max_var * scale;
            let cvar_ceiling = self.limits.max_cvar * scale;
            if var > var_ceiling {
                breaches.push(RiskBreach::VarExceeded {
                    var,
                    limit: var_ceiling,
                });
            }
            if cvar > cvar_ceiling {
                breaches.push(RiskBreach::CvarExceeded {
                    cvar,
                    limit: cvar_ceiling,
                });
            }
        }

        if breaches.is_empty() {
            RiskVerdict::allowed(metrics)
        } else {
            tracing::warn!(
                symbol = %order.symbol,
                breaches = breaches.len(),
                "order rejected on analytic ceilings"
            );
            RiskVerdict::rejected(breaches, Some(metrics))
        }
    }

    /// Ceiling multiplier: the static scale, optionally shaped by how
    /// recent realized volatility compares to the configured target
    fn ceiling_scale(&self, returns: &[f64]) -> f64 {
        let base = self.limits.volatility_scale;
        let Some(target) = self.limits.target_volatility else {
            return base;
        };
        if returns.len() < 2 || target <= 0.0 {
            return base;
        }
        let n = returns.len() as f64;
        let mean = returns.iter().sum::<f64>() / n;
        let realized = (returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n).sqrt();
        if realized <= 0.0 {
            return base;
        }
        (base * target / realized).clamp(base * 0.25, base * 4.0)
    }

    fn check_hard_caps(&self, order: &OrderIntent, inputs: &RiskInputs<'_>) -> Vec<RiskBreach> {
        let mut breaches = Vec::new();

        let denied = self.limits.denied_symbols.iter().any(|s| s == &order.symbol);
        let outside_allow_list = self
            .limits
            .allowed_symbols
            .as_ref()
            .is_some_and(|allowed| !allowed.iter().any(|s| s == &order.symbol));
        if denied || outside_allow_list {
            breaches.push(RiskBreach::SymbolNotAllowed {
                symbol: order.symbol.clone(),
            });
        }

        let notional = order.notional();
        if notional > self.limits.max_order_notional {
            breaches.push(RiskBreach::OrderTooLarge {
                notional,
                limit: self.limits.max_order_notional,
            });
        }

        if inputs.day.trades_submitted >= self.limits.max_daily_trades {
            breaches.push(RiskBreach::DailyTradeLimit {
                submitted: inputs.day.trades_submitted,
                limit: self.limits.max_daily_trades,
            });
        }

        if inputs.day.realized_pnl <= -self.limits.max_daily_loss {
            breaches.push(RiskBreach::DailyLossLimit {
                loss: -inputs.day.realized_pnl,
                limit: self.limits.max_daily_loss,
            });
        }

        if let Some((start, end)) = self.limits.trading_window_min {
            let minute_utc = ((inputs.now_ms / 60_000).rem_euclid(1_440)) as u32;
            if minute_utc < start || minute_utc >= end {
                breaches.push(RiskBreach::OutsideTradingWindow { minute_utc });
            }
        }

        breaches
    }

    fn volume_fraction(&self, order: &OrderIntent, inputs: &RiskInputs<'_>) -> f64 {
        if inputs.recent_volume <= Decimal::ZERO {
            // No liquidity estimate: treat the order as consuming everything
            return f64::INFINITY;
        }
        (order.quantity / inputs.recent_volume)
            .to_f64()
            .unwrap_or(f64::INFINITY)
    }

    /// Herfindahl index over post-trade notional weights, measured against
    /// equity so that cash dilutes concentration
    fn post_trade_concentration(&self, order: &OrderIntent, inputs: &RiskInputs<'_>) -> f64 {
        let mut quantities: HashMap<String, Decimal> = inputs
            .portfolio
            .positions
            .iter()
            .map(|(symbol, p)| (symbol.clone(), p.quantity))
            .collect();
        let signed = match order.side {
            Side::Buy => order.quantity,
            Side::Sell => -order.quantity,
        };
        *quantities.entry(order.symbol.clone()).or_insert(Decimal::ZERO) += signed;

        let mut notionals = Vec::new();
        let mut gross = Decimal::ZERO;
        for (symbol, quantity) in &quantities {
            if quantity.is_zero() {
                continue;
            }
            let mark = inputs
                .prices
                .get(symbol)
                .copied()
                .unwrap_or(if symbol == &order.symbol {
                    order.reference_price
                } else {
                    Decimal::ZERO
                });
            let notional = (*quantity * mark).abs();
            gross += notional;
            notionals.push(notional);
        }
        // Weights against equity when it is positive, else against gross
        // exposure.
        let denominator = if inputs.portfolio.equity > Decimal::ZERO {
            inputs.portfolio.equity
        } else {
            gross
        };
        if denominator.is_zero() {
            return 0.0;
        }
        notionals
            .iter()
            .map(|n| (*n / denominator).to_f64().unwrap_or(0.0).powi(2))
            .sum()
    }
}
