//! Portfolio state
//!
//! Cash, per-symbol positions at average cost, and the equity curve. Only the
//! session orchestrator mutates a `Portfolio`, and only after a confirmed
//! fill; every other component sees a read-only `PortfolioView` snapshot.

use crate::market::{Fill, Side};
use rust_decimal::prelude::{Signed, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One open position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Signed quantity; negative is short
    pub quantity: Decimal,
    /// Average entry price of the open quantity
    pub avg_cost: Decimal,
}

impl Position {
    pub fn notional_at(&self, price: Decimal) -> Decimal {
        (self.quantity * price).abs()
    }
}

/// Read-only snapshot handed to strategies and the risk gate
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioView {
    pub cash: Decimal,
    pub positions: HashMap<String, Position>,
    /// Equity at the time the snapshot was taken
    pub equity: Decimal,
}

impl PortfolioView {
    pub fn position_qty(&self, symbol: &str) -> Decimal {
        self.positions
            .get(symbol)
            .map(|p| p.quantity)
            .unwrap_or(Decimal::ZERO)
    }
}

/// Live portfolio owned by the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    cash: Decimal,
    positions: HashMap<String, Position>,
    /// (timestamp_ms, equity) marks, appended at each mark-to-market
    equity_curve: Vec<(i64, Decimal)>,
}

impl Portfolio {
    pub fn new(starting_cash: Decimal) -> Self {
        Self {
            cash: starting_cash,
            positions: HashMap::new(),
            equity_curve: Vec::new(),
        }
    }

    pub fn cash(&self) -> Decimal {
        self.cash
    }

    pub fn position(&self, symbol: &str) -> Option<Position> {
        self.positions.get(symbol).copied()
    }

    pub fn position_qty(&self, symbol: &str) -> Decimal {
        self.position(symbol)
            .map(|p| p.quantity)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn positions(&self) -> &HashMap<String, Position> {
        &self.positions
    }

    /// Apply a confirmed fill: cash moves by notional plus commission, the
    /// position quantity and average cost update. Closing through zero
    /// re-bases the average cost at the fill price.
    ///
    /// Returns the realized profit or loss of the fill, commission included
    /// (an opening fill realizes exactly minus its commission).
    pub fn apply_fill(&mut self, fill: &Fill) -> Decimal {
        let notional = fill.quantity * fill.price;
        let signed_qty = match fill.side {
            Side::Buy => fill.quantity,
            Side::Sell => -fill.quantity,
        };
        match fill.side {
            Side::Buy => self.cash -= notional,
            Side::Sell => self.cash += notional,
        }
        self.cash -= fill.commission;

        let entry = self.positions.entry(fill.symbol.clone()).or_insert(Position {
            quantity: Decimal::ZERO,
            avg_cost: Decimal::ZERO,
        });
        let prev_qty = entry.quantity;
        let new_qty = prev_qty + signed_qty;

        let mut realized = -fill.commission;
        if !prev_qty.is_zero() && signed_qty.signum() != prev_qty.signum() {
            // Closing some or all of the position, possibly flipping
            let closed = fill.quantity.min(prev_qty.abs());
            let direction = prev_qty.signum();
            realized += closed * (fill.price - entry.avg_cost) * direction;
        }

        if new_qty.is_zero() {
            self.positions.remove(&fill.symbol);
            return realized;
        }
        if prev_qty.is_zero() || prev_qty.signum() != new_qty.signum() {
            // Opening fresh or flipping direction
            entry.avg_cost = fill.price;
        } else if signed_qty.signum() == prev_qty.signum() {
            // Adding to the position: blend the average cost
            let prev_notional = prev_qty.abs() * entry.avg_cost;
            entry.avg_cost = (prev_notional + fill.quantity * fill.price) / new_qty.abs();
        }
        // Reducing without flipping keeps the average cost.
        entry.quantity = new_qty;
        realized
    }

    /// Mark-to-market equity at the given prices
    pub fn equity(&self, prices: &HashMap<String, Decimal>) -> Decimal {
        let mut equity = self.cash;
        for (symbol, position) in &self.positions {
            let mark = prices.get(symbol).copied().unwrap_or(position.avg_cost);
            equity += position.quantity * mark;
        }
        equity
    }

    /// Record an equity mark and return the new value
    pub fn mark_equity(&mut self, timestamp_ms: i64, prices: &HashMap<String, Decimal>) -> Decimal {
        let equity = self.equity(prices);
        self.equity_curve.push((timestamp_ms, equity));
        equity
    }

    pub fn equity_curve(&self) -> &[(i64, Decimal)] {
        &self.equity_curve
    }

    /// Most recent `window` simple returns from the equity curve, oldest
    /// first. Fewer marks than `window + 1` yields what is available.
    pub fn returns_window(&self, window: usize) -> Vec<f64> {
        let n = self.equity_curve.len();
        if n < 2 {
            return Vec::new();
        }
        let start = n.saturating_sub(window + 1);
        let marks = &self.equity_curve[start..];
        marks
            .windows(2)
            .filter_map(|pair| {
                let prev = pair[0].1;
                let curr = pair[1].1;
                if prev.is_zero() {
                    return None;
                }
                let ratio = (curr / prev - Decimal::ONE).to_f64()?;
                Some(ratio)
            })
            .collect()
    }

    pub fn view(&self, prices: &HashMap<String, Decimal>) -> PortfolioView {
        PortfolioView {
            cash: self.cash,
            positions: self.positions.clone(),
            equity: self.equity(prices),
        }
    }
}
