//! Mean-reversion z-score strategy
//!
//! Maintains a rolling window of closes and trades the standardized
//! deviation from its mean: a close far below the mean opens a long, which
//! is closed once the price reverts toward the mean. Symmetric logic runs on
//! the short side.

use keel_core::market::{MarketBar, OrderIntent, Side};
use keel_core::portfolio::PortfolioView;
use keel_core::strategy::Strategy;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeanReversionParams {
    pub symbol: String,
    pub window: usize,
    /// |z| at which a position opens
    pub entry_z: f64,
    /// |z| at or below which an open position closes
    pub exit_z: f64,
    pub order_qty: Decimal,
    /// Allow opening shorts as well as longs
    pub allow_short: bool,
}

impl Default for MeanReversionParams {
    fn default() -> Self {
        Self {
            symbol: String::new(),
            window: 20,
            entry_z: 2.0,
            exit_z: 0.5,
            order_qty: Decimal::TEN,
            allow_short: false,
        }
    }
}

#[derive(Debug)]
pub struct MeanReversionZScore {
    params: MeanReversionParams,
    closes: VecDeque<f64>,
}

impl MeanReversionZScore {
    pub fn new(params: MeanReversionParams) -> anyhow::Result<Self> {
        anyhow::ensure!(params.window >= 2, "window must hold at least two bars");
        anyhow::ensure!(
            params.entry_z > params.exit_z && params.exit_z >= 0.0,
            "entry z must exceed exit z"
        );
        anyhow::ensure!(params.order_qty > Decimal::ZERO, "order qty must be positive");
        Ok(Self {
            params,
            closes: VecDeque::new(),
        })
    }

    /// Z-score of `price` against the current window, `None` until the
    /// window is full or while the window is flat
    fn zscore(&self, price: f64) -> Option<f64> {
        if self.closes.len() < self.params.window {
            return None;
        }
        let n = self.closes.len() as f64;
        let mean = self.closes.iter().sum::<f64>() / n;
        let variance = self.closes.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / n;
        let std = variance.sqrt();
        if std == 0.0 {
            return None;
        }
        Some((price - mean) / std)
    }

    fn push(&mut self, close: f64) {
        self.closes.push_back(close);
        while self.closes.len() > self.params.window {
            self.closes.pop_front();
        }
    }
}

impl Strategy for MeanReversionZScore {
    fn name(&self) -> &str {
        "mean-reversion-zscore"
    }

    fn on_bar(&mut self, bar: &MarketBar, portfolio: &PortfolioView) -> Option<OrderIntent> {
        if !self.params.symbol.is_empty() && bar.symbol != self.params.symbol {
            return None;
        }
        let close = bar.close.to_f64()?;
        let z = self.zscore(close);
        self.push(close);
        let z = z?;

        let held = portfolio.position_qty(&bar.symbol);
        let intent = if held.is_zero() {
            if z <= -self.params.entry_z {
                tracing::debug!(symbol = %bar.symbol, z, "oversold, opening long");
                Some(Side::Buy)
            } else if z >= self.params.entry_z && self.params.allow_short {
                tracing::debug!(symbol = %bar.symbol, z, "overbought, opening short");
                Some(Side::Sell)
            } else {
                None
            }
        } else if held > Decimal::ZERO && z >= -self.params.exit_z {
            tracing::debug!(symbol = %bar.symbol, z, "reverted, closing long");
            Some(Side::Sell)
        } else if held < Decimal::ZERO && z <= self.params.exit_z {
            tracing::debug!(symbol = %bar.symbol, z, "reverted, closing short");
            Some(Side::Buy)
        } else {
            None
        };

        intent.map(|side| {
            let quantity = if held.is_zero() {
                self.params.order_qty
            } else {
                held.abs()
            };
            OrderIntent {
                symbol: bar.symbol.clone(),
                side,
                quantity,
                reference_price: bar.close,
            }
        })
    }

    fn reset(&mut self) {
        self.closes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn view(held: Decimal) -> PortfolioView {
        let mut positions = HashMap::new();
        if !held.is_zero() {
            positions.insert(
                "SPY".to_string(),
                keel_core::portfolio::Position {
                    quantity: held,
                    avg_cost: dec!(100),
                },
            );
        }
        PortfolioView {
            cash: dec!(100_000),
            positions,
            equity: dec!(100_000),
        }
    }

    fn bar(ts: i64, close: Decimal) -> MarketBar {
        MarketBar::flat("SPY", ts, close, dec!(1_000))
    }

    fn strategy() -> MeanReversionZScore {
        MeanReversionZScore::new(MeanReversionParams {
            symbol: "SPY".to_string(),
            window: 4,
            entry_z: 1.5,
            exit_z: 0.5,
            order_qty: dec!(5),
            allow_short: true,
        })
        .unwrap()
    }

    /// Warm a strategy on a stable band of prices
    fn warm(s: &mut MeanReversionZScore, view: &PortfolioView) -> i64 {
        let mut ts = 0;
        for price in [100, 102, 98, 100] {
            ts += 1;
            assert!(s.on_bar(&bar(ts, Decimal::from(price)), view).is_none());
        }
        ts
    }

    #[test]
    fn test_rejects_inverted_thresholds() {
        assert!(MeanReversionZScore::new(MeanReversionParams {
            entry_z: 0.5,
            exit_z: 2.0,
            ..MeanReversionParams::default()
        })
        .is_err());
    }

    #[test]
    fn test_crash_opens_long_and_reversion_closes_it() {
        let mut s = strategy();
        let flat = view(dec!(0));
        let mut ts = warm(&mut s, &flat);

        // Window mean 100, std sqrt(2); 80 is z = -14
        ts += 1;
        let intent = s.on_bar(&bar(ts, dec!(80)), &flat).unwrap();
        assert_eq!(intent.side, Side::Buy);
        assert_eq!(intent.quantity, dec!(5));

        // Once long, a price back at the window mean closes the position
        let long = view(dec!(5));
        ts += 1;
        let close = s.on_bar(&bar(ts, dec!(96)), &long).unwrap();
        assert_eq!(close.side, Side::Sell);
        assert_eq!(close.quantity, dec!(5));
    }

    #[test]
    fn test_spike_opens_short_when_allowed() {
        let mut s = strategy();
        let flat = view(dec!(0));
        let mut ts = warm(&mut s, &flat);
        ts += 1;
        let intent = s.on_bar(&bar(ts, dec!(120)), &flat).unwrap();
        assert_eq!(intent.side, Side::Sell);
    }

    #[test]
    fn test_long_only_ignores_spikes() {
        let mut s = MeanReversionZScore::new(MeanReversionParams {
            symbol: "SPY".to_string(),
            window: 4,
            entry_z: 1.5,
            exit_z: 0.5,
            order_qty: dec!(5),
            allow_short: false,
        })
        .unwrap();
        let flat = view(dec!(0));
        let mut ts = warm(&mut s, &flat);
        ts += 1;
        assert!(s.on_bar(&bar(ts, dec!(120)), &flat).is_none());
    }

    #[test]
    fn test_flat_window_never_signals() {
        let mut s = strategy();
        let flat = view(dec!(0));
        for ts in 1..10 {
            assert!(s.on_bar(&bar(ts, dec!(100)), &flat).is_none());
        }
    }
}
