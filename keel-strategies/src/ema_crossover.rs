//! EMA crossover strategy
//!
//! Tracks a fast and a slow exponential moving average of the close. A fast
//! EMA crossing above the slow one opens a long position; crossing back
//! below closes it. Signals fire only on the bar where the relation flips,
//! never on every bar of a sustained trend.

use keel_core::market::{MarketBar, OrderIntent, Side};
use keel_core::portfolio::PortfolioView;
use keel_core::strategy::Strategy;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmaCrossoverParams {
    pub symbol: String,
    pub fast_period: usize,
    pub slow_period: usize,
    pub order_qty: Decimal,
}

impl Default for EmaCrossoverParams {
    fn default() -> Self {
        Self {
            symbol: String::new(),
            fast_period: 12,
            slow_period: 26,
            order_qty: Decimal::TEN,
        }
    }
}

#[derive(Debug)]
struct Ema {
    alpha: f64,
    value: Option<f64>,
    samples: usize,
    period: usize,
}

impl Ema {
    fn new(period: usize) -> Self {
        Self {
            alpha: 2.0 / (period as f64 + 1.0),
            value: None,
            samples: 0,
            period,
        }
    }

    fn update(&mut self, price: f64) -> Option<f64> {
        self.samples += 1;
        let next = match self.value {
            None => price,
            Some(prev) => prev + self.alpha * (price - prev),
        };
        self.value = Some(next);
        // Not meaningful until a full period has been absorbed
        (self.samples >= self.period).then_some(next)
    }

    fn reset(&mut self) {
        self.value = None;
        self.samples = 0;
    }
}

#[derive(Debug)]
pub struct EmaCrossover {
    params: EmaCrossoverParams,
    fast: Ema,
    slow: Ema,
    /// fast > slow on the previous bar, once both EMAs are warm
    fast_above: Option<bool>,
}

impl EmaCrossover {
    pub fn new(params: EmaCrossoverParams) -> anyhow::Result<Self> {
        anyhow::ensure!(
            params.fast_period > 0 && params.fast_period < params.slow_period,
            "fast period must be positive and shorter than slow"
        );
        anyhow::ensure!(params.order_qty > Decimal::ZERO, "order qty must be positive");
        let fast = Ema::new(params.fast_period);
        let slow = Ema::new(params.slow_period);
        Ok(Self {
            params,
            fast,
            slow,
            fast_above: None,
        })
    }
}

impl Strategy for EmaCrossover {
    fn name(&self) -> &str {
        "ema-crossover"
    }

    fn on_bar(&mut self, bar: &MarketBar, portfolio: &PortfolioView) -> Option<OrderIntent> {
        if !self.params.symbol.is_empty() && bar.symbol != self.params.symbol {
            return None;
        }
        let close = bar.close.to_f64()?;
        let fast = self.fast.update(close);
        let slow = self.slow.update(close);
        let (fast, slow) = (fast?, slow?);

        let above = fast > slow;
        let previous = self.fast_above.replace(above);
        let crossed = previous.is_some_and(|was| was != above);
        if !crossed {
            return None;
        }

        let held = portfolio.position_qty(&bar.symbol);
        if above && held.is_zero() {
            tracing::debug!(symbol = %bar.symbol, fast, slow, "golden cross, opening long");
            Some(OrderIntent {
                symbol: bar.symbol.clone(),
                side: Side::Buy,
                quantity: self.params.order_qty,
                reference_price: bar.close,
            })
        } else if !above && held > Decimal::ZERO {
            tracing::debug!(symbol = %bar.symbol, fast, slow, "death cross, closing long");
            Some(OrderIntent {
                symbol: bar.symbol.clone(),
                side: Side::Sell,
                quantity: held,
                reference_price: bar.close,
            })
        } else {
            None
        }
    }

    fn reset(&mut self) {
        self.fast.reset();
        self.slow.reset();
        self.fast_above = None;
    }
}
