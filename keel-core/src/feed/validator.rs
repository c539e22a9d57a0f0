//! Bar validation
//!
//! Stateful per-symbol gate between the raw source and the session. A bar is
//! either accepted, or rejected with a reason that the reliability layer
//! turns into a DataQuality record. Rejected bars never update validator
//! state, so one bad print cannot poison the deviation baseline.

use crate::market::MarketBar;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Max fractional move of close vs the last accepted close (e.g. 0.2)
    pub max_price_deviation: f64,
    /// Symbol whose price anchors the cross-instrument basis check
    pub reference_symbol: Option<String>,
    /// Max fractional drift of a symbol's price ratio to the reference,
    /// measured against the ratio first observed
    pub max_basis_deviation: f64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_price_deviation: 0.2,
            reference_symbol: None,
            max_basis_deviation: 0.5,
        }
    }
}

/// Why a bar was rejected
#[derive(Debug, Clone, PartialEq)]
pub enum BarReject {
    NonPositivePrice,
    NegativeVolume,
    /// OHLC fields disagree (high < low, or open/close outside [low, high])
    IncoherentOhlc,
    /// Timestamp not strictly greater than the last accepted one
    StaleTimestamp { last_ms: i64 },
    /// Exact (symbol, timestamp) already accepted
    Duplicate,
    /// Close moved more than the allowed fraction from the last accepted
    ExcessiveDeviation { fraction: f64 },
    /// Ratio to the reference symbol drifted beyond the basis band
    BasisDrift { fraction: f64 },
}

impl fmt::Display for BarReject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BarReject::NonPositivePrice => write!(f, "non-positive price"),
            BarReject::NegativeVolume => write!(f, "negative volume"),
            BarReject::IncoherentOhlc => write!(f, "incoherent ohlc"),
            BarReject::StaleTimestamp { last_ms } => {
                write!(f, "timestamp not after last accepted ({last_ms})")
            }
            BarReject::Duplicate => write!(f, "duplicate bar"),
            BarReject::ExcessiveDeviation { fraction } => {
                write!(f, "price deviation {fraction:.4} exceeds band")
            }
            BarReject::BasisDrift { fraction } => {
                write!(f, "basis drift {fraction:.4} vs reference exceeds band")
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SymbolState {
    last_ts_ms: i64,
    last_close: Decimal,
    /// close / reference_close at first joint observation
    baseline_basis: Option<f64>,
}

/// Stateful validator, one per feed
#[derive(Debug)]
pub struct BarValidator {
    config: ValidatorConfig,
    state: HashMap<String, SymbolState>,
    last_reference_close: Option<Decimal>,
}

impl BarValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self {
            config,
            state: HashMap::new(),
            last_reference_close: None,
        }
    }

    /// Validate and, on acceptance, absorb the bar into validator state
    pub fn accept(&mut self, bar: &MarketBar) -> Result<(), BarReject> {
        self.check(bar)?;
        let is_reference = self
            .config
            .reference_symbol
            .as_deref()
            .is_some_and(|r| r == bar.symbol);
        if is_reference {
            self.last_reference_close = Some(bar.close);
        }
        let baseline = self.basis_baseline(bar);
        self.state.insert(
            bar.symbol.clone(),
            SymbolState {
                last_ts_ms: bar.timestamp_ms,
                last_close: bar.close,
                baseline_basis: baseline,
            },
        );
        Ok(())
    }

    fn check(&self, bar: &MarketBar) -> Result<(), BarReject> {
        if bar.open <= Decimal::ZERO
            || bar.high <= Decimal::ZERO
            || bar.low <= Decimal::ZERO
            || bar.close <= Decimal::ZERO
        {
            return Err(BarReject::NonPositivePrice);
        }
        if bar.volume < Decimal::ZERO {
            return Err(BarReject::NegativeVolume);
        }
        if bar.high < bar.low
            || bar.open < bar.low
            || bar.open > bar.high
            || bar.close < bar.low
            || bar.close > bar.high
        {
            return Err(BarReject::IncoherentOhlc);
        }

        if let Some(state) = self.state.get(&bar.symbol) {
            if bar.timestamp_ms == state.last_ts_ms {
                return Err(BarReject::Duplicate);
            }
            if bar.timestamp_ms < state.last_ts_ms {
                return Err(BarReject::StaleTimestamp {
                    last_ms: state.last_ts_ms,
                });
            }
            if !state.last_close.is_zero() {
                let deviation = ((bar.close - state.last_close) / state.last_close)
                    .abs()
                    .to_f64()
                    .unwrap_or(f64::INFINITY);
                if deviation > self.config.max_price_deviation {
                    return Err(BarReject::ExcessiveDeviation {
                        fraction: deviation,
                    });
                }
            }
            if let (Some(baseline), Some(drift)) =
                (state.baseline_basis, self.current_basis(bar))
            {
                if baseline > 0.0 {
                    let fraction = ((drift - baseline) / baseline).abs();
                    if fraction > self.config.max_basis_deviation {
                        return Err(BarReject::BasisDrift { fraction });
                    }
                }
            }
        }
        Ok(())
    }

    /// close / last reference close, when both are known and this symbol is
    /// not itself the reference
    fn current_basis(&self, bar: &MarketBar) -> Option<f64> {
        let reference = self.config.reference_symbol.as_deref()?;
        if reference == bar.symbol {
            return None;
        }
        let ref_close = self.last_reference_close?;
        if ref_close.is_zero() {
            return None;
        }
        (bar.close / ref_close).to_f64()
    }

    fn basis_baseline(&self, bar: &MarketBar) -> Option<f64> {
        match self.state.get(&bar.symbol).and_then(|s| s.baseline_basis) {
            Some(existing) => Some(existing),
            None => self.current_basis(bar),
        }
    }

    /// Last accepted timestamp for a symbol, used for replay windows
    pub fn last_accepted_ts(&self, symbol: &str) -> Option<i64> {
        self.state.get(symbol).map(|s| s.last_ts_ms)
    }

    pub fn last_close(&self, symbol: &str) -> Option<Decimal> {
        self.state.get(symbol).map(|s| s.last_close)
    }
}
