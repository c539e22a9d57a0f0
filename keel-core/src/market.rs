//! Market data and trade primitives
//!
//! Shared value types flowing between the feed, strategy, risk gate,
//! broker gateway and analytics.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// Origin of a market data item or trade record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordSource {
    Backtest,
    Live,
}

/// A validated OHLCV bar for one symbol
///
/// Timestamps are milliseconds since the Unix epoch. Downstream components
/// rely on bars arriving in strictly increasing timestamp order per symbol;
/// the feed reliability layer enforces that invariant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketBar {
    pub symbol: String,
    pub timestamp_ms: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub source: RecordSource,
}

impl MarketBar {
    /// Convenience constructor for a flat bar (open == high == low == close)
    pub fn flat(symbol: &str, timestamp_ms: i64, price: Decimal, volume: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            timestamp_ms,
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
            source: RecordSource::Live,
        }
    }
}

/// An order proposed by a strategy, before risk evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct OrderIntent {
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    /// Reference price at decision time (typically last close)
    pub reference_price: Decimal,
}

impl OrderIntent {
    /// Notional value of the proposed order at the reference price
    pub fn notional(&self) -> Decimal {
        self.quantity * self.reference_price
    }
}

/// An order accepted by the risk gate and bound for the broker
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub client_order_id: String,
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    pub reference_price: Decimal,
}

/// A confirmed execution reported by the broker gateway
#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    pub order_id: String,
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    pub price: Decimal,
    pub commission: Decimal,
    pub timestamp_ms: i64,
}

/// Append-only record of an executed trade
///
/// The analyzer never edits a record once accepted; backtest and live
/// records share this schema so consistency validation can treat both
/// uniformly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub timestamp_ms: i64,
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    pub price: Decimal,
    pub commission: Decimal,
    pub order_id: String,
    pub source: RecordSource,
}

impl TradeRecord {
    pub fn from_fill(fill: &Fill, source: RecordSource) -> Self {
        Self {
            timestamp_ms: fill.timestamp_ms,
            symbol: fill.symbol.clone(),
            side: fill.side,
            quantity: fill.quantity,
            price: fill.price,
            commission: fill.commission,
            order_id: fill.order_id.clone(),
            source,
        }
    }

    /// Traded notional (quantity x price)
    pub fn notional(&self) -> Decimal {
        self.quantity * self.price
    }
}
