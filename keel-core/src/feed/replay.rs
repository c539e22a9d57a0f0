//! In-memory replay source
//!
//! Feeds a fixed bar sequence through the `MarketSource` interface, with
//! optional scripted connect failures and mid-stream disconnects so the
//! reliability layer can be exercised deterministically. Also provides a
//! seeded random-walk generator for synthetic paper sessions.

use super::{FeedError, MarketSource};
use crate::market::MarketBar;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

pub struct ReplaySource {
    history: Vec<MarketBar>,
    cursor: usize,
    connected: bool,
    /// Remaining connect attempts that should fail
    connect_failures: u32,
    /// Disconnect after this many bars delivered since the last connect
    disconnect_after: Option<usize>,
    delivered_since_connect: usize,
}

impl ReplaySource {
    /// `history` must be ordered the way the upstream venue would deliver it
    pub fn new(history: Vec<MarketBar>) -> Self {
        Self {
            history,
            cursor: 0,
            connected: false,
            connect_failures: 0,
            disconnect_after: None,
            delivered_since_connect: 0,
        }
    }

    /// Seeded geometric random walk for one symbol
    pub fn random_walk(
        symbol: &str,
        start_ts_ms: i64,
        step_ms: i64,
        bars: usize,
        start_price: f64,
        seed: u64,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut price = start_price;
        let mut history = Vec::with_capacity(bars);
        for i in 0..bars {
            let drift: f64 = rng.gen_range(-0.005..0.005);
            let open = price;
            price *= 1.0 + drift;
            let close = price;
            let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.002));
            let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.002));
            let volume = rng.gen_range(1_000.0..50_000.0f64);
            history.push(MarketBar {
                symbol: symbol.to_string(),
                timestamp_ms: start_ts_ms + i as i64 * step_ms,
                open: decimal(open),
                high: decimal(high),
                low: decimal(low),
                close: decimal(close),
                volume: decimal(volume),
                source: crate::market::RecordSource::Live,
            });
        }
        Self::new(history)
    }

    /// Fail the next `n` connect attempts
    pub fn script_connect_failures(&mut self, n: u32) {
        self.connect_failures = n;
    }

    /// Disconnect once, after delivering `n` more bars
    pub fn script_disconnect_after(&mut self, n: usize) {
        self.disconnect_after = Some(n);
    }
}

fn decimal(value: f64) -> Decimal {
    Decimal::from_f64((value * 10_000.0).round() / 10_000.0).unwrap_or(Decimal::ONE)
}

impl MarketSource for ReplaySource {
    fn connect(&mut self, _symbols: &[String]) -> Result<(), FeedError> {
        if self.connect_failures > 0 {
            self.connect_failures -= 1;
            return Err(FeedError::ConnectFailed("scripted failure".into()));
        }
        self.connected = true;
        self.delivered_since_connect = 0;
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<MarketBar>, FeedError> {
        if !self.connected {
            return Err(FeedError::Disconnected("not connected".into()));
        }
        if let Some(limit) = self.disconnect_after {
            if self.delivered_since_connect >= limit {
                self.connected = false;
                self.disconnect_after = None;
                return Err(FeedError::Disconnected("scripted disconnect".into()));
            }
        }
        match self.history.get(self.cursor) {
            Some(bar) => {
                self.cursor += 1;
                self.delivered_since_connect += 1;
                Ok(Some(bar.clone()))
            }
            None => Ok(None),
        }
    }

    fn supports_replay(&self) -> bool {
        true
    }

    fn is_finished(&self) -> bool {
        self.cursor >= self.history.len()
    }

    fn replay_overlap(&mut self, from_ts_ms: i64) -> Result<Vec<MarketBar>, FeedError> {
        Ok(self
            .history
            .iter()
            .filter(|b| b.timestamp_ms >= from_ts_ms)
            .cloned()
            .collect())
    }
}
