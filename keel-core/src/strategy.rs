//! Strategy interface
//!
//! A strategy is a deterministic signal generator: it observes validated bars
//! and the current portfolio snapshot, and may propose at most one order per
//! bar. It never talks to the broker, the feed or the risk gate directly.

use crate::market::{MarketBar, OrderIntent};
use crate::portfolio::PortfolioView;

pub trait Strategy: Send + std::fmt::Debug {
    /// Short stable identifier, used in logs and the registry
    fn name(&self) -> &str;

    /// Observe one validated bar; optionally propose an order.
    ///
    /// Called by the orchestrator in strict bar order. Implementations keep
    /// whatever rolling state they need internally.
    fn on_bar(&mut self, bar: &MarketBar, portfolio: &PortfolioView) -> Option<OrderIntent>;

    /// Reset internal rolling state, e.g. between sessions
    fn reset(&mut self);
}
