//! Position reconciliation
//!
//! Periodically compares the local portfolio snapshot against what the
//! broker reports. A mismatch beyond tolerance is a risk event: the local
//! snapshot is never overwritten with the broker's numbers, because an
//! unexplained difference means something upstream is wrong and papering
//! over it would hide the fault. Repeated unresolved mismatches escalate.

use crate::broker::AccountState;
use crate::fault::{ErrorCategory, ErrorRecord, ErrorSeverity, FaultKind};
use crate::portfolio::Portfolio;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    pub interval_ms: i64,
    /// Absolute per-symbol quantity difference tolerated
    pub qty_tolerance: Decimal,
    /// Absolute cash difference tolerated
    pub cash_tolerance: Decimal,
    /// Consecutive mismatching runs before escalation
    pub max_consecutive_mismatches: u32,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            interval_ms: 60_000,
            qty_tolerance: Decimal::ZERO,
            cash_tolerance: Decimal::ONE,
            max_consecutive_mismatches: 3,
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum ReconcileOutcome {
    Clean,
    /// Mismatch found; the session should degrade
    Mismatch(ErrorRecord),
    /// Mismatch persisted past the limit; the session should halt
    Escalate(ErrorRecord),
}

#[derive(Debug)]
pub struct Reconciler {
    config: ReconcileConfig,
    consecutive_mismatches: u32,
    last_run_ms: Option<i64>,
}

impl Reconciler {
    pub fn new(config: ReconcileConfig) -> Self {
        Self {
            config,
            consecutive_mismatches: 0,
            last_run_ms: None,
        }
    }

    pub fn due(&self, now_ms: i64) -> bool {
        match self.last_run_ms {
            None => true,
            Some(last) => now_ms - last >= self.config.interval_ms,
        }
    }

    pub fn consecutive_mismatches(&self) -> u32 {
        self.consecutive_mismatches
    }

    /// Compare local state against the broker's report
    pub fn compare(
        &mut self,
        local: &Portfolio,
        broker: &AccountState,
        now_ms: i64,
    ) -> ReconcileOutcome {
        self.last_run_ms = Some(now_ms);
        let mut differences = Vec::new();

        let cash_diff = (local.cash() - broker.cash).abs();
        if cash_diff > self.config.cash_tolerance {
            differences.push(format!(
                "cash local {} vs broker {}",
                local.cash(),
                broker.cash
            ));
        }

        let symbols: BTreeSet<&String> = local
            .positions()
            .keys()
            .chain(broker.positions.keys())
            .collect();
        for symbol in symbols {
            let local_qty = local.position_qty(symbol);
            let broker_qty = broker
                .positions
                .get(symbol.as_str())
                .copied()
                .unwrap_or(Decimal::ZERO);
            if (local_qty - broker_qty).abs() > self.config.qty_tolerance {
                differences.push(format!(
                    "{symbol} local {local_qty} vs broker {broker_qty}"
                ));
            }
        }

        if differences.is_empty() {
            self.consecutive_mismatches = 0;
            tracing::debug!("reconciliation clean");
            return ReconcileOutcome::Clean;
        }

        self.consecutive_mismatches += 1;
        let detail = differences.join("; ");
        tracing::warn!(
            run = self.consecutive_mismatches,
            "reconciliation mismatch: {detail}"
        );

        if self.consecutive_mismatches >= self.config.max_consecutive_mismatches {
            ReconcileOutcome::Escalate(ErrorRecord::new(
                FaultKind::new(ErrorCategory::RiskViolation, ErrorSeverity::Critical, false),
                now_ms,
                "reconcile",
                format!(
                    "unresolved after {} runs: {detail}",
                    self.consecutive_mismatches
                ),
            ))
        } else {
            ReconcileOutcome::Mismatch(ErrorRecord::new(
                FaultKind::new(ErrorCategory::RiskViolation, ErrorSeverity::High, false),
                now_ms,
                "reconcile",
                detail,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{Fill, Side};
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn local_with(symbol: &str, qty: Decimal) -> Portfolio {
        let mut p = Portfolio::new(dec!(10_000));
        p.apply_fill(&Fill {
            order_id: "t".to_string(),
            symbol: symbol.to_string(),
            side: Side::Buy,
            quantity: qty,
            price: dec!(100),
            commission: dec!(0),
            timestamp_ms: 0,
        });
        p
    }

    fn broker_with(cash: Decimal, symbol: &str, qty: Decimal) -> AccountState {
        let mut positions = HashMap::new();
        positions.insert(symbol.to_string(), qty);
        AccountState { cash, positions }
    }

    #[test]
    fn test_matching_state_is_clean() {
        let local = local_with("SPY", dec!(100));
        let broker = broker_with(local.cash(), "SPY", dec!(100));
        let mut r = Reconciler::new(ReconcileConfig::default());
        assert_eq!(r.compare(&local, &broker, 1_000), ReconcileOutcome::Clean);
        assert_eq!(r.consecutive_mismatches(), 0);
    }

    #[test]
    fn test_quantity_mismatch_raises_high_risk_violation() {
        // Broker says 150 shares, local book says 100, tolerance zero
        let local = local_with("SPY", dec!(100));
        let broker = broker_with(local.cash(), "SPY", dec!(150));
        let mut r = Reconciler::new(ReconcileConfig::default());

        match r.compare(&local, &broker, 1_000) {
            ReconcileOutcome::Mismatch(record) => {
                assert_eq!(record.category, ErrorCategory::RiskViolation);
                assert_eq!(record.severity, ErrorSeverity::High);
                assert!(record.message.contains("SPY local 100 vs broker 150"));
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
        // The local snapshot is left exactly as it was
        assert_eq!(local.position_qty("SPY"), dec!(100));
    }

    #[test]
    fn test_repeated_mismatches_escalate() {
        let local = local_with("SPY", dec!(100));
        let broker = broker_with(local.cash(), "SPY", dec!(150));
        let mut r = Reconciler::new(ReconcileConfig {
            max_consecutive_mismatches: 3,
            ..ReconcileConfig::default()
        });

        assert!(matches!(
            r.compare(&local, &broker, 1),
            ReconcileOutcome::Mismatch(_)
        ));
        assert!(matches!(
            r.compare(&local, &broker, 2),
            ReconcileOutcome::Mismatch(_)
        ));
        match r.compare(&local, &broker, 3) {
            ReconcileOutcome::Escalate(record) => {
                assert_eq!(record.severity, ErrorSeverity::Critical);
            }
            other => panic!("expected escalation, got {other:?}"),
        }
    }

    #[test]
    fn test_clean_run_resets_the_streak() {
        let local = local_with("SPY", dec!(100));
        let bad = broker_with(local.cash(), "SPY", dec!(150));
        let good = broker_with(local.cash(), "SPY", dec!(100));
        let mut r = Reconciler::new(ReconcileConfig::default());

        assert!(matches!(
            r.compare(&local, &bad, 1),
            ReconcileOutcome::Mismatch(_)
        ));
        assert_eq!(r.compare(&local, &good, 2), ReconcileOutcome::Clean);
        assert_eq!(r.consecutive_mismatches(), 0);
    }

    #[test]
    fn test_symbol_only_on_broker_side_is_a_mismatch() {
        let local = Portfolio::new(dec!(10_000));
        let broker = broker_with(dec!(10_000), "QQQ", dec!(5));
        let mut r = Reconciler::new(ReconcileConfig::default());
        assert!(matches!(
            r.compare(&local, &broker, 1),
            ReconcileOutcome::Mismatch(_)
        ));
    }

    #[test]
    fn test_due_respects_interval() {
        let mut r = Reconciler::new(ReconcileConfig {
            interval_ms: 60_000,
            ..ReconcileConfig::default()
        });
        assert!(r.due(0));
        let local = Portfolio::new(dec!(1));
        let broker = AccountState {
            cash: dec!(1),
            positions: HashMap::new(),
        };
        r.compare(&local, &broker, 0);
        assert!(!r.due(59_999));
        assert!(r.due(60_000));
    }
}
