//! Session orchestrator
//!
//! Single-threaded control loop. Validated bars, feed-side faults and timer
//! ticks arrive through the event queue and are consumed strictly in order;
//! each bar flows strategy -> risk gate -> breaker-guarded submit ->
//! portfolio mutation. All trading state (portfolio, trade log, error log,
//! daily counters) is owned here and mutated only on this thread.

use crate::analytics::{PerformanceAnalyzer, PerformanceReport};
use crate::broker::BrokerGateway;
use crate::config::SessionConfig;
use crate::fault::{ErrorCategory, ErrorLog, ErrorRecord, ErrorSeverity, FaultKind};
use crate::market::{MarketBar, OrderIntent, OrderRequest, RecordSource, TradeRecord};
use crate::portfolio::Portfolio;
use crate::resilience::{
    execute_with_retry_by_category, now_ms, BreakerRegistry, OpClass, Sleeper, ThreadSleeper,
};
use crate::risk::{RiskGate, RiskInputs, TradingDayStats};
use crate::session::queue::{EventQueue, SessionEvent};
use crate::session::reconcile::{ReconcileOutcome, Reconciler};
use crate::session::state::SessionState;
use crate::strategy::Strategy;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Why the session is currently degraded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DegradeCause {
    BreakerOpen,
    FaultStreak,
    ReconcileMismatch,
}

pub struct Session<B: BrokerGateway> {
    config: SessionConfig,
    state: SessionState,
    portfolio: Portfolio,
    trade_log: Vec<TradeRecord>,
    error_log: ErrorLog,
    day: TradingDayStats,
    gate: RiskGate,
    breakers: BreakerRegistry,
    broker: B,
    strategy: Box<dyn Strategy>,
    reconciler: Reconciler,
    analyzer: PerformanceAnalyzer,
    prices: HashMap<String, Decimal>,
    volumes: HashMap<String, VecDeque<Decimal>>,
    /// Warm-up gate: both must hold before Initializing gives way to Running
    init_bar_seen: bool,
    init_reconciled: bool,
    /// Cause plus the first tick timestamp observed while degraded; the
    /// timeout runs on the tick clock, not on bar or fault event time
    degraded: Option<(DegradeCause, Option<i64>)>,
    next_order_id: u64,
    in_flight: Option<String>,
    sleeper: Box<dyn Sleeper + Send>,
}

impl<B: BrokerGateway> Session<B> {
    pub fn new(config: SessionConfig, broker: B, strategy: Box<dyn Strategy>) -> Self {
        Self::with_sleeper(config, broker, strategy, Box::new(ThreadSleeper))
    }

    pub fn with_sleeper(
        config: SessionConfig,
        broker: B,
        strategy: Box<dyn Strategy>,
        sleeper: Box<dyn Sleeper + Send>,
    ) -> Self {
        let portfolio = Portfolio::new(config.starting_cash);
        let gate = RiskGate::new(config.risk.clone());
        let breakers = BreakerRegistry::new(&config.breaker);
        let reconciler = Reconciler::new(config.reconcile.clone());
        let analyzer = PerformanceAnalyzer::new(config.performance.clone());
        Self {
            config,
            state: SessionState::Initializing,
            portfolio,
            trade_log: Vec::new(),
            error_log: ErrorLog::new(),
            day: TradingDayStats::default(),
            gate,
            breakers,
            broker,
            strategy,
            reconciler,
            analyzer,
            prices: HashMap::new(),
            volumes: HashMap::new(),
            init_bar_seen: false,
            init_reconciled: false,
            degraded: None,
            next_order_id: 1,
            in_flight: None,
            sleeper,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    pub fn trade_log(&self) -> &[TradeRecord] {
        &self.trade_log
    }

    pub fn error_log(&self) -> &ErrorLog {
        &self.error_log
    }

    pub fn report(&self) -> PerformanceReport {
        self.analyzer.report()
    }

    /// Force the session straight to Running, skipping the warm-up gate.
    /// Callers take responsibility for the broker link already being verified.
    pub fn start(&mut self) {
        self.transition(SessionState::Running, "session start");
    }

    /// Drive the session from the queue until stopped or terminal.
    ///
    /// A fresh session stays Initializing until the feed has delivered one
    /// valid bar and one reconciliation has come back clean; only then does
    /// trading begin. Ticks are synthesized whenever the queue is quiet for
    /// one tick interval, so reconciliation and degrade timers advance even
    /// without market data.
    pub fn run(&mut self, queue: &EventQueue, stop: &AtomicBool) {
        if self.state == SessionState::Initializing {
            // Verify the broker link up front instead of waiting for the
            // first reconcile interval.
            self.handle(SessionEvent::Tick(now_ms()));
        }
        let tick = Duration::from_millis(self.config.tick_interval_ms.max(1) as u64);
        let mut last_tick = now_ms();
        while !self.state.is_terminal() {
            if stop.load(Ordering::Relaxed) {
                self.shutdown("operator stop");
                break;
            }
            match queue.pop(tick) {
                Some(event) => self.handle(event),
                None => self.handle(SessionEvent::Tick(now_ms())),
            }
            let now = now_ms();
            if now - last_tick >= self.config.tick_interval_ms {
                last_tick = now;
                self.handle(SessionEvent::Tick(now));
            }
        }
    }

    pub fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Bar(bar) => self.on_bar(bar),
            SessionEvent::Fault(record) => self.push_fault(record),
            SessionEvent::Tick(ts) => self.on_tick(ts),
        }
    }

    /// Stop the session for good; in-flight work is already complete because
    /// events are handled to completion one at a time.
    pub fn shutdown(&mut self, reason: &str) {
        if !self.state.is_terminal() {
            self.transition(SessionState::Stopped, reason);
        }
    }

    fn on_bar(&mut self, bar: MarketBar) {
        if !self.state.consuming_data() {
            return;
        }
        self.prices.insert(bar.symbol.clone(), bar.close);
        let window = self.volumes.entry(bar.symbol.clone()).or_default();
        window.push_back(bar.volume);
        while window.len() > self.config.volume_window.max(1) {
            window.pop_front();
        }
        let equity = self.portfolio.mark_equity(bar.timestamp_ms, &self.prices);
        self.analyzer.mark_equity(bar.timestamp_ms, equity);

        if self.state == SessionState::Initializing {
            self.init_bar_seen = true;
            self.maybe_finish_init();
        }
        if !self.state.trading_enabled() {
            return;
        }
        let view = self.portfolio.view(&self.prices);
        let Some(intent) = self.strategy.on_bar(&bar, &view) else {
            return;
        };
        self.evaluate_and_submit(intent, bar.timestamp_ms);
    }

    fn evaluate_and_submit(&mut self, intent: OrderIntent, ts: i64) {
        let view = self.portfolio.view(&self.prices);
        let returns = self.portfolio.returns_window(self.config.returns_window);
        let recent_volume = self.average_volume(&intent.symbol);
        let inputs = RiskInputs {
            portfolio: &view,
            prices: &self.prices,
            returns: &returns,
            recent_volume,
            day: &self.day,
            now_ms: ts,
        };
        let verdict = self.gate.evaluate(&intent, &inputs);
        if !verdict.allowed {
            let summary = verdict
                .breaches
                .iter()
                .map(|b| b.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            self.push_fault(ErrorRecord::new(
                FaultKind::new(ErrorCategory::RiskViolation, ErrorSeverity::Medium, false),
                ts,
                "risk-gate",
                summary,
            ));
            return;
        }
        self.submit(intent, ts);
    }

    fn submit(&mut self, intent: OrderIntent, ts: i64) {
        let breaker = self.breakers.get_mut(OpClass::OrderSubmit);
        if !breaker.call_permitted() {
            let record = breaker.open_record(ts);
            self.push_fault(record);
            self.degrade(DegradeCause::BreakerOpen, ts);
            return;
        }

        let order = OrderRequest {
            client_order_id: format!("keel-{}", self.next_order_id),
            symbol: intent.symbol,
            side: intent.side,
            quantity: intent.quantity,
            reference_price: intent.reference_price,
        };
        self.next_order_id += 1;
        self.in_flight = Some(order.client_order_id.clone());

        let broker = &mut self.broker;
        let result = execute_with_retry_by_category(
            &mut || broker.submit(&order),
            "order-submit",
            &self.config.retry,
            &mut self.error_log,
            self.sleeper.as_ref(),
        );

        match result {
            Ok(fill) => {
                self.in_flight = None;
                self.breakers.get_mut(OpClass::OrderSubmit).record_success();
                self.error_log.note_success();
                let realized = self.portfolio.apply_fill(&fill);
                self.day.realized_pnl += realized;
                self.day.trades_submitted += 1;
                let record = TradeRecord::from_fill(&fill, RecordSource::Live);
                tracing::info!(
                    order_id = %record.order_id,
                    symbol = %record.symbol,
                    side = %record.side,
                    quantity = %record.quantity,
                    price = %record.price,
                    realized = %realized,
                    "fill confirmed"
                );
                self.analyzer.record(&record);
                self.trade_log.push(record);
            }
            Err(record) => {
                // Leave the order id in flight so a halt can issue a
                // best-effort cancel for it.
                self.breakers.get_mut(OpClass::OrderSubmit).record_failure();
                self.react(&record, ts);
                self.in_flight = None;
            }
        }
    }

    fn average_volume(&self, symbol: &str) -> Decimal {
        match self.volumes.get(symbol) {
            Some(window) if !window.is_empty() => {
                window.iter().sum::<Decimal>() / Decimal::from(window.len() as u64)
            }
            _ => Decimal::ZERO,
        }
    }

    /// Record a fault raised elsewhere and react to it
    fn push_fault(&mut self, record: ErrorRecord) {
        let ts = record.timestamp_ms;
        self.error_log.push(record.clone());
        self.react(&record, ts);
    }

    /// Session-level reaction to a recorded fault
    fn react(&mut self, record: &ErrorRecord, ts: i64) {
        if record.is_critical() {
            tracing::error!("critical fault, halting: {record}");
            self.halt(ts);
            return;
        }
        if self.error_log.high_severity_streak() >= self.config.high_streak_threshold {
            self.degrade(DegradeCause::FaultStreak, ts);
        } else if record.breaker_open {
            self.degrade(DegradeCause::BreakerOpen, ts);
        } else if record.operation == "reconcile" {
            self.degrade(DegradeCause::ReconcileMismatch, ts);
        }
    }

    fn on_tick(&mut self, ts: i64) {
        if self.state.is_terminal() || self.state == SessionState::Halted {
            return;
        }

        if self.reconciler.due(ts) {
            self.reconcile(ts);
        }

        if let Some((cause, stamp)) = self.degraded {
            // Bars and faults carry event time while ticks carry the
            // driver's clock, so the first tick seen while degraded anchors
            // the timeout rather than the degrade event itself.
            let since = match stamp {
                Some(since) => since,
                None => {
                    self.degraded = Some((cause, Some(ts)));
                    ts
                }
            };
            if ts - since >= self.config.degraded_timeout_ms {
                tracing::error!(?cause, "degraded past the timeout, halting");
                self.halt(ts);
                return;
            }
            self.try_recover(cause, ts);
        }
    }

    fn reconcile(&mut self, ts: i64) {
        let breaker = self.breakers.get_mut(OpClass::AccountPoll);
        if !breaker.call_permitted() {
            return;
        }
        let broker = &mut self.broker;
        let result = execute_with_retry_by_category(
            &mut || broker.account_state(),
            "account-poll",
            &self.config.retry,
            &mut self.error_log,
            self.sleeper.as_ref(),
        );
        match result {
            Ok(account) => {
                self.breakers.get_mut(OpClass::AccountPoll).record_success();
                self.error_log.note_success();
                match self.reconciler.compare(&self.portfolio, &account, ts) {
                    ReconcileOutcome::Clean => {
                        self.init_reconciled = true;
                        self.maybe_finish_init();
                    }
                    ReconcileOutcome::Mismatch(record) | ReconcileOutcome::Escalate(record) => {
                        self.push_fault(record);
                    }
                }
            }
            Err(record) => {
                self.breakers.get_mut(OpClass::AccountPoll).record_failure();
                self.react(&record, ts);
            }
        }
    }

    /// Leave Initializing once one bar is in and the book has been verified
    /// against the broker
    fn maybe_finish_init(&mut self) {
        if self.state == SessionState::Initializing && self.init_bar_seen && self.init_reconciled {
            self.transition(SessionState::Running, "first bar and clean reconcile");
        }
    }

    /// Leave Degraded once the triggering condition has cleared
    fn try_recover(&mut self, cause: DegradeCause, _ts: i64) {
        if self.state != SessionState::Degraded {
            return;
        }
        let recovered = match cause {
            DegradeCause::BreakerOpen => !self.breakers.any_blocked(),
            DegradeCause::FaultStreak => self.error_log.high_severity_streak() == 0,
            DegradeCause::ReconcileMismatch => self.reconciler.consecutive_mismatches() == 0,
        };
        if recovered {
            self.degraded = None;
            self.transition(SessionState::Running, "degrade condition cleared");
        }
    }

    fn degrade(&mut self, cause: DegradeCause, _ts: i64) {
        if self.state != SessionState::Running {
            return;
        }
        self.degraded = Some((cause, None));
        self.transition(SessionState::Degraded, &format!("{cause:?}"));
    }

    /// Halt trading for the rest of the session; never resumes silently
    fn halt(&mut self, _ts: i64) {
        if matches!(self.state, SessionState::Halted | SessionState::Stopped) {
            return;
        }
        if let Some(order_id) = self.in_flight.take() {
            if let Err(err) = self.broker.cancel(&order_id) {
                tracing::warn!(order_id, "best-effort cancel failed: {err}");
            }
        }
        self.degraded = None;
        self.transition(SessionState::Halted, "halt");
    }

    fn transition(&mut self, to: SessionState, reason: &str) {
        if !self.state.can_transition_to(to) {
            tracing::error!(from = %self.state, to = %to, reason, "invalid state transition refused");
            return;
        }
        tracing::warn!(from = %self.state, to = %to, reason, "session state change");
        self.state = to;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::paper::{PaperBroker, ScriptedFault};
    use crate::market::Side;
    use crate::portfolio::PortfolioView;
    use crate::resilience::BackoffConfig;
    use crate::resilience::RetryPolicy;
    use crate::session::reconcile::ReconcileConfig;
    use rust_decimal_macros::dec;

    struct NoSleep;
    impl Sleeper for NoSleep {
        fn sleep(&self, _: Duration) {}
    }

    /// Emits a scripted intent per bar, in order
    #[derive(Debug)]
    struct ScriptedStrategy {
        intents: VecDeque<Option<OrderIntent>>,
    }

    impl ScriptedStrategy {
        fn new(intents: Vec<Option<OrderIntent>>) -> Self {
            Self {
                intents: intents.into(),
            }
        }
    }

    impl Strategy for ScriptedStrategy {
        fn name(&self) -> &str {
            "scripted"
        }
        fn on_bar(&mut self, _: &MarketBar, _: &PortfolioView) -> Option<OrderIntent> {
            self.intents.pop_front().flatten()
        }
        fn reset(&mut self) {
            self.intents.clear();
        }
    }

    fn buy(qty: Decimal) -> Option<OrderIntent> {
        Some(OrderIntent {
            symbol: "SPY".to_string(),
            side: Side::Buy,
            quantity: qty,
            reference_price: dec!(100),
        })
    }

    fn bar(ts: i64) -> SessionEvent {
        SessionEvent::Bar(MarketBar::flat("SPY", ts, dec!(100), dec!(1_000_000)))
    }

    fn test_config() -> SessionConfig {
        let mut config = SessionConfig {
            symbols: vec!["SPY".to_string()],
            ..SessionConfig::default()
        };
        // Deterministic, fast retries for tests
        config.retry.set(
            ErrorCategory::Network,
            RetryPolicy {
                max_attempts: 2,
                backoff: BackoffConfig::aggressive(),
            },
        );
        config.reconcile = ReconcileConfig {
            interval_ms: 1_000,
            ..ReconcileConfig::default()
        };
        config
    }

    fn unstarted_session(
        config: SessionConfig,
        broker: PaperBroker,
        intents: Vec<Option<OrderIntent>>,
    ) -> Session<PaperBroker> {
        Session::with_sleeper(
            config,
            broker,
            Box::new(ScriptedStrategy::new(intents)),
            Box::new(NoSleep),
        )
    }

    fn session(
        config: SessionConfig,
        broker: PaperBroker,
        intents: Vec<Option<OrderIntent>>,
    ) -> Session<PaperBroker> {
        let mut s = unstarted_session(config, broker, intents);
        s.start();
        s
    }

    #[test]
    fn test_no_orders_before_initial_reconcile() {
        let mut broker = PaperBroker::new(dec!(100_000));
        // The broker link never reports account state
        broker.script_account_faults(vec![ScriptedFault::ConnectionFailed; 10]);
        let mut s = unstarted_session(test_config(), broker, vec![buy(dec!(10))]);

        s.handle(bar(1_000));
        assert_eq!(s.state(), SessionState::Initializing);
        assert!(s.trade_log().is_empty());

        // Polls keep failing; the session must not start trading
        s.handle(SessionEvent::Tick(2_000));
        s.handle(bar(3_000));
        assert!(s.trade_log().is_empty());
        // Bars are still absorbed while waiting
        assert_eq!(s.portfolio().equity_curve().len(), 2);
    }

    #[test]
    fn test_first_bar_and_clean_reconcile_enter_running() {
        let broker = PaperBroker::new(dec!(100_000));
        let mut s = unstarted_session(test_config(), broker, vec![buy(dec!(10))]);

        s.handle(SessionEvent::Tick(1_000));
        // Clean poll alone is not enough; no bar has arrived yet
        assert_eq!(s.state(), SessionState::Initializing);

        s.handle(bar(2_000));
        assert_eq!(s.state(), SessionState::Running);
        assert_eq!(s.trade_log().len(), 1);
    }

    #[test]
    fn test_bar_to_fill_happy_path() {
        let broker = PaperBroker::new(dec!(100_000));
        let mut s = session(test_config(), broker, vec![None, buy(dec!(10))]);

        s.handle(bar(1_000));
        s.handle(bar(2_000));

        assert_eq!(s.state(), SessionState::Running);
        assert_eq!(s.trade_log().len(), 1);
        assert_eq!(s.portfolio().position_qty("SPY"), dec!(10));
        assert_eq!(s.trade_log()[0].source, RecordSource::Live);
    }

    #[test]
    fn test_risk_rejection_records_and_suppresses_order() {
        let mut config = test_config();
        config.risk.max_order_notional = dec!(500);
        let broker = PaperBroker::new(dec!(100_000));
        let mut s = session(config, broker, vec![buy(dec!(10))]);

        s.handle(bar(1_000));

        assert!(s.trade_log().is_empty());
        let records = s.error_log().records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].category, ErrorCategory::RiskViolation);
        assert_eq!(records[0].operation, "risk-gate");
        // A medium-severity rejection does not degrade the session
        assert_eq!(s.state(), SessionState::Running);
    }

    #[test]
    fn test_transient_submit_failure_recovers() {
        let mut broker = PaperBroker::new(dec!(100_000));
        broker.script_submit_faults([ScriptedFault::ConnectionFailed]);
        let mut s = session(test_config(), broker, vec![buy(dec!(10))]);

        s.handle(bar(1_000));

        // First attempt failed, the retry filled
        assert_eq!(s.trade_log().len(), 1);
        assert_eq!(s.error_log().len(), 1);
        assert_eq!(s.state(), SessionState::Running);
    }

    #[test]
    fn test_critical_fault_halts() {
        let broker = PaperBroker::new(dec!(100_000));
        let mut s = session(test_config(), broker, vec![buy(dec!(10))]);

        s.handle(SessionEvent::Fault(ErrorRecord::new(
            FaultKind::unknown(),
            1_000,
            "feed-poll",
            "unrecoverable",
        )));
        assert_eq!(s.state(), SessionState::Halted);

        // Halted sessions ignore further bars and never trade again
        s.handle(bar(2_000));
        assert!(s.trade_log().is_empty());
        assert_eq!(s.state(), SessionState::Halted);
    }

    #[test]
    fn test_high_severity_streak_degrades() {
        let mut config = test_config();
        config.high_streak_threshold = 2;
        let broker = PaperBroker::new(dec!(100_000));
        let mut s = session(config, broker, vec![]);

        for ts in [1_000, 2_000] {
            s.handle(SessionEvent::Fault(ErrorRecord::new(
                FaultKind::new(ErrorCategory::Network, ErrorSeverity::High, true),
                ts,
                "feed-connect",
                "connect refused",
            )));
        }
        assert_eq!(s.state(), SessionState::Degraded);
    }

    #[test]
    fn test_degraded_suppresses_orders_but_consumes_bars() {
        let mut config = test_config();
        config.high_streak_threshold = 1;
        let broker = PaperBroker::new(dec!(100_000));
        let mut s = session(config, broker, vec![buy(dec!(10))]);

        s.handle(SessionEvent::Fault(ErrorRecord::new(
            FaultKind::new(ErrorCategory::Network, ErrorSeverity::High, true),
            500,
            "feed-connect",
            "connect refused",
        )));
        assert_eq!(s.state(), SessionState::Degraded);

        s.handle(bar(1_000));
        // The bar was absorbed (equity marked) but no order went out
        assert!(s.trade_log().is_empty());
        assert_eq!(s.portfolio().equity_curve().len(), 1);
    }

    #[test]
    fn test_reconcile_mismatch_degrades_and_preserves_local_book() {
        let mut broker = PaperBroker::new(dec!(100_000));
        // Broker claims a position the session never opened
        broker.set_position("SPY", dec!(150));
        let mut config = test_config();
        config.reconcile.cash_tolerance = dec!(1_000_000);
        let mut s = session(config, broker, vec![]);

        s.handle(SessionEvent::Tick(10_000));

        assert_eq!(s.state(), SessionState::Degraded);
        let record = s
            .error_log()
            .records()
            .iter()
            .find(|r| r.operation == "reconcile")
            .unwrap();
        assert_eq!(record.category, ErrorCategory::RiskViolation);
        assert_eq!(record.severity, ErrorSeverity::High);
        // Local snapshot untouched by the broker's claim
        assert_eq!(s.portfolio().position_qty("SPY"), dec!(0));
    }

    #[test]
    fn test_repeated_reconcile_mismatches_halt() {
        let mut broker = PaperBroker::new(dec!(100_000));
        broker.set_position("SPY", dec!(150));
        let mut config = test_config();
        config.reconcile.cash_tolerance = dec!(1_000_000);
        config.reconcile.max_consecutive_mismatches = 2;
        let mut s = session(config, broker, vec![]);

        s.handle(SessionEvent::Tick(10_000));
        assert_eq!(s.state(), SessionState::Degraded);
        s.handle(SessionEvent::Tick(20_000));
        assert_eq!(s.state(), SessionState::Halted);
    }

    #[test]
    fn test_degraded_timeout_escalates_to_halt() {
        let mut broker = PaperBroker::new(dec!(100_000));
        // A mismatch that never resolves keeps the session degraded
        broker.set_position("SPY", dec!(150));
        let mut config = test_config();
        config.degraded_timeout_ms = 5_000;
        config.reconcile.cash_tolerance = dec!(1_000_000);
        config.reconcile.max_consecutive_mismatches = 100;
        let mut s = session(config, broker, vec![]);

        s.handle(SessionEvent::Tick(1_000));
        assert_eq!(s.state(), SessionState::Degraded);

        s.handle(SessionEvent::Tick(3_000));
        assert_eq!(s.state(), SessionState::Degraded);
        s.handle(SessionEvent::Tick(6_001));
        assert_eq!(s.state(), SessionState::Halted);
    }

    #[test]
    fn test_degrade_timeout_counts_on_the_tick_clock() {
        let mut config = test_config();
        config.high_streak_threshold = 1;
        config.degraded_timeout_ms = 300_000;
        let broker = PaperBroker::new(dec!(100_000));
        let mut s = session(config, broker, vec![]);

        // Degrade on a fault carrying event time, then tick with the
        // driver's wall clock the way `run` does
        s.handle(SessionEvent::Fault(ErrorRecord::new(
            FaultKind::new(ErrorCategory::Network, ErrorSeverity::High, true),
            1_000,
            "feed-connect",
            "connect refused",
        )));
        assert_eq!(s.state(), SessionState::Degraded);

        // The epoch gap between the fault stamp and the wall clock must not
        // count as degraded time
        s.handle(SessionEvent::Tick(now_ms()));
        assert_ne!(s.state(), SessionState::Halted);
    }

    #[test]
    fn test_breaker_open_fault_degrades_without_message_sniffing() {
        let broker = PaperBroker::new(dec!(100_000));
        let mut s = session(test_config(), broker, vec![]);

        let record = ErrorRecord::new(
            FaultKind::new(ErrorCategory::Internal, ErrorSeverity::High, false),
            1_000,
            "order-submit",
            "failing fast",
        )
        .from_open_breaker();
        s.handle(SessionEvent::Fault(record));
        assert_eq!(s.state(), SessionState::Degraded);
    }

    #[test]
    fn test_degraded_recovers_after_clean_poll() {
        let mut config = test_config();
        config.high_streak_threshold = 1;
        let broker = PaperBroker::new(dec!(100_000));
        let mut s = session(config, broker, vec![]);

        s.handle(SessionEvent::Fault(ErrorRecord::new(
            FaultKind::new(ErrorCategory::Network, ErrorSeverity::High, true),
            1_000,
            "feed-connect",
            "connect refused",
        )));
        assert_eq!(s.state(), SessionState::Degraded);

        // The tick polls the account cleanly, which resets the streak and
        // clears the degrade condition.
        s.handle(SessionEvent::Tick(2_000));
        assert_eq!(s.state(), SessionState::Running);
    }

    #[test]
    fn test_daily_loss_cap_blocks_further_orders() {
        let mut config = test_config();
        config.risk.max_daily_loss = dec!(50);
        config.commission = dec!(0);
        // Sell at a loss: buy 10 @ 100, sell 10 @ 90
        let broker = PaperBroker::new(dec!(100_000)).with_costs(dec!(0), dec!(0));
        let mut s = session(
            config,
            broker,
            vec![
                buy(dec!(10)),
                Some(OrderIntent {
                    symbol: "SPY".to_string(),
                    side: Side::Sell,
                    quantity: dec!(10),
                    reference_price: dec!(90),
                }),
                buy(dec!(1)),
            ],
        );

        s.handle(bar(1_000));
        s.handle(SessionEvent::Bar(MarketBar::flat(
            "SPY",
            2_000,
            dec!(90),
            dec!(1_000_000),
        )));
        assert_eq!(s.trade_log().len(), 2);

        // 100 realized loss is past the 50 cap; the third order is rejected
        s.handle(bar(3_000));
        assert_eq!(s.trade_log().len(), 2);
        assert!(s
            .error_log()
            .records()
            .iter()
            .any(|r| r.operation == "risk-gate" && r.message.contains("daily loss")));
    }

    #[test]
    fn test_shutdown_is_terminal() {
        let broker = PaperBroker::new(dec!(100_000));
        let mut s = session(test_config(), broker, vec![]);
        s.shutdown("test");
        assert_eq!(s.state(), SessionState::Stopped);
        s.handle(bar(1_000));
        assert!(s.portfolio().equity_curve().is_empty());
    }
}
