//! Circuit breaker per operation class
//!
//! State machine: Closed -> Open -> HalfOpen -> Closed.
//!
//! - **Closed**: calls pass through; failures are counted in a sliding time
//!   window; reaching the threshold trips the breaker.
//! - **Open**: calls fail fast for the cooldown period without touching the
//!   underlying dependency. The cooldown doubles on each consecutive re-open,
//!   up to a bound.
//! - **HalfOpen**: exactly one trial call is allowed; success closes the
//!   breaker and resets counters, failure re-opens it with the extended
//!   cooldown.
//!
//! One breaker per operation class: a trip on order submission must not
//! block market-data reconnects.

use crate::fault::{ErrorCategory, ErrorRecord, ErrorSeverity, FaultKind};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::{Duration, Instant};

/// Operation classes guarded by independent breakers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpClass {
    MarketDataConnect,
    OrderSubmit,
    AccountPoll,
}

impl fmt::Display for OpClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OpClass::MarketDataConnect => "market-data-connect",
            OpClass::OrderSubmit => "order-submit",
            OpClass::AccountPoll => "account-poll",
        };
        write!(f, "{name}")
    }
}

/// Breaker state, exported for status reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Configuration for one breaker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Failures within the window that trip the breaker (K)
    pub failure_threshold: usize,
    /// Sliding window for counting failures (T)
    pub failure_window_ms: u64,
    /// Initial cooldown while Open (C)
    pub cooldown_ms: u64,
    /// Ceiling for the doubled cooldown
    pub max_cooldown_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window_ms: 60_000,
            cooldown_ms: 30_000,
            max_cooldown_ms: 300_000,
        }
    }
}

/// Circuit breaker for a single operation class
///
/// Owned by one task; time is passed explicitly through the `*_at` methods
/// so the window and cooldown logic is testable without sleeping.
#[derive(Debug)]
pub struct CircuitBreaker {
    class: OpClass,
    config: BreakerConfig,
    state: CircuitState,
    /// Failure timestamps within the sliding window
    failures: VecDeque<Instant>,
    /// When the breaker last opened
    opened_at: Option<Instant>,
    /// Cooldown currently in force (doubles on consecutive re-opens)
    current_cooldown: Duration,
    /// Consecutive opens without an intervening close
    reopen_count: u32,
}

impl CircuitBreaker {
    pub fn new(class: OpClass, config: BreakerConfig) -> Self {
        let cooldown = Duration::from_millis(config.cooldown_ms);
        Self {
            class,
            config,
            state: CircuitState::Closed,
            failures: VecDeque::new(),
            opened_at: None,
            current_cooldown: cooldown,
            reopen_count: 0,
        }
    }

    pub fn class(&self) -> OpClass {
        self.class
    }

    /// Current state, accounting for an elapsed cooldown
    pub fn state(&mut self) -> CircuitState {
        self.state_at(Instant::now())
    }

    pub fn state_at(&mut self, now: Instant) -> CircuitState {
        if self.state == CircuitState::Open {
            if let Some(opened) = self.opened_at {
                if now.duration_since(opened) >= self.current_cooldown {
                    tracing::info!(class = %self.class, "circuit breaker cooldown elapsed, entering half-open");
                    self.state = CircuitState::HalfOpen;
                }
            }
        }
        self.state
    }

    /// Whether a call may proceed right now.
    ///
    /// In HalfOpen this admits the single trial call; the caller must report
    /// the outcome via `record_success`/`record_failure`.
    pub fn call_permitted(&mut self) -> bool {
        self.call_permitted_at(Instant::now())
    }

    pub fn call_permitted_at(&mut self, now: Instant) -> bool {
        match self.state_at(now) {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => false,
        }
    }

    /// The fail-fast record returned while Open
    pub fn open_record(&self, timestamp_ms: i64) -> ErrorRecord {
        ErrorRecord::new(
            FaultKind::new(ErrorCategory::Internal, ErrorSeverity::High, false),
            timestamp_ms,
            self.class.to_string(),
            format!(
                "circuit open: failing fast for {}ms",
                self.current_cooldown.as_millis()
            ),
        )
        .from_open_breaker()
    }

    pub fn record_success(&mut self) {
        self.record_success_at(Instant::now());
    }

    pub fn record_success_at(&mut self, now: Instant) {
        match self.state_at(now) {
            CircuitState::HalfOpen => {
                tracing::info!(class = %self.class, "trial call succeeded, closing circuit");
                self.close();
            }
            CircuitState::Closed => {
                // Successes age the window naturally; nothing to do.
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&mut self) {
        self.record_failure_at(Instant::now());
    }

    pub fn record_failure_at(&mut self, now: Instant) {
        match self.state_at(now) {
            CircuitState::Closed => {
                self.failures.push_back(now);
                self.evict_expired(now);
                if self.failures.len() >= self.config.failure_threshold {
                    tracing::warn!(
                        class = %self.class,
                        failures = self.failures.len(),
                        window_ms = self.config.failure_window_ms,
                        "failure threshold reached, opening circuit"
                    );
                    self.open(now);
                }
            }
            CircuitState::HalfOpen => {
                tracing::warn!(class = %self.class, "trial call failed, re-opening circuit");
                self.reopen_count = self.reopen_count.saturating_add(1);
                let doubled = self
                    .current_cooldown
                    .saturating_mul(2)
                    .min(Duration::from_millis(self.config.max_cooldown_ms));
                self.current_cooldown = doubled;
                self.open(now);
            }
            CircuitState::Open => {}
        }
    }

    fn open(&mut self, now: Instant) {
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        self.failures.clear();
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.opened_at = None;
        self.failures.clear();
        self.reopen_count = 0;
        self.current_cooldown = Duration::from_millis(self.config.cooldown_ms);
    }

    fn evict_expired(&mut self, now: Instant) {
        let window = Duration::from_millis(self.config.failure_window_ms);
        while let Some(front) = self.failures.front() {
            if now.duration_since(*front) > window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
    }

    /// Failures currently inside the sliding window
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }
}

/// Breakers for every operation class a session uses
#[derive(Debug)]
pub struct BreakerRegistry {
    breakers: HashMap<OpClass, CircuitBreaker>,
}

impl BreakerRegistry {
    pub fn new(config: &BreakerConfig) -> Self {
        let mut breakers = HashMap::new();
        for class in [
            OpClass::MarketDataConnect,
            OpClass::OrderSubmit,
            OpClass::AccountPoll,
        ] {
            breakers.insert(class, CircuitBreaker::new(class, config.clone()));
        }
        Self { breakers }
    }

    pub fn get_mut(&mut self, class: OpClass) -> &mut CircuitBreaker {
        self.breakers
            .entry(class)
            .or_insert_with(|| CircuitBreaker::new(class, BreakerConfig::default()))
    }

    /// True if any breaker is currently not Closed
    pub fn any_open(&mut self) -> bool {
        let now = Instant::now();
        self.breakers
            .values_mut()
            .any(|b| b.state_at(now) != CircuitState::Closed)
    }

    /// True if any breaker is rejecting calls outright (HalfOpen still
    /// admits the trial call, so it does not count)
    pub fn any_blocked(&mut self) -> bool {
        let now = Instant::now();
        self.breakers
            .values_mut()
            .any(|b| b.state_at(now) == CircuitState::Open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> BreakerConfig {
        BreakerConfig {
            failure_threshold: 3,
            failure_window_ms: 60_000,
            cooldown_ms: 1_000,
            max_cooldown_ms: 8_000,
        }
    }

    #[test]
    fn test_starts_closed() {
        let mut cb = CircuitBreaker::new(OpClass::OrderSubmit, test_config());
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.call_permitted());
    }

    #[test]
    fn test_opens_at_threshold() {
        let mut cb = CircuitBreaker::new(OpClass::OrderSubmit, test_config());
        let now = Instant::now();
        cb.record_failure_at(now);
        cb.record_failure_at(now);
        assert_eq!(cb.state_at(now), CircuitState::Closed);
        cb.record_failure_at(now);
        assert_eq!(cb.state_at(now), CircuitState::Open);
        assert!(!cb.call_permitted_at(now));
    }

    #[test]
    fn test_window_evicts_old_failures() {
        let mut cb = CircuitBreaker::new(OpClass::OrderSubmit, test_config());
        let start = Instant::now();
        cb.record_failure_at(start);
        cb.record_failure_at(start);
        // Third failure arrives after the first two left the window
        cb.record_failure_at(start + Duration::from_millis(61_000));
        assert_eq!(cb.state_at(start + Duration::from_millis(61_000)), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 1);
    }

    #[test]
    fn test_tenth_failure_in_window_trips_k10() {
        // With a threshold of 10 in a 60s window, the 10th consecutive
        // failure flips order-submit to Open.
        let mut cb = CircuitBreaker::new(
            OpClass::OrderSubmit,
            BreakerConfig {
                failure_threshold: 10,
                failure_window_ms: 60_000,
                ..test_config()
            },
        );
        let start = Instant::now();
        for i in 0..9 {
            cb.record_failure_at(start + Duration::from_secs(i));
            assert_eq!(cb.state_at(start + Duration::from_secs(i)), CircuitState::Closed);
        }
        cb.record_failure_at(start + Duration::from_secs(9));
        assert_eq!(cb.state_at(start + Duration::from_secs(9)), CircuitState::Open);
        // The 11th is rejected without reaching the dependency
        assert!(!cb.call_permitted_at(start + Duration::from_secs(10)));
    }

    #[test]
    fn test_half_open_single_success_closes_and_resets() {
        let mut cb = CircuitBreaker::new(OpClass::OrderSubmit, test_config());
        let start = Instant::now();
        for _ in 0..3 {
            cb.record_failure_at(start);
        }
        assert_eq!(cb.state_at(start), CircuitState::Open);

        let after_cooldown = start + Duration::from_millis(1_001);
        assert!(cb.call_permitted_at(after_cooldown));
        assert_eq!(cb.state_at(after_cooldown), CircuitState::HalfOpen);

        cb.record_success_at(after_cooldown);
        assert_eq!(cb.state_at(after_cooldown), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
    }

    #[test]
    fn test_cooldown_doubles_on_reopen_and_is_bounded() {
        let mut cb = CircuitBreaker::new(OpClass::MarketDataConnect, test_config());
        let mut now = Instant::now();
        for _ in 0..3 {
            cb.record_failure_at(now);
        }
        assert_eq!(cb.state_at(now), CircuitState::Open);
        assert_eq!(cb.current_cooldown, Duration::from_millis(1_000));

        // Fail the trial call repeatedly; cooldown doubles each time
        for expected_ms in [2_000u64, 4_000, 8_000, 8_000] {
            now += cb.current_cooldown + Duration::from_millis(1);
            assert!(cb.call_permitted_at(now));
            cb.record_failure_at(now);
            assert_eq!(cb.state_at(now), CircuitState::Open);
            assert_eq!(cb.current_cooldown, Duration::from_millis(expected_ms));
        }

        // A successful trial resets the cooldown to its base value
        now += cb.current_cooldown + Duration::from_millis(1);
        assert!(cb.call_permitted_at(now));
        cb.record_success_at(now);
        assert_eq!(cb.state_at(now), CircuitState::Closed);
        assert_eq!(cb.current_cooldown, Duration::from_millis(1_000));
    }

    #[test]
    fn test_registry_isolated_per_class() {
        let mut registry = BreakerRegistry::new(&test_config());
        let now = Instant::now();
        for _ in 0..3 {
            registry.get_mut(OpClass::OrderSubmit).record_failure_at(now);
        }
        assert_eq!(
            registry.get_mut(OpClass::OrderSubmit).state_at(now),
            CircuitState::Open
        );
        // A trip on order submission leaves market data untouched
        assert_eq!(
            registry.get_mut(OpClass::MarketDataConnect).state_at(now),
            CircuitState::Closed
        );
        assert!(registry.any_open());
    }

    #[test]
    fn test_open_record_names_operation_class() {
        let mut cb = CircuitBreaker::new(OpClass::AccountPoll, test_config());
        let now = Instant::now();
        for _ in 0..3 {
            cb.record_failure_at(now);
        }
        let record = cb.open_record(123);
        assert_eq!(record.operation, "account-poll");
        assert!(!record.retryable);
        assert!(record.breaker_open);
        assert!(record.message.contains("circuit open"));
    }
}
