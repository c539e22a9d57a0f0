//! Simulated broker
//!
//! Fills every accepted order at the reference price plus a fixed slippage
//! fraction, charges a flat per-order commission, and keeps its own account
//! state so reconciliation has a real counterparty. Failures can be scripted
//! per call so the resilience layer is exercised deterministically in tests
//! and paper runs.

use super::{AccountState, BrokerGateway, GatewayError};
use crate::market::{Fill, OrderRequest, Side};
use crate::resilience::now_ms;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};

/// Scripted failure outcomes, cloneable so scripts can be built up front
#[derive(Debug, Clone)]
pub enum ScriptedFault {
    ConnectionFailed,
    Timeout,
    RateLimited,
    Reject(String),
}

impl ScriptedFault {
    fn into_error(self) -> GatewayError {
        match self {
            ScriptedFault::ConnectionFailed => {
                GatewayError::ConnectionFailed("simulated connection failure".into())
            }
            ScriptedFault::Timeout => GatewayError::Timeout(5_000),
            ScriptedFault::RateLimited => GatewayError::RateLimited(1_000),
            ScriptedFault::Reject(reason) => GatewayError::OrderRejected(reason),
        }
    }
}

pub struct PaperBroker {
    cash: Decimal,
    positions: HashMap<String, Decimal>,
    /// Flat commission per order
    commission: Decimal,
    /// Fractional slippage applied against the order (e.g. 0.0005)
    slippage: Decimal,
    /// Faults consumed one per `submit` call, before any fill logic
    submit_script: VecDeque<ScriptedFault>,
    /// Faults consumed one per `account_state` call
    account_script: VecDeque<ScriptedFault>,
    next_fill_id: u64,
}

impl PaperBroker {
    pub fn new(starting_cash: Decimal) -> Self {
        Self {
            cash: starting_cash,
            positions: HashMap::new(),
            commission: Decimal::ONE,
            slippage: Decimal::ZERO,
            submit_script: VecDeque::new(),
            account_script: VecDeque::new(),
            next_fill_id: 1,
        }
    }

    pub fn with_costs(mut self, commission: Decimal, slippage: Decimal) -> Self {
        self.commission = commission;
        self.slippage = slippage;
        self
    }

    /// Queue faults to be returned by upcoming `submit` calls, in order
    pub fn script_submit_faults(&mut self, faults: impl IntoIterator<Item = ScriptedFault>) {
        self.submit_script.extend(faults);
    }

    /// Queue faults to be returned by upcoming `account_state` calls
    pub fn script_account_faults(&mut self, faults: impl IntoIterator<Item = ScriptedFault>) {
        self.account_script.extend(faults);
    }

    /// Force the broker-side position for a symbol, to stage a
    /// reconciliation mismatch
    pub fn set_position(&mut self, symbol: &str, quantity: Decimal) {
        if quantity.is_zero() {
            self.positions.remove(symbol);
        } else {
            self.positions.insert(symbol.to_string(), quantity);
        }
    }

    fn fill_price(&self, order: &OrderRequest) -> Decimal {
        // Slippage always moves against the order
        match order.side {
            Side::Buy => order.reference_price * (Decimal::ONE + self.slippage),
            Side::Sell => order.reference_price * (Decimal::ONE - self.slippage),
        }
    }
}

impl BrokerGateway for PaperBroker {
    fn submit(&mut self, order: &OrderRequest) -> Result<Fill, GatewayError> {
        if let Some(fault) = self.submit_script.pop_front() {
            return Err(fault.into_error());
        }

        let price = self.fill_price(order);
        let notional = order.quantity * price;
        if order.side == Side::Buy {
            let needed = notional + self.commission;
            if needed > self.cash {
                return Err(GatewayError::InsufficientFunds {
                    needed,
                    available: self.cash,
                });
            }
        }

        let signed_qty = match order.side {
            Side::Buy => order.quantity,
            Side::Sell => -order.quantity,
        };
        match order.side {
            Side::Buy => self.cash -= notional,
            Side::Sell => self.cash += notional,
        }
        self.cash -= self.commission;
        let position = self
            .positions
            .entry(order.symbol.clone())
            .or_insert(Decimal::ZERO);
        *position += signed_qty;
        if position.is_zero() {
            self.positions.remove(&order.symbol);
        }

        let fill = Fill {
            order_id: format!("paper-{}", self.next_fill_id),
            symbol: order.symbol.clone(),
            side: order.side,
            quantity: order.quantity,
            price,
            commission: self.commission,
            timestamp_ms: now_ms(),
        };
        self.next_fill_id += 1;
        tracing::debug!(
            order_id = %fill.order_id,
            symbol = %fill.symbol,
            side = %fill.side,
            quantity = %fill.quantity,
            price = %fill.price,
            "paper fill"
        );
        Ok(fill)
    }

    fn cancel(&mut self, _client_order_id: &str) -> Result<(), GatewayError> {
        // Paper fills are immediate, so there is never anything resting.
        Ok(())
    }

    fn account_state(&mut self) -> Result<AccountState, GatewayError> {
        if let Some(fault) = self.account_script.pop_front() {
            return Err(fault.into_error());
        }
        Ok(AccountState {
            cash: self.cash,
            positions: self.positions.clone(),
        })
    }
}
