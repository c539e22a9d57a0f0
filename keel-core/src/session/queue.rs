//! Bounded session event queue
//!
//! Single consumer (the orchestrator), multiple producers (the feed thread
//! and the timer). Events are consumed strictly in arrival order. The queue
//! never blocks a producer: on overflow the oldest event is dropped and the
//! drop is surfaced as a DataQuality fault event so the orchestrator knows
//! data was lost.

use crate::fault::{ErrorCategory, ErrorRecord, ErrorSeverity, FaultKind};
use crate::market::MarketBar;
use crate::resilience::now_ms;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// Everything the orchestrator reacts to
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A bar that passed feed validation
    Bar(MarketBar),
    /// A fault raised outside the orchestrator thread (feed side)
    Fault(ErrorRecord),
    /// Periodic timer tick carrying the wall clock in epoch milliseconds
    Tick(i64),
}

struct Inner {
    queue: Mutex<VecDeque<SessionEvent>>,
    available: Condvar,
    capacity: usize,
}

/// Shared handle; clone freely across producer threads
#[derive(Clone)]
pub struct EventQueue {
    inner: Arc<Inner>,
}

impl EventQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                queue: Mutex::new(VecDeque::with_capacity(capacity)),
                available: Condvar::new(),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Enqueue an event. On overflow the oldest queued events are evicted to
    /// make room, and a DataQuality fault event naming the first casualty is
    /// queued ahead of `event`.
    pub fn push(&self, event: SessionEvent) {
        let mut queue = self.inner.queue.lock();
        if queue.len() >= self.inner.capacity {
            // Need room for the loss notice plus the new event.
            let mut first_dropped = None;
            let mut dropped = 0usize;
            while queue.len() + 2 > self.inner.capacity {
                match queue.pop_front() {
                    Some(evicted) => {
                        if first_dropped.is_none() {
                            first_dropped = Some(describe(&evicted));
                        }
                        dropped += 1;
                    }
                    None => break,
                }
            }
            tracing::warn!(
                capacity = self.inner.capacity,
                dropped,
                "event queue full, dropped oldest events"
            );
            let record = ErrorRecord::new(
                FaultKind::new(ErrorCategory::DataQuality, ErrorSeverity::Medium, false),
                now_ms(),
                "event-queue",
                format!(
                    "queue overflow, dropped {dropped} event(s) starting with {}",
                    first_dropped.unwrap_or_else(|| "none".to_string())
                ),
            );
            queue.push_back(SessionEvent::Fault(record));
        }
        queue.push_back(event);
        drop(queue);
        self.inner.available.notify_one();
    }

    /// Blocking pop with a timeout; `None` on timeout
    pub fn pop(&self, timeout: Duration) -> Option<SessionEvent> {
        let mut queue = self.inner.queue.lock();
        if queue.is_empty() {
            self.inner.available.wait_for(&mut queue, timeout);
        }
        queue.pop_front()
    }

    /// Non-blocking pop
    pub fn try_pop(&self) -> Option<SessionEvent> {
        self.inner.queue.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.queue.lock().is_empty()
    }
}

fn describe(event: &SessionEvent) -> String {
    match event {
        SessionEvent::Bar(bar) => format!("bar {}@{}", bar.symbol, bar.timestamp_ms),
        SessionEvent::Fault(record) => format!("fault {}", record.operation),
        SessionEvent::Tick(ts) => format!("tick {ts}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn bar(ts: i64) -> SessionEvent {
        SessionEvent::Bar(MarketBar::flat("SPY", ts, dec!(100), dec!(1000)))
    }

    #[test]
    fn test_fifo_order_preserved() {
        let q = EventQueue::with_capacity(8);
        q.push(bar(1));
        q.push(bar(2));
        q.push(bar(3));
        for expected in [1, 2, 3] {
            match q.try_pop() {
                Some(SessionEvent::Bar(b)) => assert_eq!(b.timestamp_ms, expected),
                other => panic!("unexpected event: {other:?}"),
            }
        }
        assert!(q.try_pop().is_none());
    }

    #[test]
    fn test_overflow_drops_oldest_and_records_loss() {
        let q = EventQueue::with_capacity(2);
        q.push(bar(1));
        q.push(bar(2));
        // Overflow: bar 1 is evicted, a loss notice appears, bar 3 lands last
        q.push(bar(3));

        match q.try_pop() {
            Some(SessionEvent::Fault(record)) => {
                assert_eq!(record.category, ErrorCategory::DataQuality);
                assert!(record.message.contains("overflow"));
            }
            other => panic!("expected loss notice, got {other:?}"),
        }
        match q.try_pop() {
            Some(SessionEvent::Bar(b)) => assert_eq!(b.timestamp_ms, 3),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_pop_times_out_when_empty() {
        let q = EventQueue::with_capacity(2);
        assert!(q.pop(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn test_cross_thread_handoff() {
        let q = EventQueue::with_capacity(16);
        let producer = q.clone();
        let handle = std::thread::spawn(move || {
            for ts in 0..10 {
                producer.push(bar(ts));
            }
        });
        let mut seen = 0;
        while seen < 10 {
            if q.pop(Duration::from_millis(100)).is_some() {
                seen += 1;
            }
        }
        handle.join().unwrap();
        assert_eq!(seen, 10);
    }
}
