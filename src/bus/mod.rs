//! Event bus & stream (§4.3, component 6).
//!
//! Dual-sink design: a per-orderbook synchronous backlog drained by
//! `dispatch_all()` for in-process listeners, plus a `tokio::broadcast`
//! channel for external async subscribers — mirroring the teacher's
//! `subscribe_trades()` / `subscribe_orderbook()` split between an internal
//! notification path and a public subscription surface.

use crate::domain::{EventId, OrderbookId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::broadcast;
use tracing::trace;

/// The event name catalogue (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventName {
    OrderPlaced,
    OrderRejected,
    OrderFilled,
    BalanceUpdated,
    PriceUpdate,
    ClockTick,
    VerificationHit,
    PayoutSettled,
    PayoutExpired,
}

/// A published event (§4.3): `clockSeq` is assigned by the bus at publish
/// time and is strictly increasing across the dispatcher's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: EventId,
    pub name: EventName,
    /// `None` for account-level events (`creditAccount`/`debitAccount`)
    /// that are not scoped to any orderbook.
    pub orderbook_id: Option<OrderbookId>,
    pub ts: Timestamp,
    pub clock_seq: u64,
    pub payload: serde_json::Value,
}

type Listener = Box<dyn FnMut(&EventEnvelope) + Send>;

/// Buffered publish-subscribe bus (§4.3). One instance is owned by the
/// dispatcher for its whole lifetime, shared across all orderbooks.
pub struct EventBus {
    clock_seq: u64,
    backlog: VecDeque<EventEnvelope>,
    listeners: Vec<Listener>,
    broadcast_tx: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    pub fn new(broadcast_capacity: usize) -> Self {
        let (broadcast_tx, _rx) = broadcast::channel(broadcast_capacity);
        Self {
            clock_seq: 0,
            backlog: VecDeque::new(),
            listeners: Vec::new(),
            broadcast_tx,
        }
    }

    /// Register a synchronous listener invoked during `dispatch_all()`.
    /// Listeners run in registration order and must not suspend
    /// unboundedly (§9 design note).
    pub fn add_listener(&mut self, listener: Listener) {
        self.listeners.push(listener);
    }

    /// Enqueue into the backlog and push immediately to every attached
    /// broadcast subscriber (§4.3 bus contract).
    pub fn publish(
        &mut self,
        name: EventName,
        orderbook_id: Option<OrderbookId>,
        ts: Timestamp,
        payload: serde_json::Value,
    ) -> EventEnvelope {
        self.clock_seq += 1;
        let envelope = EventEnvelope {
            event_id: EventId::new(),
            name,
            orderbook_id,
            ts,
            clock_seq: self.clock_seq,
            payload,
        };
        trace!(name = ?envelope.name, clock_seq = envelope.clock_seq, "event published");
        self.backlog.push_back(envelope.clone());
        // A broadcast send fails only when there are no receivers; that is
        // not an error condition for the publisher.
        let _ = self.broadcast_tx.send(envelope.clone());
        envelope
    }

    /// Drain the backlog, invoking every registered listener once per event
    /// in publication order (§4.3, §5 suspension point).
    pub fn dispatch_all(&mut self) {
        while let Some(envelope) = self.backlog.pop_front() {
            for listener in &mut self.listeners {
                listener(&envelope);
            }
        }
    }

    /// Attach a new external subscriber stream (§4.3).
    pub fn subscribe(&self) -> EventStream {
        EventStream {
            rx: self.broadcast_tx.subscribe(),
        }
    }

    pub fn clock_seq(&self) -> u64 {
        self.clock_seq
    }
}

/// An external subscriber's ordered view onto the event stream (§4.3).
/// Backed by `tokio::sync::broadcast`; a slow subscriber that falls behind
/// the channel's capacity observes a `Lagged` gap rather than blocking the
/// dispatcher (§5 cancellation/timeouts: no backpressure on the core).
pub struct EventStream {
    rx: broadcast::Receiver<EventEnvelope>,
}

impl EventStream {
    pub async fn recv(&mut self) -> Option<EventEnvelope> {
        loop {
            match self.rx.recv().await {
                Ok(envelope) => return Some(envelope),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking drain, for callers (tests included) that want to
    /// inspect what has been published so far without awaiting.
    pub fn try_recv(&mut self) -> Option<EventEnvelope> {
        loop {
            match self.rx.try_recv() {
                Ok(envelope) => return Some(envelope),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                _ => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_seq_is_monotonic_across_publishes() {
        let mut bus = EventBus::new(16);
        let orderbook_id = OrderbookId::new();
        let first = bus.publish(EventName::OrderPlaced, Some(orderbook_id.clone()), 0, serde_json::json!({}));
        let second = bus.publish(EventName::OrderFilled, Some(orderbook_id), 1, serde_json::json!({}));
        assert!(second.clock_seq > first.clock_seq);
    }

    #[test]
    fn dispatch_all_invokes_listeners_in_publication_order() {
        use std::sync::{Arc, Mutex};

        let mut bus = EventBus::new(16);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        bus.add_listener(Box::new(move |event| {
            seen_clone.lock().unwrap().push(event.clock_seq);
        }));

        let orderbook_id = OrderbookId::new();
        bus.publish(EventName::OrderPlaced, Some(orderbook_id.clone()), 0, serde_json::json!({}));
        bus.publish(EventName::OrderFilled, Some(orderbook_id), 1, serde_json::json!({}));
        bus.dispatch_all();

        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let mut bus = EventBus::new(16);
        let mut stream = bus.subscribe();
        let orderbook_id = OrderbookId::new();
        bus.publish(EventName::PriceUpdate, Some(orderbook_id), 5, serde_json::json!({"price": 100}));

        let received = stream.recv().await.expect("event should arrive");
        assert_eq!(received.name, EventName::PriceUpdate);
    }
}
