//! Event dispatcher
//!
//! Delivers server events to subscribers synchronously and in arrival
//! order. Handshake-internal events never reach this type; the handshake
//! swallows them before dispatch.
//!
//! Subscribers are host code. They run outside any lock, and a subscriber
//! that panics is logged and skipped so the connection keeps running.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, warn};

use super::protocol::EventFrame;

/// Event subscriber callback
pub type EventCallback = Arc<dyn Fn(&EventFrame) + Send + Sync>;

/// Sequence gap callback
pub type GapCallback = Arc<dyn Fn(SequenceGap) + Send + Sync>;

/// Events between two received sequence numbers went missing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceGap {
    /// Sequence number that should have arrived next
    pub expected: u64,
    /// Sequence number that arrived instead
    pub received: u64,
}

/// Fans events out to subscribers
#[derive(Default)]
pub struct EventDispatcher {
    subscribers: Vec<EventCallback>,
    gap_listeners: Vec<GapCallback>,
    last_seq: Mutex<Option<u64>>,
}

impl EventDispatcher {
    /// Create a dispatcher without subscribers
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an event subscriber
    pub fn subscribe(&mut self, callback: EventCallback) {
        self.subscribers.push(callback);
    }

    /// Register a sequence-gap listener
    pub fn on_gap(&mut self, callback: GapCallback) {
        self.gap_listeners.push(callback);
    }

    /// Forget the last sequence number; called for every new connection
    pub fn reset_sequence(&self) {
        *self.lock_seq() = None;
    }

    /// Deliver one event to every subscriber
    pub fn dispatch(&self, event: &EventFrame) {
        if let Some(gap) = event.seq.and_then(|seq| self.track(seq)) {
            warn!("Event sequence gap: expected {}, received {}", gap.expected, gap.received);
            for listener in &self.gap_listeners {
                guarded("sequence gap listener", || listener(gap));
            }
        }

        debug!("Dispatching event {} to {} subscriber(s)", event.event, self.subscribers.len());
        for subscriber in &self.subscribers {
            guarded("event subscriber", || subscriber(event));
        }
    }

    /// Record `seq`, returning the gap it reveals
    ///
    /// Only a forward jump is a gap. A sequence that restarts or wraps past
    /// `u64::MAX` is taken as the new baseline.
    fn track(&self, seq: u64) -> Option<SequenceGap> {
        let last = self.lock_seq().replace(seq)?;
        let expected = last.checked_add(1)?;
        (seq > expected).then_some(SequenceGap {
            expected,
            received: seq,
        })
    }

    fn lock_seq(&self) -> MutexGuard<'_, Option<u64>> {
        self.last_seq.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Run a host callback, logging instead of unwinding if it panics
pub(crate) fn guarded(what: &str, callback: impl FnOnce()) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(callback)) {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        error!("Panic in {}: {}", what, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn recording_gaps(dispatcher: &mut EventDispatcher) -> Arc<Mutex<Vec<SequenceGap>>> {
        let gaps = Arc::new(Mutex::new(Vec::new()));
        let sink = gaps.clone();
        dispatcher.on_gap(Arc::new(move |gap| sink.lock().unwrap().push(gap)));
        gaps
    }

    fn tick(seq: u64) -> EventFrame {
        EventFrame::new("tick", json!({})).with_seq(seq)
    }

    #[test]
    fn test_dispatch_in_order_to_all_subscribers() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = EventDispatcher::new();
        for tag in ["a", "b"] {
            let seen = seen.clone();
            dispatcher.subscribe(Arc::new(move |event: &EventFrame| {
                seen.lock().unwrap().push(format!("{}:{}", tag, event.event));
            }));
        }

        dispatcher.dispatch(&EventFrame::new("agent", json!({})));
        dispatcher.dispatch(&EventFrame::new("agent", json!({})));
        dispatcher.dispatch(&EventFrame::new("presence", json!({})));

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["a:agent", "b:agent", "a:agent", "b:agent", "a:presence", "b:presence"]
        );
    }

    #[test]
    fn test_sequence_gap_detection() {
        let mut dispatcher = EventDispatcher::new();
        let gaps = recording_gaps(&mut dispatcher);

        for seq in [1, 2, 5, 6] {
            dispatcher.dispatch(&tick(seq));
        }
        dispatcher.dispatch(&EventFrame::new("agent", json!({})));

        dispatcher.reset_sequence();
        dispatcher.dispatch(&tick(100));

        assert_eq!(
            *gaps.lock().unwrap(),
            vec![SequenceGap { expected: 3, received: 5 }]
        );
    }

    #[test]
    fn test_sequence_at_u64_boundary() {
        let mut dispatcher = EventDispatcher::new();
        let gaps = recording_gaps(&mut dispatcher);

        dispatcher.dispatch(&tick(u64::MAX - 2));
        dispatcher.dispatch(&tick(u64::MAX));
        dispatcher.dispatch(&tick(1));
        dispatcher.dispatch(&tick(u64::MAX));
        dispatcher.dispatch(&tick(u64::MAX));

        assert_eq!(
            *gaps.lock().unwrap(),
            vec![
                SequenceGap { expected: u64::MAX - 1, received: u64::MAX },
                SequenceGap { expected: 2, received: u64::MAX },
            ]
        );
    }

    #[test]
    fn test_panicking_subscriber_does_not_stop_delivery() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = EventDispatcher::new();
        dispatcher.subscribe(Arc::new(|_: &EventFrame| panic!("subscriber bug")));
        {
            let seen = seen.clone();
            dispatcher.subscribe(Arc::new(move |event: &EventFrame| {
                seen.lock().unwrap().push(event.seq);
            }));
        }
        dispatcher.on_gap(Arc::new(|_| panic!("gap listener bug")));

        dispatcher.dispatch(&tick(1));
        dispatcher.dispatch(&tick(3));
        dispatcher.dispatch(&tick(4));

        assert_eq!(*seen.lock().unwrap(), vec![Some(1), Some(3), Some(4)]);
    }
}
