//! Bounded handoff queue between the network thread and the simulation
//! thread.
//!
//! The receive loop decodes frames on its own thread but never touches
//! simulation state. Everything it learns is pushed here as a
//! [`TransportEvent`]; the simulation loop drains the queue exactly once per
//! tick, before sampling input, which gives every tick a deterministic
//! ordering: apply what the network delivered, then predict on top of it.
//!
//! The queue is bounded. A stalled simulation thread (breakpoint, background
//! tab) must not let network events accumulate without limit, and snapshots
//! are full-state broadcasts, so the oldest events are the ones that can be
//! discarded safely - each snapshot supersedes the previous one.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::network::messages::AppMessage;

/// An event produced by the network thread for the simulation thread.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum TransportEvent {
    /// The first inbound datagram arrived; the session is established.
    Established,
    /// A decoded application message from a PACKET frame.
    Message(AppMessage),
    /// The configured HELLO retry budget ran out without any inbound
    /// traffic. Only emitted when a finite budget is configured.
    HelloRetriesExhausted {
        /// How many HELLO frames were sent in total.
        attempts: u32,
    },
    /// The receive loop hit a fatal socket error and exited. The session is
    /// broken; the owner should fall back (e.g. return to a pre-game state).
    Error {
        /// A description of the socket error.
        context: String,
    },
}

/// Default capacity of the inbound event queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

struct Shared {
    events: Mutex<VecDeque<TransportEvent>>,
    capacity: usize,
    dropped: AtomicU64,
}

/// A bounded, thread-safe event queue. Cheap to clone; clones share the same
/// underlying queue.
#[derive(Clone)]
pub struct InboundQueue {
    shared: Arc<Shared>,
}

impl InboundQueue {
    /// Creates a queue holding at most `capacity` events (minimum 1).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            shared: Arc::new(Shared {
                events: Mutex::new(VecDeque::with_capacity(capacity)),
                capacity,
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Pushes an event, evicting the oldest one if the queue is full.
    ///
    /// Returns `true` if the push did not evict anything.
    pub fn push(&self, event: TransportEvent) -> bool {
        let mut events = self.shared.events.lock();
        let mut clean = true;
        while events.len() >= self.shared.capacity {
            events.pop_front();
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            clean = false;
        }
        if !clean {
            tracing::warn!(
                capacity = self.shared.capacity,
                "inbound queue full; evicting oldest event"
            );
        }
        events.push_back(event);
        clean
    }

    /// Removes and returns every queued event, oldest first.
    ///
    /// Called once per simulation tick.
    #[must_use]
    pub fn drain(&self) -> Vec<TransportEvent> {
        let mut events = self.shared.events.lock();
        events.drain(..).collect()
    }

    /// Number of events currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.events.lock().len()
    }

    /// Returns `true` if no events are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of events evicted because the queue was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for InboundQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundQueue")
            .field("len", &self.len())
            .field("capacity", &self.shared.capacity)
            .field("dropped", &self.dropped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_drain_preserves_order() {
        let queue = InboundQueue::with_capacity(8);
        queue.push(TransportEvent::Established);
        queue.push(TransportEvent::Message(AppMessage::GameOver));

        let events = queue.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], TransportEvent::Established);
        assert!(queue.is_empty());
    }

    #[test]
    fn drain_on_empty_queue_returns_nothing() {
        let queue = InboundQueue::with_capacity(4);
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn overflow_evicts_oldest() {
        let queue = InboundQueue::with_capacity(2);
        assert!(queue.push(TransportEvent::Established));
        assert!(queue.push(TransportEvent::Message(AppMessage::GameOver)));
        assert!(!queue.push(TransportEvent::Message(AppMessage::PlayerLevelUp {
            player_id: 1,
            new_level: 2,
        })));

        let events = queue.drain();
        assert_eq!(events.len(), 2);
        // Established (the oldest) was evicted.
        assert_eq!(events[0], TransportEvent::Message(AppMessage::GameOver));
        assert_eq!(queue.dropped(), 1);
    }

    #[test]
    fn zero_capacity_is_clamped_to_one() {
        let queue = InboundQueue::with_capacity(0);
        queue.push(TransportEvent::Established);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn clones_share_the_queue() {
        let producer = InboundQueue::with_capacity(4);
        let consumer = producer.clone();
        producer.push(TransportEvent::Established);
        assert_eq!(consumer.drain().len(), 1);
    }
}
