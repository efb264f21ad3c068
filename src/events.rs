//! Typed publish/subscribe for component events.
//!
//! Each higher-level component owns one [`EventBus`] over its own event
//! enum, so subscriptions are checked at compile time instead of by
//! string key. Emission never fails: events published with no subscribers
//! are simply dropped.

use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 64;

/// A broadcast channel of typed events.
///
/// Subscribers receive every event emitted after they subscribe, in emit
/// order. A receiver that falls behind the channel capacity sees a lag
/// error and skips ahead rather than blocking the publisher.
pub struct EventBus<E> {
    tx: broadcast::Sender<E>,
}

impl<E: Clone> EventBus<E> {
    /// Create a bus that buffers up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to events emitted from this point on
    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.tx.subscribe()
    }

    /// Publish an event to all current subscribers
    pub fn emit(&self, event: E) {
        let _ = self.tx.send(event);
    }
}

impl<E: Clone> Default for EventBus<E> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}
