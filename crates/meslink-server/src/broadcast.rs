//! Event fan-out to connected observers.
//!
//! Every exchange with the controller is mirrored to observers as a
//! [`WireEvent`]. Delivery is best-effort by contract: each observer has a
//! bounded queue, a full queue drops the event rather than blocking the
//! mutating path, and an observer that keeps falling behind is evicted.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::coordinator::EventSink;

/// Per-observer queue depth.
const OBSERVER_QUEUE_DEPTH: usize = 256;

/// Maximum total lifetime drops before an observer is evicted as too slow.
const MAX_TOTAL_DROPS: u64 = 100;

/// Which way a mirrored exchange travelled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Inbound: controller → MES.
    #[serde(rename = "controller->mes")]
    FromController,
    /// Outbound: MES → controller.
    #[serde(rename = "mes->controller")]
    ToController,
}

/// One mirrored exchange: the raw message plus its direction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireEvent {
    /// Travel direction of the mirrored message.
    pub direction: Direction,
    /// The message itself, as raw JSON.
    pub data: Value,
}

impl WireEvent {
    /// Mirror of an inbound controller message.
    pub fn inbound(data: Value) -> Self {
        Self {
            direction: Direction::FromController,
            data,
        }
    }

    /// Mirror of an outbound MES message.
    pub fn outbound(data: Value) -> Self {
        Self {
            direction: Direction::ToController,
            data,
        }
    }
}

/// A registered observer: its queue sender and lifetime drop counter.
struct Observer {
    tx: mpsc::Sender<Arc<String>>,
    drops: AtomicU64,
}

/// Manages event broadcasting to registered observers.
pub struct BroadcastHub {
    /// Observers indexed by registration ID.
    observers: RwLock<HashMap<String, Observer>>,
    /// Monotonic source for registration IDs.
    next_id: AtomicU64,
    /// Atomic counter tracking observer count (avoids read-locking for
    /// count queries).
    active_count: AtomicUsize,
}

impl BroadcastHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self {
            observers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            active_count: AtomicUsize::new(0),
        }
    }

    /// Register an observer; returns its ID and the receiving end of its
    /// queue. Events are serialized once and shared across observers.
    pub fn register(&self) -> (String, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(OBSERVER_QUEUE_DEPTH);
        let id = format!("obs-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let observer = Observer {
            tx,
            drops: AtomicU64::new(0),
        };
        if self
            .observers
            .write()
            .insert(id.clone(), observer)
            .is_none()
        {
            let _ = self.active_count.fetch_add(1, Ordering::Relaxed);
        }
        (id, rx)
    }

    /// Remove an observer by ID.
    pub fn unregister(&self, id: &str) {
        if self.observers.write().remove(id).is_some() {
            let _ = self.active_count.fetch_sub(1, Ordering::Relaxed);
        }
    }

    /// Number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }

    /// Serialize the event, fan out to every observer, evict the
    /// persistently slow ones. Never blocks and never fails.
    pub fn broadcast(&self, event: &WireEvent) {
        let json = match serde_json::to_string(event) {
            Ok(j) => Arc::new(j),
            Err(e) => {
                warn!(error = %e, "failed to serialize observer event");
                return;
            }
        };
        let mut to_evict = Vec::new();
        {
            let observers = self.observers.read();
            for (id, observer) in observers.iter() {
                if observer.tx.try_send(Arc::clone(&json)).is_ok() {
                    continue;
                }
                let drops = observer.drops.fetch_add(1, Ordering::Relaxed) + 1;
                if drops >= MAX_TOTAL_DROPS {
                    warn!(observer = %id, drops, "evicting slow observer");
                    to_evict.push(id.clone());
                } else {
                    debug!(observer = %id, total_drops = drops, "observer queue full, dropping event");
                }
            }
        }
        if !to_evict.is_empty() {
            let mut observers = self.observers.write();
            for id in &to_evict {
                if observers.remove(id).is_some() {
                    let _ = self.active_count.fetch_sub(1, Ordering::Relaxed);
                }
            }
        }
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for BroadcastHub {
    fn publish(&self, event: WireEvent) {
        self.broadcast(&event);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn event() -> WireEvent {
        WireEvent::inbound(json!({"type": "STATUS", "channel": "CH001"}))
    }

    #[test]
    fn register_and_unregister() {
        let hub = BroadcastHub::new();
        assert_eq!(hub.observer_count(), 0);
        let (id1, _rx1) = hub.register();
        let (id2, _rx2) = hub.register();
        assert_ne!(id1, id2);
        assert_eq!(hub.observer_count(), 2);
        hub.unregister(&id1);
        assert_eq!(hub.observer_count(), 1);
        hub.unregister("no_such");
        assert_eq!(hub.observer_count(), 1);
        hub.unregister(&id2);
        assert_eq!(hub.observer_count(), 0);
    }

    #[tokio::test]
    async fn broadcast_reaches_all_observers() {
        let hub = BroadcastHub::new();
        let (_id1, mut rx1) = hub.register();
        let (_id2, mut rx2) = hub.register();

        hub.broadcast(&event());

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn payload_is_shared_not_cloned() {
        let hub = BroadcastHub::new();
        let (_id1, mut rx1) = hub.register();
        let (_id2, mut rx2) = hub.register();

        hub.broadcast(&event());

        let msg1 = rx1.recv().await.unwrap();
        let msg2 = rx2.recv().await.unwrap();
        assert!(Arc::ptr_eq(&msg1, &msg2));
    }

    #[tokio::test]
    async fn event_json_carries_direction_tag() {
        let hub = BroadcastHub::new();
        let (_id, mut rx) = hub.register();

        hub.broadcast(&WireEvent::outbound(json!({"type": "START"})));

        let msg = rx.recv().await.unwrap();
        let parsed: Value = serde_json::from_str(&msg).unwrap();
        assert_eq!(parsed["direction"], "mes->controller");
        assert_eq!(parsed["data"]["type"], "START");
    }

    #[test]
    fn broadcast_to_empty_hub_is_noop() {
        let hub = BroadcastHub::new();
        // Should not panic
        hub.broadcast(&event());
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let hub = BroadcastHub::new();
        let (_id, mut rx) = hub.register();

        for _ in 0..OBSERVER_QUEUE_DEPTH + 10 {
            hub.broadcast(&event());
        }
        // Observer is still registered (drop count below eviction
        // threshold), and exactly the queue depth was delivered.
        assert_eq!(hub.observer_count(), 1);
        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, OBSERVER_QUEUE_DEPTH);
    }

    #[tokio::test]
    async fn persistently_slow_observer_is_evicted() {
        let hub = BroadcastHub::new();
        let (_slow, _rx_kept_full) = hub.register();
        let (_fast, mut fast_rx) = hub.register();

        // Fill the slow observer's queue, then exceed the drop threshold.
        // The fast observer drains as it goes.
        for _ in 0..OBSERVER_QUEUE_DEPTH + MAX_TOTAL_DROPS as usize {
            hub.broadcast(&event());
            while fast_rx.try_recv().is_ok() {}
        }

        assert_eq!(hub.observer_count(), 1);
        hub.broadcast(&event());
        assert!(fast_rx.try_recv().is_ok());
    }

    #[test]
    fn direction_serialization() {
        assert_eq!(
            serde_json::to_string(&Direction::FromController).unwrap(),
            "\"controller->mes\""
        );
        assert_eq!(
            serde_json::to_string(&Direction::ToController).unwrap(),
            "\"mes->controller\""
        );
    }
}
