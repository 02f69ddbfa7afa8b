//! Typed fan-out: each subscriber receives only the event kinds it asked for,
//! through a bounded channel with blocking sends — slow subscribers apply
//! back-pressure to the watcher, they never cause a dropped event.

use crate::core::types::{BlockNumber, ChainEvent, EventKind};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

/// Minimum channel capacity per spec §4.A ("buffered (>= 1000)").
pub const MIN_SUBSCRIBER_CAPACITY: usize = 1_000;

/// One fan-out delivery: every event in `events` falls within `[from_block, to_block]`
/// and matches the subscriber's requested kind.
#[derive(Debug, Clone)]
pub struct EventBatch {
    pub events: Vec<ChainEvent>,
    pub from_block: BlockNumber,
    pub to_block: BlockNumber,
}

pub type SubscriptionId = u64;

struct Subscriber {
    kind: EventKind,
    sender: mpsc::Sender<EventBatch>,
}

/// Registry of `(kind -> subscribers)`. Guarded by its own mutex, held only
/// during subscribe/unsubscribe per spec §5.
pub struct SubscriptionRegistry {
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<SubscriptionId, Subscriber>>,
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribe to one event kind. `capacity` is clamped up to
    /// [`MIN_SUBSCRIBER_CAPACITY`].
    pub fn subscribe(&self, kind: EventKind, capacity: usize) -> (SubscriptionId, mpsc::Receiver<EventBatch>) {
        let (tx, rx) = mpsc::channel(capacity.max(MIN_SUBSCRIBER_CAPACITY));
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.subscribers
            .lock()
            .expect("subscription registry poisoned")
            .insert(id, Subscriber { kind, sender: tx });
        (id, rx)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers
            .lock()
            .expect("subscription registry poisoned")
            .remove(&id);
    }

    /// Fan a batch of classified events out to every matching subscriber.
    /// Blocks (one subscriber at a time) when a subscriber's channel is
    /// full — natural back-pressure, never a silent drop.
    pub async fn dispatch(&self, events: &[ChainEvent], from_block: BlockNumber, to_block: BlockNumber) {
        // Snapshot the (kind, sender) pairs under the lock, then release it
        // before any blocking send — never hold the registry lock across I/O.
        let targets: Vec<(EventKind, mpsc::Sender<EventBatch>)> = {
            let subs = self.subscribers.lock().expect("subscription registry poisoned");
            subs.values().map(|s| (s.kind, s.sender.clone())).collect()
        };

        for (kind, sender) in targets {
            let matching: Vec<ChainEvent> = events.iter().filter(|e| e.kind() == kind).cloned().collect();
            if matching.is_empty() {
                continue;
            }
            let batch = EventBatch {
                events: matching,
                from_block,
                to_block,
            };
            // A closed receiver means the subscriber dropped itself; that's
            // not a watcher failure.
            let _ = sender.send(batch).await;
        }
    }
}
