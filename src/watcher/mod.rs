//! The chunked, resumable event watcher and its typed fan-out (spec §4.A).

pub mod classify;
pub mod subscription;
pub mod watcher;

pub use subscription::{EventBatch, SubscriptionId, SubscriptionRegistry, MIN_SUBSCRIBER_CAPACITY};
pub use watcher::{EventWatcher, WatcherConfig};
