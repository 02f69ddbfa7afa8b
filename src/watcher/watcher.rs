//! `EventWatcher`: a chunked, resumable polling loop that discovers new
//! blocks, fetches events in bounded windows, classifies them, and fans them
//! out to typed subscribers (spec §4.A).

use crate::core::chain::{ChainClient, EventFilter};
use crate::core::types::{Address, BlockNumber, EventKind};
use crate::watcher::subscription::{EventBatch, SubscriptionId, SubscriptionRegistry};
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// First block to index, inclusive.
    pub starting_block: BlockNumber,
    /// Confirmation depth subtracted from the chain head before indexing.
    pub safe_block_delta: u64,
    /// Maximum block span requested per RPC call.
    pub index_chunk_size: u64,
    /// Poll interval while catching up to the tip.
    pub startup_tick_rate: Duration,
    /// Poll interval once caught up.
    pub tick_rate: Duration,
    /// Addresses events are filtered to (the registry, plus any tracked agents).
    pub tracked_addresses: Vec<Address>,
    /// The trusted emitter for `AgentRegistered`/`TokenAdded`/`TokenRemoved`.
    /// Any such event from a different address is dropped with a warning.
    pub registry_address: Address,
}

const BACKOFF_BASE: Duration = Duration::from_millis(250);
const BACKOFF_CAP: Duration = Duration::from_secs(10);

/// Polls the chain; emits typed event batches with a `toBlock` watermark.
pub struct EventWatcher<C: ChainClient> {
    chain: Arc<C>,
    config: WatcherConfig,
    registry: Arc<SubscriptionRegistry>,
    last_indexed_block: AtomicU64,
}

impl<C: ChainClient> EventWatcher<C> {
    pub fn new(chain: Arc<C>, config: WatcherConfig) -> Self {
        let start = config.starting_block.saturating_sub(1);
        Self {
            chain,
            config,
            registry: Arc::new(SubscriptionRegistry::new()),
            last_indexed_block: AtomicU64::new(start),
        }
    }

    pub fn last_indexed_block(&self) -> BlockNumber {
        self.last_indexed_block.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self, kind: EventKind, capacity: usize) -> (SubscriptionId, mpsc::Receiver<EventBatch>) {
        self.registry.subscribe(kind, capacity)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.registry.unsubscribe(id);
    }

    /// Blocks until `shutdown` is cancelled, then returns.
    pub async fn run(&self, shutdown: CancellationToken) -> crate::core::error::IndexerResult<()> {
        let mut consecutive_failures: u32 = 0;
        loop {
            if shutdown.is_cancelled() {
                return Ok(());
            }

            let head = match self.chain.block_number().await {
                Ok(head) => head.saturating_sub(self.config.safe_block_delta),
                Err(e) => {
                    consecutive_failures += 1;
                    warn!(error = %e, attempt = consecutive_failures, "failed to fetch chain head, retrying with backoff");
                    self.retry_backoff(&shutdown, consecutive_failures).await;
                    continue;
                }
            };

            let last = self.last_indexed_block();
            if last >= head {
                consecutive_failures = 0;
                tokio::select! {
                    _ = shutdown.cancelled() => return Ok(()),
                    _ = sleep(self.config.tick_rate) => {}
                }
                continue;
            }

            let from = last + 1;
            let to = (from + self.config.index_chunk_size - 1).min(head);

            match self.index_range(from, to).await {
                Ok(()) => {
                    consecutive_failures = 0;
                    self.last_indexed_block.store(to, Ordering::SeqCst);
                    let catching_up = to < head;
                    let delay = if catching_up {
                        self.config.startup_tick_rate
                    } else {
                        self.config.tick_rate
                    };
                    tokio::select! {
                        _ = shutdown.cancelled() => return Ok(()),
                        _ = sleep(delay) => {}
                    }
                }
                Err(e) => {
                    consecutive_failures += 1;
                    warn!(error = %e, from, to, attempt = consecutive_failures, "batch fetch failed, retrying with backoff");
                    self.retry_backoff(&shutdown, consecutive_failures).await;
                }
            }
        }
    }

    async fn retry_backoff(&self, shutdown: &CancellationToken, attempt: u32) {
        let base = BACKOFF_BASE.as_millis() as u64 * 2u64.saturating_pow(attempt.saturating_sub(1));
        let capped = base.min(BACKOFF_CAP.as_millis() as u64);
        let jitter_frac = rand::thread_rng().gen_range(-0.25..=0.25);
        let millis = ((capped as f64) * (1.0 + jitter_frac)).max(0.0) as u64;
        tokio::select! {
            _ = shutdown.cancelled() => {}
            _ = sleep(Duration::from_millis(millis)) => {}
        }
    }

    /// Fetch, classify, and dispatch one `[from, to]` window. Does not
    /// advance the watermark — the caller does that only after this returns
    /// `Ok`.
    async fn index_range(&self, from: BlockNumber, to: BlockNumber) -> crate::core::error::IndexerResult<()> {
        let filter = EventFilter {
            from_block: from,
            to_block: to,
            addresses: self.config.tracked_addresses.clone(),
        };
        let raw_events = self.chain.events(filter).await?;

        let mut accepted = Vec::with_capacity(raw_events.len());
        for raw in raw_events {
            let event = match crate::watcher::classify::decode(&raw) {
                Ok(event) => event,
                Err(e) => {
                    warn!(error = %e, block = raw.block, "skipping unclassifiable event");
                    continue;
                }
            };
            let registry_only = matches!(
                event.kind(),
                EventKind::AgentRegistered | EventKind::TokenAdded | EventKind::TokenRemoved
            );
            let expected = if registry_only {
                event.emitter == self.config.registry_address
            } else {
                self.config.tracked_addresses.contains(&event.emitter)
            };
            if !expected {
                warn!(
                    emitter = %event.emitter,
                    kind = %event.kind(),
                    block = event.block,
                    "dropping event from unexpected emitter"
                );
                continue;
            }
            accepted.push(event);
        }

        debug!(from, to, count = accepted.len(), "dispatching indexed events");
        self.registry.dispatch(&accepted, from, to).await;
        info!(from, to, "indexed block range");
        Ok(())
    }
}
