//! `TokenIndexer`: tracks the supported-token set and live USD rates (spec §4.B).

use crate::core::chain::PriceOracle;
use crate::core::types::{Address, BlockNumber, EventPayload, TokenInfo};
use crate::watcher::EventBatch;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

struct State {
    tokens: HashMap<Address, TokenInfo>,
    last_indexed_block: BlockNumber,
}

pub struct TokenIndexer {
    state: RwLock<State>,
}

impl Default for TokenIndexer {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenIndexer {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State {
                tokens: HashMap::new(),
                last_indexed_block: 0,
            }),
        }
    }

    /// Bootstrap from the config's static rate map, used until the oracle
    /// first responds (spec §6 `tokenRates`).
    pub fn seed_rates(&self, rates: &HashMap<Address, u128>) {
        let mut state = self.state.write().expect("token indexer lock poisoned");
        for (token, rate) in rates {
            let entry = state
                .tokens
                .entry(*token)
                .or_insert_with(|| TokenInfo::new(0, 0));
            entry.rate = Some(*rate);
            entry.rate_time = Some(chrono::Utc::now());
        }
    }

    fn on_token_added(&self, token: Address, min_prompt_price: u128, min_initial_balance: u128) {
        let mut state = self.state.write().expect("token indexer lock poisoned");
        let entry = state
            .tokens
            .entry(token)
            .or_insert_with(|| TokenInfo::new(min_prompt_price, min_initial_balance));
        entry.min_prompt_price = min_prompt_price;
        entry.min_initial_balance = min_initial_balance;
        entry.removed = false;
    }

    /// `TokenRemoved` sets a sentinel (min prices zeroed, reported
    /// unsupported) but preserves the last-known rate until explicit purge —
    /// in-flight agents priced in the token still need USD conversion.
    fn on_token_removed(&self, token: Address) {
        let mut state = self.state.write().expect("token indexer lock poisoned");
        if let Some(info) = state.tokens.get_mut(&token) {
            info.min_prompt_price = 0;
            info.min_initial_balance = 0;
            info.removed = true;
        }
    }

    /// Apply one fanned-out batch (spec §4.A delivery contract), then
    /// advance the watermark to the batch's `toBlock` — only once every
    /// event in the batch has been applied.
    pub fn apply_batch(&self, batch: &EventBatch) {
        for event in &batch.events {
            match &event.payload {
                EventPayload::TokenAdded(e) => {
                    self.on_token_added(e.token, e.min_prompt_price, e.min_initial_balance)
                }
                EventPayload::TokenRemoved(e) => self.on_token_removed(e.token),
                _ => {}
            }
        }
        let mut state = self.state.write().expect("token indexer lock poisoned");
        advance(&mut state.last_indexed_block, batch.to_block);
    }

    pub fn get_token_min_prompt_price(&self, token: Address) -> Option<u128> {
        let state = self.state.read().expect("token indexer lock poisoned");
        state.tokens.get(&token).filter(|t| !t.removed).map(|t| t.min_prompt_price)
    }

    pub fn get_token_min_initial_balance(&self, token: Address) -> Option<u128> {
        let state = self.state.read().expect("token indexer lock poisoned");
        state.tokens.get(&token).filter(|t| !t.removed).map(|t| t.min_initial_balance)
    }

    /// Reports "not found" when the token is unknown, or known but never
    /// refreshed (`rateTime` unset) — even if the token itself exists.
    pub fn get_token_rate(&self, token: Address) -> Option<u128> {
        let state = self.state.read().expect("token indexer lock poisoned");
        state.tokens.get(&token).and_then(|t| t.rate_time.is_some().then_some(t.rate).flatten())
    }

    pub fn last_indexed_block(&self) -> BlockNumber {
        self.state.read().expect("token indexer lock poisoned").last_indexed_block
    }

    fn tracked_tokens(&self) -> Vec<Address> {
        self.state
            .read()
            .expect("token indexer lock poisoned")
            .tokens
            .keys()
            .copied()
            .collect()
    }

    fn commit_rate(&self, token: Address, rate: u128) {
        let mut state = self.state.write().expect("token indexer lock poisoned");
        if let Some(info) = state.tokens.get_mut(&token) {
            info.rate = Some(rate);
            info.rate_time = Some(chrono::Utc::now());
        }
    }

    /// Periodic price refresh: snapshot the token set under a read lock,
    /// query the oracle for each token *outside* the lock, then re-acquire a
    /// write lock per-token to commit. Never holds a lock across the oracle
    /// call (spec §5).
    pub async fn run_price_refresh<O: PriceOracle>(
        &self,
        oracle: Arc<O>,
        tick_rate: Duration,
        shutdown: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = sleep(tick_rate) => {}
            }

            let tokens = self.tracked_tokens();
            for token in tokens {
                match oracle.get_rate(token).await {
                    Ok(rate) => self.commit_rate(token, rate),
                    Err(e) => warn!(token = %token, error = %e, "oracle rate refresh failed"),
                }
            }
            info!("price refresh tick complete");
        }
    }
}

fn advance(watermark: &mut BlockNumber, block: BlockNumber) {
    if block > *watermark {
        *watermark = block;
    }
}
